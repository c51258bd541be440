// ABOUTME: Provider module aggregating all chat-model adapters.
// ABOUTME: Each sub-module implements ChatModel for a specific LLM API; shared HTTP plumbing lives here.

pub mod anthropic;
pub mod openai;
pub mod sse;

use std::time::Duration;

use serde_json::{Value, json};

use crate::runtime::ModelError;

/// Upper bound on a single model request, streaming included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Completion budget requested from every provider.
pub const MAX_TOKENS: u32 = 4096;

/// HTTP client shared by the adapters' constructors.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to build HTTP client with timeout; using defaults");
            reqwest::Client::new()
        })
}

/// Map a non-success HTTP status into a `ModelError`. `key_var` names the
/// credential to check on 401.
pub(crate) async fn check_status(
    response: reqwest::Response,
    key_var: &str,
) -> Result<reqwest::Response, ModelError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ModelError::RateLimited);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ModelError::ProviderError(format!(
            "Unauthorized: check {}",
            key_var
        )));
    }

    if status.is_server_error() {
        return Err(ModelError::ProviderError(format!("Server error: {}", status)));
    }

    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        return Err(ModelError::ProviderError(format!(
            "API error {}: {}",
            status, error_body
        )));
    }

    Ok(response)
}

/// Decode tool-call arguments delivered as a JSON string. An empty string is
/// an empty object; undecodable text is kept as a string value.
pub(crate) fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
