// ABOUTME: Anthropic Claude API adapter implementing the ChatModel trait.
// ABOUTME: Translates the chat history into Messages API calls with tool_use / tool_result blocks.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{MAX_TOKENS, check_status, http_client};
use crate::runtime::{ChatMessage, ChatModel, MessageRole, ModelError, ModelReply, ToolCall};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude adapter. Calls the Messages API with tool definitions
/// and maps tool_use blocks back to ToolCalls.
pub struct AnthropicChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicChat {
    /// Create a new AnthropicChat reading configuration from environment variables.
    /// Required: `ANTHROPIC_API_KEY`
    /// Optional: `ANTHROPIC_BASE_URL` (defaults to https://api.anthropic.com)
    /// Optional: `ANTHROPIC_MODEL` (defaults to claude-sonnet-4-5-20250929)
    pub fn from_env() -> Result<Self, ModelError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ModelError::ProviderError("ANTHROPIC_API_KEY not set".to_string()))?;

        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_key, base_url, model))
    }

    /// Create a new AnthropicChat with explicit configuration.
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: http_client(),
            api_key,
            base_url,
            model,
        }
    }

    /// Replace the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Build the JSON request body for the Anthropic Messages API.
    /// System messages move to the top-level `system` field.
    pub fn build_request_body(&self, messages: &[ChatMessage], tools: &[Value]) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let turns: Vec<(&'static str, Vec<Value>)> = messages
            .iter()
            .filter_map(to_anthropic_turn)
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": coalesce_turns(turns),
        });

        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(build_anthropic_tools(tools));
        }

        body
    }

    /// Parse an Anthropic Messages API response into a ModelReply.
    pub fn parse_response(response_body: &Value) -> Result<ModelReply, ModelError> {
        let content = response_body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                ModelError::InvalidResponse("missing content array in response".to_string())
            })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        text.push_str(t);
                    }
                }
                Some("tool_use") => tool_calls.push(parse_tool_use(block)?),
                _ => {}
            }
        }

        Ok(ModelReply {
            content: text,
            tool_calls,
        })
    }
}

/// One history entry as an Anthropic (role, content blocks) pair. System
/// messages and empty assistant turns yield nothing.
fn to_anthropic_turn(message: &ChatMessage) -> Option<(&'static str, Vec<Value>)> {
    match message.role {
        MessageRole::System => None,
        MessageRole::User => Some(("user", vec![text_block(&message.content)])),
        MessageRole::Tool => Some((
            "user",
            vec![json!({
                "type": "tool_result",
                "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                "content": message.content,
            })],
        )),
        MessageRole::Assistant => {
            let mut blocks = Vec::new();
            if !message.content.is_empty() {
                blocks.push(text_block(&message.content));
            }
            for call in &message.tool_calls {
                let input = match &call.arguments {
                    Value::Object(_) => call.arguments.clone(),
                    Value::String(query) => json!({ "query": query }),
                    _ => json!({}),
                };
                blocks.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": input,
                }));
            }
            (!blocks.is_empty()).then_some(("assistant", blocks))
        }
    }
}

fn text_block(text: &str) -> Value {
    json!({ "type": "text", "text": text })
}

/// Merge consecutive turns with the same role into single messages.
/// The Anthropic API requires alternating user/assistant messages, and all
/// tool results answering one assistant turn must share a user message.
fn coalesce_turns(turns: Vec<(&'static str, Vec<Value>)>) -> Vec<Value> {
    let mut merged: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for (role, blocks) in turns {
        match merged.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => merged.push((role, blocks)),
        }
    }

    merged
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect()
}

/// Convert tool definitions to Anthropic's tool format.
fn build_anthropic_tools(tools: &[Value]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.get("name").cloned().unwrap_or(Value::Null),
                "description": tool.get("description").cloned().unwrap_or(Value::Null),
                "input_schema": tool.get("parameters").cloned().unwrap_or(json!({"type": "object"}))
            })
        })
        .collect()
}

/// Parse a single tool_use block into a ToolCall.
fn parse_tool_use(block: &Value) -> Result<ToolCall, ModelError> {
    let name = block
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| ModelError::InvalidResponse("tool_use block missing name".to_string()))?;

    let id = block
        .get("id")
        .and_then(|i| i.as_str())
        .ok_or_else(|| ModelError::InvalidResponse("tool_use block missing id".to_string()))?;

    Ok(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: block.get("input").cloned().unwrap_or(json!({})),
    })
}

#[async_trait]
impl ChatModel for AnthropicChat {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelReply, ModelError> {
        let body = self.build_request_body(messages, tools);
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::ProviderError(format!("HTTP request failed: {}", e)))?;

        let response = check_status(response, "ANTHROPIC_API_KEY").await?;

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("failed to parse JSON: {}", e)))?;

        Self::parse_response(&response_body)
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
