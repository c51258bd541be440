// ABOUTME: Factory function for creating chat models from a provider name.
// ABOUTME: Resolves provider + optional model override into a configured Arc<dyn ChatModel>.

use std::sync::Arc;

use crate::providers::anthropic::AnthropicChat;
use crate::providers::openai::OpenAiChat;
use crate::runtime::ChatModel;

/// Provider names accepted by `create_chat_model`.
pub const SUPPORTED_PROVIDERS: [&str; 3] = ["ollama", "openai", "anthropic"];

/// Create a chat model for the given provider name.
///
/// The model is resolved from:
/// 1. The explicit `model` parameter (if Some)
/// 2. A provider-specific environment variable (e.g. OLLAMA_MODEL)
/// 3. A sensible default for that provider
pub fn create_chat_model(
    provider: &str,
    model: Option<&str>,
) -> Result<Arc<dyn ChatModel>, anyhow::Error> {
    let chat: Arc<dyn ChatModel> = match provider {
        "ollama" => {
            let mut chat = OpenAiChat::ollama_from_env();
            if let Some(model) = model {
                chat = chat.with_model(model);
            }
            Arc::new(chat)
        }
        "openai" => {
            let mut chat = OpenAiChat::from_env()
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
            if let Some(model) = model {
                chat = chat.with_model(model);
            }
            Arc::new(chat)
        }
        "anthropic" => {
            let mut chat = AnthropicChat::from_env()
                .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
            if let Some(model) = model {
                chat = chat.with_model(model);
            }
            Arc::new(chat)
        }
        unknown => {
            return Err(anyhow::anyhow!(
                "unsupported LLM provider: {} (expected one of {})",
                unknown,
                SUPPORTED_PROVIDERS.join(", ")
            ));
        }
    };

    tracing::info!(
        provider = chat.provider_name(),
        model = chat.model_name(),
        "chat model configured"
    );
    Ok(chat)
}
