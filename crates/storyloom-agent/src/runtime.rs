// ABOUTME: Defines the ChatModel trait that all LLM provider adapters must implement.
// ABOUTME: Also defines the chat message/tool-call types exchanged with the model and ModelError.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a message in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One entry of the conversation history sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Tool calls declared by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call a tool-result message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// The model's answer to one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    /// A reply carrying only text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Convert the reply into the assistant message appended to the history.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::assistant(self.content.clone(), self.tool_calls.clone())
    }
}

/// Errors that can occur while invoking a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,
}

/// Trait that all LLM provider adapters must implement. Each provider
/// translates the chat history and declared tools into its API's request
/// format and parses the answer into a `ModelReply`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Invoke the model once. `tools` holds provider-agnostic tool definitions
    /// (see `tools::lookup_tool_definition`); an empty slice declares no tools.
    async fn invoke(&self, messages: &[ChatMessage], tools: &[Value])
    -> Result<ModelReply, ModelError>;

    /// Invoke the model and report text increments to `on_token` as they arrive.
    /// Providers without streaming support deliver the whole text once.
    async fn invoke_streaming(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        on_token: &(dyn for<'t> Fn(&'t str) + Send + Sync),
    ) -> Result<ModelReply, ModelError> {
        let reply = self.invoke(messages, tools).await?;
        if !reply.content.is_empty() {
            on_token(&reply.content);
        }
        Ok(reply)
    }

    /// Provider name for logging and display (e.g. "ollama", "openai").
    fn provider_name(&self) -> &str;

    /// Model identifier being used (e.g. "gpt-oss:20b").
    fn model_name(&self) -> &str;
}
