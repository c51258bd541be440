// ABOUTME: OpenAI-compatible Chat Completions adapter implementing the ChatModel trait.
// ABOUTME: Serves both OpenAI and Ollama; supports function calling and SSE token streaming.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use super::sse::{SseBuffer, data_lines};
use super::{MAX_TOKENS, check_status, http_client, parse_arguments};
use crate::runtime::{ChatMessage, ChatModel, MessageRole, ModelError, ModelReply, ToolCall};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_MODEL: &str = "gpt-4o";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const OLLAMA_MODEL: &str = "gpt-oss:20b";

/// Chat Completions adapter. Ollama exposes the same API under `/v1`, so one
/// adapter serves both; they differ in name, credentials and defaults.
pub struct OpenAiChat {
    client: reqwest::Client,
    provider: &'static str,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiChat {
    /// Create an OpenAI adapter reading configuration from environment variables.
    /// Required: `OPENAI_API_KEY`
    /// Optional: `OPENAI_BASE_URL` (defaults to https://api.openai.com)
    /// Optional: `OPENAI_MODEL` (defaults to gpt-4o)
    pub fn from_env() -> Result<Self, ModelError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ProviderError("OPENAI_API_KEY not set".to_string()))?;

        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| OPENAI_BASE_URL.to_string());

        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| OPENAI_MODEL.to_string());

        Ok(Self::new(api_key, base_url, model))
    }

    /// Create an Ollama adapter reading configuration from environment variables.
    /// Optional: `OLLAMA_BASE_URL` (defaults to http://localhost:11434)
    /// Optional: `OLLAMA_MODEL` (defaults to gpt-oss:20b)
    pub fn ollama_from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| OLLAMA_BASE_URL.to_string());

        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| OLLAMA_MODEL.to_string());

        Self::ollama(base_url, model)
    }

    /// Create an OpenAI adapter with explicit configuration.
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: http_client(),
            provider: "openai",
            api_key: Some(api_key),
            base_url,
            model,
        }
    }

    /// Create an Ollama adapter with explicit configuration. No key is sent.
    pub fn ollama(base_url: String, model: String) -> Self {
        Self {
            client: http_client(),
            provider: "ollama",
            api_key: None,
            base_url,
            model,
        }
    }

    /// Replace the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Build the JSON request body for the Chat Completions API.
    pub fn build_request_body(&self, messages: &[ChatMessage], tools: &[Value], stream: bool) -> Value {
        let messages: Vec<Value> = messages.iter().map(to_openai_message).collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": messages,
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(build_openai_tools(tools));
            body["tool_choice"] = json!("auto");
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    /// Parse a Chat Completions response into a ModelReply.
    pub fn parse_response(response_body: &Value) -> Result<ModelReply, ModelError> {
        let choices = response_body
            .get("choices")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                ModelError::InvalidResponse("missing choices array in response".to_string())
            })?;

        let choice = choices
            .first()
            .ok_or_else(|| ModelError::InvalidResponse("empty choices array".to_string()))?;

        let message = choice
            .get("message")
            .ok_or_else(|| ModelError::InvalidResponse("missing message in choice".to_string()))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let tool_calls = message
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .map(|calls| {
                calls
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, call)| parse_openai_tool_call(idx, call))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ModelReply { content, tool_calls })
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, ModelError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::ProviderError(format!("HTTP request failed: {}", e)))?;

        check_status(response, "OPENAI_API_KEY").await
    }
}

/// Serialize one history entry in Chat Completions form.
fn to_openai_message(message: &ChatMessage) -> Value {
    match message.role {
        MessageRole::System => json!({ "role": "system", "content": message.content }),
        MessageRole::User => json!({ "role": "user", "content": message.content }),
        MessageRole::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
            "content": message.content,
        }),
        MessageRole::Assistant if message.tool_calls.is_empty() => {
            json!({ "role": "assistant", "content": message.content })
        }
        MessageRole::Assistant => {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    let arguments = match &call.arguments {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": arguments }
                    })
                })
                .collect();
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                Value::String(message.content.clone())
            };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
    }
}

/// Convert tool definitions to OpenAI's function calling format.
fn build_openai_tools(tools: &[Value]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.get("name").cloned().unwrap_or(Value::Null),
                    "description": tool.get("description").cloned().unwrap_or(Value::Null),
                    "parameters": tool.get("parameters").cloned().unwrap_or(json!({"type": "object"}))
                }
            })
        })
        .collect()
}

/// Parse one entry of `message.tool_calls`. Entries without a function name
/// are dropped. Ollama sends arguments as an object rather than a string.
fn parse_openai_tool_call(idx: usize, tool_call: &Value) -> Option<ToolCall> {
    let function = tool_call.get("function")?;
    let name = function.get("name").and_then(|n| n.as_str())?.to_string();

    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) => parse_arguments(raw),
        Some(other @ Value::Object(_)) => other.clone(),
        _ => json!({}),
    };

    let id = tool_call
        .get("id")
        .and_then(|i| i.as_str())
        .filter(|i| !i.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", idx));

    Some(ToolCall { id, name, arguments })
}

/// Partial tool call assembled from streamed deltas.
#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds streamed `chat.completion.chunk` payloads into a ModelReply.
/// Tool-call fragments are keyed by their `index`.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    calls: BTreeMap<u64, PartialCall>,
}

impl StreamAccumulator {
    /// Apply one chunk, forwarding any text increment to `on_token`.
    pub fn apply(&mut self, chunk: &Value, on_token: &(dyn for<'t> Fn(&'t str) + Send + Sync)) {
        let Some(choices) = chunk.get("choices").and_then(|c| c.as_array()) else {
            return;
        };

        for choice in choices {
            let Some(delta) = choice.get("delta") else {
                continue;
            };

            if let Some(text) = delta.get("content").and_then(|c| c.as_str())
                && !text.is_empty()
            {
                self.content.push_str(text);
                on_token(text);
            }

            let Some(calls) = delta.get("tool_calls").and_then(|t| t.as_array()) else {
                continue;
            };
            for call in calls {
                let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let entry = self.calls.entry(index).or_default();

                if let Some(id) = call.get("id").and_then(|i| i.as_str())
                    && !id.is_empty()
                {
                    entry.id = Some(id.to_string());
                }
                let Some(function) = call.get("function") else {
                    continue;
                };
                if let Some(name) = function.get("name").and_then(|n| n.as_str()) {
                    entry.name.push_str(name);
                }
                match function.get("arguments") {
                    Some(Value::String(fragment)) => entry.arguments.push_str(fragment),
                    Some(object @ Value::Object(_)) => entry.arguments = object.to_string(),
                    _ => {}
                }
            }
        }
    }

    /// The reply assembled so far. Calls that never received a name are dropped.
    pub fn finish(self) -> ModelReply {
        let tool_calls = self
            .calls
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{}", index)),
                name: call.name,
                arguments: parse_arguments(&call.arguments),
            })
            .collect();

        ModelReply {
            content: self.content,
            tool_calls,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelReply, ModelError> {
        let body = self.build_request_body(messages, tools, false);
        let response = self.send(&body).await?;

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("failed to parse JSON: {}", e)))?;

        Self::parse_response(&response_body)
    }

    async fn invoke_streaming(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        on_token: &(dyn for<'t> Fn(&'t str) + Send + Sync),
    ) -> Result<ModelReply, ModelError> {
        let body = self.build_request_body(messages, tools, true);
        let response = self.send(&body).await?;

        let mut byte_stream = response.bytes_stream();
        let mut buffer = SseBuffer::new();
        let mut accumulator = StreamAccumulator::default();

        while let Some(chunk) = byte_stream.next().await {
            let chunk =
                chunk.map_err(|e| ModelError::ProviderError(format!("stream interrupted: {}", e)))?;
            buffer.push_chunk(&chunk);

            while let Some(block) = buffer.next_event_block() {
                apply_block(&mut accumulator, &block, on_token);
            }
        }
        if let Some(rest) = buffer.finish() {
            apply_block(&mut accumulator, &rest, on_token);
        }

        Ok(accumulator.finish())
    }

    fn provider_name(&self) -> &str {
        self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn apply_block(
    accumulator: &mut StreamAccumulator,
    block: &str,
    on_token: &(dyn for<'t> Fn(&'t str) + Send + Sync),
) {
    for data in data_lines(block) {
        match serde_json::from_str::<Value>(data) {
            Ok(chunk) => accumulator.apply(&chunk, on_token),
            Err(e) => tracing::debug!(error = %e, "skipping undecodable stream chunk"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::lookup_tool_definition;
    use std::sync::Mutex;

    fn adapter() -> OpenAiChat {
        OpenAiChat::new(
            "test-key".to_string(),
            "https://api.openai.com".to_string(),
            "gpt-4o".to_string(),
        )
    }

    #[test]
    fn adapter_creation() {
        let openai = adapter();
        assert_eq!(openai.provider_name(), "openai");
        assert_eq!(openai.model_name(), "gpt-4o");
        assert_eq!(openai.api_key.as_deref(), Some("test-key"));

        let ollama = OpenAiChat::ollama("http://localhost:11434".to_string(), "llama3".to_string());
        assert_eq!(ollama.provider_name(), "ollama");
        assert!(ollama.api_key.is_none());
        assert_eq!(ollama.with_model("qwen3").model_name(), "qwen3");
    }

    #[test]
    fn builds_request_body_with_tools_and_history() {
        let history = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("write"),
            ChatMessage::assistant(
                "",
                vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "search_lorebook".to_string(),
                    arguments: json!({"query": "dragons"}),
                }],
            ),
            ChatMessage::tool_result("call_1", "Dragons hoard gold."),
        ];

        let body = adapter().build_request_body(&history, &[lookup_tool_definition()], false);

        assert_eq!(body["model"], "gpt-4o");
        assert!(body.get("stream").is_none());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"dragons"}"#
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");

        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "search_lorebook");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn omits_tools_when_none_declared() {
        let body = adapter().build_request_body(&[ChatMessage::user("hi")], &[], true);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn parses_text_response() {
        let response = json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Once upon a time" },
                "finish_reason": "stop"
            }]
        });

        let reply = OpenAiChat::parse_response(&response).unwrap();
        assert_eq!(reply.content, "Once upon a time");
        assert!(!reply.has_tool_calls());
    }

    #[test]
    fn parses_tool_call_response() {
        let response = json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {
                            "id": "call_abc",
                            "type": "function",
                            "function": {
                                "name": "search_lorebook",
                                "arguments": "{\"query\": \"Whiterun\"}"
                            }
                        },
                        {
                            "function": { "name": "search_lorebook", "arguments": {"query": "Riften"} }
                        }
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });

        let reply = OpenAiChat::parse_response(&response).unwrap();
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].id, "call_abc");
        assert_eq!(reply.tool_calls[0].arguments, json!({"query": "Whiterun"}));
        assert_eq!(reply.tool_calls[1].id, "call_1");
        assert_eq!(reply.tool_calls[1].arguments, json!({"query": "Riften"}));
    }

    #[test]
    fn rejects_missing_choices() {
        let err = OpenAiChat::parse_response(&json!({"error": "boom"})).unwrap_err();
        assert!(err.to_string().contains("missing choices"));

        let err = OpenAiChat::parse_response(&json!({"choices": []})).unwrap_err();
        assert!(err.to_string().contains("empty choices"));
    }

    #[test]
    fn accumulator_streams_text_and_assembles_tool_calls() {
        let seen = Mutex::new(Vec::new());
        let on_token = |t: &str| seen.lock().unwrap().push(t.to_string());
        let mut acc = StreamAccumulator::default();

        let chunks = [
            json!({"choices": [{"delta": {"role": "assistant", "content": "Let me "}}]}),
            json!({"choices": [{"delta": {"content": "check."}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_9", "function": {"name": "search_lorebook", "arguments": "{\"que"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "ry\": \"elves\"}"}}
            ]}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        ];
        for chunk in &chunks {
            acc.apply(chunk, &on_token);
        }

        let reply = acc.finish();
        assert_eq!(reply.content, "Let me check.");
        assert_eq!(*seen.lock().unwrap(), vec!["Let me ".to_string(), "check.".to_string()]);
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id, "call_9");
        assert_eq!(reply.tool_calls[0].arguments, json!({"query": "elves"}));
    }

    #[test]
    fn stream_blocks_feed_the_accumulator() {
        let mut acc = StreamAccumulator::default();
        let block = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        apply_block(&mut acc, block, &|_: &str| {});
        apply_block(&mut acc, "data: not json\n\n", &|_: &str| {});
        assert_eq!(acc.finish().content, "Hi");
    }

    #[tokio::test]
    #[cfg(feature = "live-test")]
    async fn openai_adapter_basic() {
        let model = OpenAiChat::from_env().expect("OPENAI_API_KEY must be set");
        let reply = model
            .invoke(&[ChatMessage::user("Say hello in one word.")], &[])
            .await;
        assert!(reply.is_ok(), "live test failed: {:?}", reply.err());
    }
}
