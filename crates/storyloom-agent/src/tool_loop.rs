// ABOUTME: Bounded tool-invocation loop: invokes the model until it stops requesting tool calls.
// ABOUTME: Every tool call gets a tool message (truncated lookup results or an unknown-tool note); exhaustion truncates silently.

use serde_json::Value;

use storyloom_core::{EventPayload, Role};

use crate::observer::RunObserver;
use crate::runtime::{ChatMessage, ChatModel, ModelError, ModelReply, ToolCall};
use crate::tools::{KnowledgeLookup, LOOKUP_TOOL_NAME};

/// Maximum characters of a lookup result fed back to the model.
pub const MAX_TOOL_RESULT_CHARS: usize = 1000;

/// What a loop run produced. `text` is the only part callers act on; the
/// rest is reported for logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopOutcome {
    pub text: String,
    /// Model calls made.
    pub iterations: usize,
    /// Lookup calls executed.
    pub tool_calls: usize,
    /// The bound was hit while the model still requested tools.
    pub exhausted: bool,
    /// A model call failed; `text` is empty.
    pub model_failed: bool,
}

/// A role's conversation with the model, bound to a fixed tool set.
pub struct ToolLoop<'a> {
    pub role: Role,
    pub model: &'a dyn ChatModel,
    pub lookup: &'a dyn KnowledgeLookup,
    pub tools: &'a [Value],
    pub observer: &'a RunObserver,
}

impl ToolLoop<'_> {
    /// Drive the conversation in `history` for at most `max_iterations` model calls.
    pub async fn run(&self, history: &mut Vec<ChatMessage>, max_iterations: usize) -> LoopOutcome {
        let mut outcome = LoopOutcome::default();

        for iteration in 0..max_iterations {
            outcome.iterations = iteration + 1;

            let reply = match self.call_model(history).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(
                        role = %self.role,
                        iteration = outcome.iterations,
                        error = %e,
                        "model call failed; ending tool loop with no text"
                    );
                    outcome.text.clear();
                    outcome.model_failed = true;
                    return outcome;
                }
            };

            history.push(reply.to_message());
            tracing::debug!(
                role = %self.role,
                iteration = outcome.iterations,
                tool_calls = reply.tool_calls.len(),
                preview = %preview(&reply.content, 100),
                "model replied"
            );

            if !reply.has_tool_calls() {
                outcome.text = reply.content;
                return outcome;
            }

            for call in &reply.tool_calls {
                if call.name != LOOKUP_TOOL_NAME {
                    tracing::debug!(role = %self.role, tool = %call.name, "answering unknown tool call");
                    // Providers reject a history with an unanswered call.
                    history.push(ChatMessage::tool_result(
                        call.id.clone(),
                        unknown_tool_result(&call.name),
                    ));
                    continue;
                }
                let query = query_of(call);
                self.observer.emit(EventPayload::ToolInvoked {
                    role: self.role,
                    tool: call.name.clone(),
                    query: query.clone(),
                });

                let result = self.lookup.search(&query).await;
                let result = truncate_chars(&result, MAX_TOOL_RESULT_CHARS);
                tracing::debug!(
                    role = %self.role,
                    query = %query,
                    result = %preview(&result, 200),
                    "lookup result"
                );

                history.push(ChatMessage::tool_result(call.id.clone(), result));
                outcome.tool_calls += 1;
            }

            outcome.text = reply.content;
        }

        outcome.exhausted = true;
        tracing::warn!(
            role = %self.role,
            max_iterations,
            "tool loop hit its iteration bound; using the last reply's text"
        );
        outcome
    }

    async fn call_model(&self, history: &[ChatMessage]) -> Result<ModelReply, ModelError> {
        if self.observer.wants_tokens() {
            let on_token = |text: &str| {
                self.observer.emit(EventPayload::ModelDelta {
                    role: self.role,
                    text: text.to_string(),
                })
            };
            self.model
                .invoke_streaming(history, self.tools, &on_token)
                .await
        } else {
            self.model.invoke(history, self.tools).await
        }
    }
}

/// The query argument of a lookup call. A bare string argument is taken as
/// the query itself; a missing query is sent as an empty string.
fn query_of(call: &ToolCall) -> String {
    match &call.arguments {
        Value::String(s) => s.clone(),
        args => args
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

fn unknown_tool_result(name: &str) -> String {
    format!("unknown tool: {}", name)
}

/// Keep at most `max_chars` characters. Never slices mid-character.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    let cut = truncate_chars(s, max_chars);
    if cut.len() < s.len() {
        format!("{}...", cut)
    } else {
        cut
    }
}
