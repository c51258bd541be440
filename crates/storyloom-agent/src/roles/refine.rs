// ABOUTME: The refine role: turns the raw user input into a WritingRequest.
// ABOUTME: Retries on unusable output, then falls back to the user's text verbatim with default fields.

use std::sync::Arc;

use async_trait::async_trait;

use storyloom_core::model::{DEFAULT_GENRE, DEFAULT_LENGTH, DEFAULT_STYLE};
use storyloom_core::{EventPayload, Role, WorkflowState, WritingRequest};

use super::{RoleHandler, RoleOutcome};
use crate::extract::{Record, extract_record, string_field};
use crate::observer::RunObserver;
use crate::runtime::{ChatMessage, ChatModel};

/// Attempts made before falling back to the verbatim input.
pub const REFINE_ATTEMPTS: usize = 3;

/// Why a refine attempt produced no request.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RefineError {
    #[error("model call failed")]
    ModelFailed,

    #[error("no JSON object in the reply")]
    NoRecord,

    #[error("required field absent: summary")]
    MissingSummary,
}

pub struct Refiner {
    prompt: String,
    model: Arc<dyn ChatModel>,
    attempts: usize,
}

impl Refiner {
    pub fn new(prompt: impl Into<String>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            prompt: prompt.into(),
            model,
            attempts: REFINE_ATTEMPTS,
        }
    }

    async fn attempt(
        &self,
        user_input: &str,
        observer: &RunObserver,
    ) -> Result<WritingRequest, RefineError> {
        let messages = [
            ChatMessage::system(self.prompt.clone()),
            ChatMessage::user(user_input),
        ];
        // No tools are declared; stray tool calls in the reply are ignored.
        let reply = if observer.wants_tokens() {
            let on_token = |text: &str| {
                observer.emit(EventPayload::ModelDelta {
                    role: Role::Refine,
                    text: text.to_string(),
                })
            };
            self.model.invoke_streaming(&messages, &[], &on_token).await
        } else {
            self.model.invoke(&messages, &[]).await
        };
        let reply = reply.map_err(|e| {
            tracing::debug!(error = %e, "refine model call failed");
            RefineError::ModelFailed
        })?;

        let record = extract_record(&reply.content).ok_or(RefineError::NoRecord)?;
        map_request(&record)
    }
}

#[async_trait]
impl RoleHandler for Refiner {
    type Output = WritingRequest;

    fn role(&self) -> Role {
        Role::Refine
    }

    async fn run(&self, state: &WorkflowState, observer: &RunObserver) -> RoleOutcome<WritingRequest> {
        for attempt in 1..=self.attempts {
            match self.attempt(&state.user_input, observer).await {
                Ok(request) => {
                    tracing::info!(
                        run_id = %state.run_id,
                        attempt,
                        summary = %request.summary,
                        "request refined"
                    );
                    return RoleOutcome::parsed(request);
                }
                Err(e) => {
                    tracing::warn!(
                        run_id = %state.run_id,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "refine attempt failed"
                    );
                }
            }
        }

        tracing::warn!(
            run_id = %state.run_id,
            "refinement failed; using the raw input as the request"
        );
        RoleOutcome::fallback(WritingRequest::with_defaults(state.user_input.clone()))
    }
}

/// Map a recovered record into a request. `summary` (or `summarized_prompt`)
/// is required; the other fields fall back to their defaults.
pub fn map_request(record: &Record) -> Result<WritingRequest, RefineError> {
    let summary =
        string_field(record, &["summary", "summarized_prompt"]).ok_or(RefineError::MissingSummary)?;

    Ok(WritingRequest {
        summary,
        genre: Some(string_field(record, &["genre"]).unwrap_or_else(|| DEFAULT_GENRE.to_string())),
        style: Some(string_field(record, &["style"]).unwrap_or_else(|| DEFAULT_STYLE.to_string())),
        length: Some(
            string_field(record, &["length"]).unwrap_or_else(|| DEFAULT_LENGTH.to_string()),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::StreamMode;
    use crate::runtime::{MessageRole, ModelReply, ToolCall};
    use crate::testing::ScriptedModel;
    use tokio::sync::mpsc;
    use ulid::Ulid;

    fn refiner(model: &Arc<ScriptedModel>) -> Refiner {
        Refiner::new("refine prompt", model.clone() as Arc<dyn ChatModel>)
    }

    #[tokio::test]
    async fn parses_full_request() {
        let model = Arc::new(ScriptedModel::texts(&[
            r#"{"summary": "A dragon hunt", "genre": "epic", "style": "poem", "length": "long"}"#,
        ]));
        let state = WorkflowState::new("dragon story pls", 3);

        let outcome = refiner(&model).run(&state, &RunObserver::silent(Ulid::new())).await;

        assert!(!outcome.fallback_used);
        assert_eq!(outcome.value.summary, "A dragon hunt");
        assert_eq!(outcome.value.genre.as_deref(), Some("epic"));
        assert_eq!(outcome.value.style.as_deref(), Some("poem"));
        assert_eq!(outcome.value.length.as_deref(), Some("long"));

        let sent = &model.recorded_messages()[0];
        assert_eq!(sent[0].role, MessageRole::System);
        assert_eq!(sent[0].content, "refine prompt");
        assert_eq!(sent[1].content, "dragon story pls");
        assert!(model.recorded_tools()[0].is_empty());
    }

    #[tokio::test]
    async fn backfills_missing_fields() {
        let model = Arc::new(ScriptedModel::texts(&[
            "```json\n{\"summarized_prompt\": \"A heist\", \"genre\": null, \"style\": 7}\n```",
        ]));
        let state = WorkflowState::new("heist", 3);

        let outcome = refiner(&model).run(&state, &RunObserver::silent(Ulid::new())).await;

        assert_eq!(outcome.value, WritingRequest::with_defaults("A heist"));
        assert!(!outcome.fallback_used);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let model = Arc::new(
            ScriptedModel::texts(&["not json at all", r#"{"genre": "horror"}"#])
                .then_fail("timeout")
                .then_reply(ModelReply::text(r#"{"summary": "ok"}"#)),
        );
        let refiner = Refiner {
            attempts: 4,
            ..refiner(&model)
        };
        let state = WorkflowState::new("raw", 3);

        let outcome = refiner.run(&state, &RunObserver::silent(Ulid::new())).await;

        assert_eq!(model.call_count(), 4);
        assert_eq!(outcome.value.summary, "ok");
        assert!(!outcome.fallback_used);
    }

    #[tokio::test]
    async fn falls_back_to_verbatim_input_after_three_attempts() {
        let model = Arc::new(ScriptedModel::texts(&["nope", "still nope", "{}", "unused"]));
        let state = WorkflowState::new("  a lighthouse keeper's secret  ", 3);

        let outcome = refiner(&model).run(&state, &RunObserver::silent(Ulid::new())).await;

        assert_eq!(model.call_count(), 3);
        assert!(outcome.fallback_used);
        assert_eq!(outcome.value.summary, "  a lighthouse keeper's secret  ");
        assert_eq!(outcome.value.genre.as_deref(), Some(DEFAULT_GENRE));
        assert_eq!(outcome.value.style.as_deref(), Some(DEFAULT_STYLE));
        assert_eq!(outcome.value.length.as_deref(), Some(DEFAULT_LENGTH));
    }

    #[tokio::test]
    async fn tool_calls_are_not_executed() {
        let reply = ModelReply {
            content: r#"{"summary": "A frozen harbor"}"#.to_string(),
            tool_calls: vec![ToolCall {
                id: "call_0".to_string(),
                name: crate::tools::LOOKUP_TOOL_NAME.to_string(),
                arguments: serde_json::json!({ "query": "harbor" }),
            }],
        };
        let model = Arc::new(ScriptedModel::new(vec![reply]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = RunObserver::channel(Ulid::new(), tx, StreamMode::Updates);
        let state = WorkflowState::new("harbor", 3);

        let outcome = refiner(&model).run(&state, &observer).await;

        assert_eq!(outcome.value.summary, "A frozen harbor");
        assert_eq!(model.call_count(), 1);
        assert!(model.recorded_tools()[0].is_empty());
        assert!(rx.try_recv().is_err(), "refine emits no tool events");
    }

    #[tokio::test]
    async fn token_mode_streams_refine_text() {
        let model = Arc::new(ScriptedModel::texts(&[r#"{"summary": "A heist"}"#]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = RunObserver::channel(Ulid::new(), tx, StreamMode::Tokens);
        let state = WorkflowState::new("heist", 3);

        refiner(&model).run(&state, &observer).await;

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::ModelDelta { role: Role::Refine, .. }
        ));
    }

    #[test]
    fn map_request_requires_summary() {
        let record = extract_record(r#"{"summary": "   ", "genre": "sci-fi"}"#).unwrap();
        assert_eq!(map_request(&record), Err(RefineError::MissingSummary));
    }
}
