// ABOUTME: The write role: produces a StoryDraft from the request, the latest feedback and the previous draft.
// ABOUTME: Unparsable output becomes a draft whose body is the raw text, with the failure noted.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use storyloom_core::model::UNTITLED;
use storyloom_core::{Role, StoryDraft, WorkflowState};

use super::{RoleHandler, RoleOutcome, request_lines};
use crate::extract::{Record, extract_record, number_field, string_field};
use crate::observer::RunObserver;
use crate::runtime::{ChatMessage, ChatModel};
use crate::tool_loop::ToolLoop;
use crate::tools::{KnowledgeLookup, lookup_tool_definition};

/// Model calls the writer may spend on one draft.
pub const WRITE_MAX_ITERATIONS: usize = 3;

pub struct Writer {
    prompt: String,
    model: Arc<dyn ChatModel>,
    lookup: Arc<dyn KnowledgeLookup>,
    tools: Vec<Value>,
    max_iterations: usize,
}

impl Writer {
    pub fn new(
        prompt: impl Into<String>,
        model: Arc<dyn ChatModel>,
        lookup: Arc<dyn KnowledgeLookup>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            model,
            lookup,
            tools: vec![lookup_tool_definition()],
            max_iterations: WRITE_MAX_ITERATIONS,
        }
    }
}

#[async_trait]
impl RoleHandler for Writer {
    type Output = StoryDraft;

    fn role(&self) -> Role {
        Role::Write
    }

    async fn run(&self, state: &WorkflowState, observer: &RunObserver) -> RoleOutcome<StoryDraft> {
        let mut history = vec![
            ChatMessage::system(self.prompt.clone()),
            ChatMessage::user(build_user_message(state)),
        ];
        let tool_loop = ToolLoop {
            role: Role::Write,
            model: self.model.as_ref(),
            lookup: self.lookup.as_ref(),
            tools: &self.tools,
            observer,
        };
        let outcome = tool_loop.run(&mut history, self.max_iterations).await;

        let parsed = if outcome.text.trim().is_empty() {
            None
        } else {
            extract_record(&outcome.text)
        };

        match parsed {
            Some(record) => {
                let draft = map_draft(&record);
                tracing::info!(
                    run_id = %state.run_id,
                    title = %draft.title,
                    length_hint = draft.length_hint,
                    tool_calls = outcome.tool_calls,
                    "draft written"
                );
                RoleOutcome::parsed(draft)
            }
            None => {
                let reason = if outcome.text.trim().is_empty() {
                    "the model returned no text"
                } else {
                    "no JSON object found"
                };
                tracing::warn!(run_id = %state.run_id, reason, "writer output unparsable; keeping raw text");
                RoleOutcome::fallback(fallback_draft(&outcome.text, reason))
            }
        }
    }
}

/// The writer's user message: latest feedback, previous draft, then the request.
pub fn build_user_message(state: &WorkflowState) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(feedback) = state.latest_feedback() {
        parts.push("## Latest Review Feedback".to_string());
        parts.push(feedback.to_string());
        parts.push("Revise the story to address this feedback.".to_string());
        parts.push(String::new());
    }

    if let Some(previous) = state.latest_draft_body() {
        parts.push("## Previous Version".to_string());
        parts.push(previous.to_string());
        parts.push("Use the previous version as the basis of your revision.".to_string());
        parts.push(String::new());
    }

    if let Some(request) = &state.request {
        parts.push("## Story Request".to_string());
        parts.extend(request_lines(request));
    }

    parts.join("\n")
}

/// Map a recovered record into a draft, backfilling every missing field.
pub fn map_draft(record: &Record) -> StoryDraft {
    let body = string_field(record, &["body", "story"]).unwrap_or_default();
    let length_hint = number_field(record, &["length_hint", "word_count"])
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as usize)
        .unwrap_or_else(|| body.chars().count());

    StoryDraft {
        title: string_field(record, &["title"]).unwrap_or_else(|| UNTITLED.to_string()),
        body,
        length_hint,
        notes: string_field(record, &["notes"]).unwrap_or_default(),
    }
}

/// A draft holding the raw model text when no record could be recovered.
pub fn fallback_draft(raw: &str, reason: &str) -> StoryDraft {
    StoryDraft {
        title: UNTITLED.to_string(),
        body: raw.to_string(),
        length_hint: raw.chars().count(),
        notes: format!("Could not parse the writer output as JSON: {}", reason),
    }
}
