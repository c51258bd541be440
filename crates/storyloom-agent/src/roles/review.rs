// ABOUTME: The review role: judges the current draft and returns a ReviewVerdict.
// ABOUTME: Empty or unparsable output is turned into a zero-score rejection so a verdict always exists.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use storyloom_core::model::clamp_score;
use storyloom_core::{ReviewVerdict, Role, WorkflowState};

use super::{RoleHandler, RoleOutcome, request_lines};
use crate::extract::{Record, bool_field, extract_record, number_field, string_field, string_list_field};
use crate::observer::RunObserver;
use crate::runtime::{ChatMessage, ChatModel};
use crate::tool_loop::{ToolLoop, truncate_chars};
use crate::tools::{KnowledgeLookup, lookup_tool_definition};

/// Model calls the reviewer may spend on one verdict.
pub const REVIEW_MAX_ITERATIONS: usize = 4;

/// Characters of raw output quoted in a parse-failure rejection.
const RAW_QUOTE_CHARS: usize = 500;

const NO_STORY: &str = "(no story)";

pub struct Reviewer {
    prompt: String,
    model: Arc<dyn ChatModel>,
    lookup: Arc<dyn KnowledgeLookup>,
    tools: Vec<Value>,
    max_iterations: usize,
}

impl Reviewer {
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
            max_iterations: REVIEW_MAX_ITERATIONS,
        }
    }
}

#[async_trait]
impl RoleHandler for Reviewer {
    type Output = ReviewVerdict;

    fn role(&self) -> Role {
        Role::Review
    }

    async fn run(&self, state: &WorkflowState, observer: &RunObserver) -> RoleOutcome<ReviewVerdict> {
        let mut history = vec![
            ChatMessage::system(self.prompt.clone()),
            ChatMessage::user(build_user_message(state)),
        ];
        let tool_loop = ToolLoop {
            role: Role::Review,
            model: self.model.as_ref(),
            lookup: self.lookup.as_ref(),
            tools: &self.tools,
            observer,
        };
        let outcome = tool_loop.run(&mut history, self.max_iterations).await;

        if outcome.text.trim().is_empty() {
            tracing::warn!(run_id = %state.run_id, "reviewer returned no text; rejecting the draft");
            return RoleOutcome::fallback(ReviewVerdict::rejection(
                "Review failed: the reviewer returned an empty response.",
                "empty review response",
            ));
        }

        match extract_record(&outcome.text) {
            Some(record) => {
                let verdict = map_verdict(&record);
                tracing::info!(
                    run_id = %state.run_id,
                    approved = verdict.approved,
                    score = verdict.score,
                    issues = verdict.issues.len(),
                    tool_calls = outcome.tool_calls,
                    "draft reviewed"
                );
                RoleOutcome::parsed(verdict)
            }
            None => {
                tracing::warn!(run_id = %state.run_id, "reviewer output unparsable; rejecting the draft");
                RoleOutcome::fallback(ReviewVerdict::rejection(
                    format!(
                        "Failed to parse the review response. Raw: {}",
                        truncate_chars(&outcome.text, RAW_QUOTE_CHARS)
                    ),
                    "review parsing failed",
                ))
            }
        }
    }
}

/// The reviewer's user message: request, draft under review, attempt counter.
pub fn build_user_message(state: &WorkflowState) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(request) = &state.request {
        parts.push("## Request".to_string());
        parts.extend(request_lines(request));
        parts.push(String::new());
    }

    parts.push("## Story to Review".to_string());
    match &state.draft {
        Some(draft) if !draft.body.is_empty() => parts.push(draft.body.clone()),
        _ => parts.push(NO_STORY.to_string()),
    }
    parts.push(String::new());

    parts.push("## Review Info".to_string());
    parts.push(format!("Attempt: {} / {}", state.retry_count, state.max_retries));

    parts.join("\n")
}

/// Map a recovered record into a verdict. Absent fields reject.
pub fn map_verdict(record: &Record) -> ReviewVerdict {
    ReviewVerdict {
        approved: bool_field(record, &["approved", "is_approved"]).unwrap_or(false),
        score: clamp_score(number_field(record, &["score"]).unwrap_or(0.0)),
        feedback: string_field(record, &["feedback"]).unwrap_or_default(),
        issues: string_list_field(record, &["issues"]),
    }
}
