// ABOUTME: Defines WorkflowState, the single mutable record threaded through a workflow run.
// ABOUTME: Owns the append-only histories, the retry counter and the Review -> {Write, Terminal} branch.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{ReviewVerdict, StoryDraft, WritingRequest};

/// Retry budget used when a run does not specify one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Position of the workflow state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Init,
    Write,
    Review,
    Terminal,
}

impl WorkflowStep {
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowStep::Init => "init",
            WorkflowStep::Write => "write",
            WorkflowStep::Review => "review",
            WorkflowStep::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which of the two terminal causes ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Approved,
    RetriesExhausted,
}

/// The full state of one workflow run. Owned by the state machine; role
/// handlers only ever see it by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: Ulid,
    pub user_input: String,
    pub request: Option<WritingRequest>,
    pub draft: Option<StoryDraft>,
    pub draft_history: Vec<String>,
    pub verdict: Option<ReviewVerdict>,
    pub feedback_history: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub is_complete: bool,
}

impl WorkflowState {
    /// Create a fresh state for the given input and retry budget.
    pub fn new(user_input: impl Into<String>, max_retries: u32) -> Self {
        Self {
            run_id: Ulid::new(),
            user_input: user_input.into(),
            request: None,
            draft: None,
            draft_history: Vec::new(),
            verdict: None,
            feedback_history: Vec::new(),
            retry_count: 0,
            max_retries,
            is_complete: false,
        }
    }

    /// Store the refined request. The request is set once per run.
    pub fn set_request(&mut self, request: WritingRequest) {
        if self.request.is_some() {
            tracing::warn!(run_id = %self.run_id, "request already set; replacing it");
        }
        self.request = Some(request);
    }

    /// Record a new draft: it supersedes the previous one and its body is
    /// appended to the draft history.
    pub fn record_draft(&mut self, draft: StoryDraft) {
        self.draft_history.push(draft.body.clone());
        self.draft = Some(draft);
    }

    /// Apply a review verdict and decide the next step.
    ///
    /// A rejection appends its feedback and increments `retry_count` before the
    /// branch is evaluated, so the exhaustion check sees the new count.
    pub fn record_verdict(&mut self, verdict: ReviewVerdict) -> WorkflowStep {
        if self.is_complete {
            tracing::warn!(run_id = %self.run_id, "verdict recorded on a completed run; ignoring");
            return WorkflowStep::Terminal;
        }

        if !verdict.approved {
            self.feedback_history.push(verdict.feedback.clone());
            self.retry_count += 1;
        }
        let approved = verdict.approved;
        self.verdict = Some(verdict);

        if approved || self.retry_count >= self.max_retries {
            self.is_complete = true;
            WorkflowStep::Terminal
        } else {
            WorkflowStep::Write
        }
    }

    /// The terminal cause, or None while the run is still in progress.
    pub fn outcome(&self) -> Option<RunOutcome> {
        if !self.is_complete {
            return None;
        }
        match &self.verdict {
            Some(v) if v.approved => Some(RunOutcome::Approved),
            _ => Some(RunOutcome::RetriesExhausted),
        }
    }

    /// Most recent reviewer feedback, if any rejection happened.
    pub fn latest_feedback(&self) -> Option<&str> {
        self.feedback_history.last().map(String::as_str)
    }

    /// Body of the most recent draft, if any draft was written.
    pub fn latest_draft_body(&self) -> Option<&str> {
        self.draft_history.last().map(String::as_str)
    }
}
