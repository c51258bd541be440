// ABOUTME: Defines the event envelope and payload variants emitted while a workflow run progresses.
// ABOUTME: Events are a side channel for observers; they never drive state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{ReviewVerdict, Role, StoryDraft, WritingRequest};
use crate::state::{RunOutcome, WorkflowState, WorkflowStep};

/// An event envelope: a sequenced, timestamped payload for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub seq: u64,
    pub run_id: Ulid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Things that happen during a run, in the order they happen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    RunStarted {
        user_input: String,
        max_retries: u32,
    },
    StepStarted {
        step: WorkflowStep,
    },
    RequestRefined {
        request: WritingRequest,
        fallback_used: bool,
    },
    DraftWritten {
        draft: StoryDraft,
        revision: usize,
        fallback_used: bool,
    },
    DraftReviewed {
        verdict: ReviewVerdict,
        retry_count: u32,
        is_complete: bool,
        fallback_used: bool,
    },
    ToolInvoked {
        role: Role,
        tool: String,
        query: String,
    },
    ModelDelta {
        role: Role,
        text: String,
    },
    RunCompleted {
        outcome: RunOutcome,
        state: Box<WorkflowState>,
    },
}

impl EventPayload {
    /// Snake_case name of the variant, used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::RunStarted { .. } => "run_started",
            EventPayload::StepStarted { .. } => "step_started",
            EventPayload::RequestRefined { .. } => "request_refined",
            EventPayload::DraftWritten { .. } => "draft_written",
            EventPayload::DraftReviewed { .. } => "draft_reviewed",
            EventPayload::ToolInvoked { .. } => "tool_invoked",
            EventPayload::ModelDelta { .. } => "model_delta",
            EventPayload::RunCompleted { .. } => "run_completed",
        }
    }

    /// True for the final event of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventPayload::RunCompleted { .. })
    }
}
