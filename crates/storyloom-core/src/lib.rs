// ABOUTME: Core library for storyloom, containing the data model, run state and workflow events.
// ABOUTME: This crate has no I/O; the agent and server crates build on it.

pub mod event;
pub mod model;
pub mod state;

pub use event::{EventPayload, WorkflowEvent};
pub use model::{ReviewVerdict, Role, StoryDraft, WritingRequest};
pub use state::{DEFAULT_MAX_RETRIES, RunOutcome, WorkflowState, WorkflowStep};
