// ABOUTME: The RoleHandler trait shared by the refine, write and review roles.
// ABOUTME: Handlers read the run state, talk to the model and return a typed outcome; they never mutate state.

pub mod refine;
pub mod review;
pub mod write;

use async_trait::async_trait;

use storyloom_core::{Role, WorkflowState, WritingRequest};

use crate::observer::RunObserver;

pub use refine::Refiner;
pub use review::Reviewer;
pub use write::Writer;

/// The typed result of one role invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleOutcome<T> {
    pub value: T,
    /// The value was synthesized because the model output was unusable.
    pub fallback_used: bool,
}

impl<T> RoleOutcome<T> {
    pub fn parsed(value: T) -> Self {
        Self {
            value,
            fallback_used: false,
        }
    }

    pub fn fallback(value: T) -> Self {
        Self {
            value,
            fallback_used: true,
        }
    }
}

/// A bounded prompt-and-parse procedure over the chat model.
#[async_trait]
pub trait RoleHandler: Send + Sync {
    type Output: Send;

    fn role(&self) -> Role;

    /// Run the role against the current state. Never fails: unusable model
    /// output is replaced by a role-specific default.
    async fn run(&self, state: &WorkflowState, observer: &RunObserver)
    -> RoleOutcome<Self::Output>;
}

/// `Label: value` lines for the fields of a request that are set.
pub(crate) fn request_lines(request: &WritingRequest) -> Vec<String> {
    let mut lines = Vec::new();
    if !request.summary.is_empty() {
        lines.push(format!("Prompt: {}", request.summary));
    }
    let optional = [
        ("Genre", &request.genre),
        ("Style", &request.style),
        ("Length", &request.length),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            lines.push(format!("{}: {}", label, value));
        }
    }
    lines
}
