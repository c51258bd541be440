// ABOUTME: The workflow engine: sequences Refine, then Write/Review until approval or retry exhaustion.
// ABOUTME: Runs either to completion (run) or as a spawned task feeding an event stream (stream).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use storyloom_core::{
    DEFAULT_MAX_RETRIES, EventPayload, RunOutcome, WorkflowEvent, WorkflowState, WorkflowStep,
};

use crate::observer::{RunObserver, StreamMode};
use crate::prompts::{PromptSet, PromptStore};
use crate::roles::{Refiner, Reviewer, RoleHandler, Writer};
use crate::runtime::ChatModel;
use crate::tools::KnowledgeLookup;

/// Input of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub user_input: String,
    /// Rejections tolerated before giving up; `DEFAULT_MAX_RETRIES` when absent.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl RunRequest {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Shared collaborators of every run: the chat model, the lookup tool and
/// the prompt store. Each run builds its own handlers and state.
pub struct Workflow {
    model: Arc<dyn ChatModel>,
    lookup: Arc<dyn KnowledgeLookup>,
    prompts: Arc<PromptStore>,
}

impl Workflow {
    pub fn new(
        model: Arc<dyn ChatModel>,
        lookup: Arc<dyn KnowledgeLookup>,
        prompts: Arc<PromptStore>,
    ) -> Self {
        Self {
            model,
            lookup,
            prompts,
        }
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    pub fn prompts(&self) -> &Arc<PromptStore> {
        &self.prompts
    }

    /// Run the workflow to its terminal state.
    pub async fn run(&self, request: RunRequest) -> WorkflowState {
        let state = new_state(request);
        let observer = RunObserver::silent(state.run_id);
        self.drive(state, &observer).await
    }

    /// Run the workflow on a spawned task and stream its events. The stream
    /// ends after `RunCompleted`. Dropping it stops delivery, not the run.
    pub fn stream(self: &Arc<Self>, request: RunRequest, mode: StreamMode) -> UnboundedReceiverStream<WorkflowEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let workflow = Arc::clone(self);

        tokio::spawn(async move {
            let state = new_state(request);
            let observer = RunObserver::channel(state.run_id, tx, mode);
            workflow.drive(state, &observer).await;
        });

        UnboundedReceiverStream::new(rx)
    }

    fn load_prompts(&self) -> Arc<PromptSet> {
        match self.prompts.load() {
            Ok(prompts) => prompts,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load prompts; using built-in prompts");
                Arc::new(PromptSet::default())
            }
        }
    }

    async fn drive(&self, mut state: WorkflowState, observer: &RunObserver) -> WorkflowState {
        let prompts = self.load_prompts();
        let refiner = Refiner::new(prompts.refine.clone(), Arc::clone(&self.model));
        let writer = Writer::new(
            prompts.write.clone(),
            Arc::clone(&self.model),
            Arc::clone(&self.lookup),
        );
        let reviewer = Reviewer::new(
            prompts.review.clone(),
            Arc::clone(&self.model),
            Arc::clone(&self.lookup),
        );

        tracing::info!(
            run_id = %state.run_id,
            provider = self.model.provider_name(),
            model = self.model.model_name(),
            max_retries = state.max_retries,
            "workflow run started"
        );
        observer.emit(EventPayload::RunStarted {
            user_input: state.user_input.clone(),
            max_retries: state.max_retries,
        });

        let mut step = WorkflowStep::Init;
        while step != WorkflowStep::Terminal {
            observer.emit(EventPayload::StepStarted { step });

            step = match step {
                WorkflowStep::Init => {
                    let outcome = refiner.run(&state, observer).await;
                    state.set_request(outcome.value.clone());
                    observer.emit(EventPayload::RequestRefined {
                        request: outcome.value,
                        fallback_used: outcome.fallback_used,
                    });
                    WorkflowStep::Write
                }
                WorkflowStep::Write => {
                    let outcome = writer.run(&state, observer).await;
                    state.record_draft(outcome.value.clone());
                    observer.emit(EventPayload::DraftWritten {
                        draft: outcome.value,
                        revision: state.draft_history.len(),
                        fallback_used: outcome.fallback_used,
                    });
                    WorkflowStep::Review
                }
                WorkflowStep::Review => {
                    let outcome = reviewer.run(&state, observer).await;
                    let next = state.record_verdict(outcome.value.clone());
                    tracing::info!(
                        run_id = %state.run_id,
                        approved = outcome.value.approved,
                        retry_count = state.retry_count,
                        next = %next,
                        "review applied"
                    );
                    observer.emit(EventPayload::DraftReviewed {
                        verdict: outcome.value,
                        retry_count: state.retry_count,
                        is_complete: state.is_complete,
                        fallback_used: outcome.fallback_used,
                    });
                    next
                }
                WorkflowStep::Terminal => WorkflowStep::Terminal,
            };
        }

        let outcome = state.outcome().unwrap_or(RunOutcome::RetriesExhausted);
        match outcome {
            RunOutcome::Approved => tracing::info!(
                run_id = %state.run_id,
                drafts = state.draft_history.len(),
                retry_count = state.retry_count,
                "workflow run approved"
            ),
            RunOutcome::RetriesExhausted => tracing::warn!(
                run_id = %state.run_id,
                drafts = state.draft_history.len(),
                retry_count = state.retry_count,
                "workflow run gave up after exhausting retries"
            ),
        }
        observer.emit(EventPayload::RunCompleted {
            outcome,
            state: Box::new(state.clone()),
        });

        state
    }
}

fn new_state(request: RunRequest) -> WorkflowState {
    WorkflowState::new(
        request.user_input,
        request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
    )
}
