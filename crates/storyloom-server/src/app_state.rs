// ABOUTME: Shared application state for the storyloom HTTP server.
// ABOUTME: Holds the workflow engine, the detected provider status and the default retry budget.

use std::sync::Arc;

use storyloom_agent::Workflow;

use crate::providers::ProviderStatus;

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub workflow: Arc<Workflow>,
    pub provider_status: ProviderStatus,
    /// Retry budget for requests that do not name one.
    pub default_max_retries: u32,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(workflow: Arc<Workflow>, provider_status: ProviderStatus, default_max_retries: u32) -> Self {
        Self {
            workflow,
            provider_status,
            default_max_retries,
        }
    }
}
