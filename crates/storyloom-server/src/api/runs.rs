// ABOUTME: Synchronous run API handler: executes a whole workflow and returns its terminal state.
// ABOUTME: Also validates run requests for both the synchronous and the streaming endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use ulid::Ulid;

use storyloom_agent::RunRequest;
use storyloom_core::{RunOutcome, WorkflowState};

use super::error_response;
use crate::app_state::{AppState, SharedState};
use crate::config::MAX_RETRIES_LIMIT;

/// Body returned by POST /api/runs.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: Ulid,
    pub outcome: RunOutcome,
    pub state: WorkflowState,
}

/// POST /api/runs - Run a workflow to completion.
pub async fn create_run(State(state): State<SharedState>, Json(body): Json<RunRequest>) -> Response {
    let request = match prepare_request(&state, body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let final_state = state.workflow.run(request).await;
    let outcome = final_state
        .outcome()
        .unwrap_or(RunOutcome::RetriesExhausted);

    (
        StatusCode::OK,
        Json(RunResponse {
            run_id: final_state.run_id,
            outcome,
            state: final_state,
        }),
    )
        .into_response()
}

/// Validate a run request and fill in the server's default retry budget.
pub(crate) fn prepare_request(state: &AppState, mut body: RunRequest) -> Result<RunRequest, Response> {
    if body.user_input.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "user_input must not be empty",
        ));
    }

    match body.max_retries {
        Some(requested) if requested > MAX_RETRIES_LIMIT => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("max_retries must be at most {}", MAX_RETRIES_LIMIT),
            ));
        }
        Some(_) => {}
        None => body.max_retries = Some(state.default_max_retries),
    }

    Ok(body)
}
