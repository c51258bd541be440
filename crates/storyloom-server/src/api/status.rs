// ABOUTME: Status and maintenance API handlers: provider detection and prompt reloading.
// ABOUTME: Prompt reloading drops the cached prompt set so the next run reads the files again.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::error_response;
use crate::app_state::SharedState;

/// GET /api/providers - Report which chat-model providers are configured.
pub async fn list_providers(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.provider_status.clone())
}

/// POST /api/prompts/reload - Re-read role prompts from the prompts directory.
pub async fn reload_prompts(State(state): State<SharedState>) -> Response {
    let prompts = state.workflow.prompts();
    prompts.invalidate();

    match prompts.load() {
        Ok(_) => {
            tracing::info!(dir = ?prompts.dir(), "prompts reloaded");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "reloaded",
                    "dir": prompts.dir().map(|d| d.display().to_string()),
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "prompt reload failed");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}
