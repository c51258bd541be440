// ABOUTME: SSE handler that runs a workflow and streams its events as they happen.
// ABOUTME: Each WorkflowEvent becomes one SSE event named after its payload kind.

use axum::Json;
use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;

use storyloom_agent::{RunRequest, StreamMode};
use storyloom_core::WorkflowEvent;

use super::runs::prepare_request;
use crate::app_state::SharedState;

/// Query parameters of POST /api/runs/stream.
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Also stream model text increments.
    #[serde(default)]
    pub tokens: bool,
}

/// Convert workflow events into SSE events. Events that fail to serialize are skipped.
fn sse_events(
    events: impl Stream<Item = WorkflowEvent>,
) -> impl Stream<Item = Result<SseEvent, axum::Error>> {
    events.filter_map(|event| async move {
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok(SseEvent::default()
            .event(event.payload.kind())
            .id(event.seq.to_string())
            .data(data)))
    })
}

/// POST /api/runs/stream - Run a workflow and stream its events over SSE.
pub async fn stream_run(
    State(state): State<SharedState>,
    Query(params): Query<StreamParams>,
    Json(body): Json<RunRequest>,
) -> Response {
    let request = match prepare_request(&state, body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let mode = if params.tokens {
        StreamMode::Tokens
    } else {
        StreamMode::Updates
    };
    let events = state.workflow.stream(request, mode);

    Sse::new(sse_events(events))
        .keep_alive(KeepAlive::default())
        .into_response()
}
