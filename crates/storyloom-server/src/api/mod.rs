// ABOUTME: API module containing all HTTP handler functions for the storyloom JSON API.
// ABOUTME: Organized into sub-modules for synchronous runs, streamed runs and server status.

pub mod runs;
pub mod status;
pub mod stream;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// A JSON error body with the given status.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}
