// ABOUTME: HTTP server crate for storyloom, exposing workflow runs over a JSON and SSE API.
// ABOUTME: Provides the Axum router, shared state, environment configuration and provider detection.

pub mod api;
pub mod app_state;
pub mod config;
pub mod providers;
pub mod routes;

#[cfg(test)]
pub(crate) mod test_env;

pub use app_state::{AppState, SharedState};
pub use config::{ConfigError, MAX_RETRIES_LIMIT, StoryloomConfig};
pub use providers::{ProviderInfo, ProviderStatus};
pub use routes::create_router;
