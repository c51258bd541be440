// ABOUTME: Shared helpers for server unit tests: an environment lock and scripted application state.
// ABOUTME: Every test that touches process environment variables must hold `lock_env`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use storyloom_agent::testing::ScriptedModel;
use storyloom_agent::{NoLookup, PromptStore, Workflow};

use crate::app_state::{AppState, SharedState};
use crate::providers::ProviderStatus;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub const REFINED: &str =
    r#"{"summary": "A dragon who cannot stay awake", "genre": "fantasy", "style": "whimsical", "length": "short"}"#;
pub const APPROVE: &str = r#"{"approved": true, "score": 9, "feedback": "Lovely.", "issues": []}"#;
pub const REJECT: &str =
    r#"{"approved": false, "score": 4, "feedback": "Add more tension.", "issues": ["flat middle"]}"#;

/// Serialize access to process environment variables across test modules.
pub fn lock_env() -> MutexGuard<'static, ()> {
    ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
}

fn detect_providers() -> ProviderStatus {
    let _lock = lock_env();
    ProviderStatus::detect()
}

/// Application state whose model answers with `replies` in order.
pub fn scripted_state(replies: &[&str], default_max_retries: u32) -> SharedState {
    let workflow = Workflow::new(
        Arc::new(ScriptedModel::texts(replies)),
        Arc::new(NoLookup),
        Arc::new(PromptStore::builtin()),
    );
    Arc::new(AppState::new(
        Arc::new(workflow),
        detect_providers(),
        default_max_retries,
    ))
}

/// Application state reading its prompts from `dir`.
pub fn state_with_prompts(dir: &Path) -> SharedState {
    let workflow = Workflow::new(
        Arc::new(ScriptedModel::default()),
        Arc::new(NoLookup),
        Arc::new(PromptStore::new(dir)),
    );
    Arc::new(AppState::new(Arc::new(workflow), detect_providers(), 3))
}
