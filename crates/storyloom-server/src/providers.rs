// ABOUTME: Reports which chat-model backends a storyloom run could use, for /api/providers and startup logs.
// ABOUTME: Only the presence of credentials is reported; key values never leave the process environment.

use serde::Serialize;

/// Environment variables and fallback model of one chat-model backend.
struct Backend {
    name: &'static str,
    key_var: Option<&'static str>,
    model_var: &'static str,
    base_url_var: &'static str,
    default_model: &'static str,
}

const BACKENDS: [Backend; 3] = [
    Backend {
        name: "ollama",
        key_var: None,
        model_var: "OLLAMA_MODEL",
        base_url_var: "OLLAMA_BASE_URL",
        default_model: "gpt-oss:20b",
    },
    Backend {
        name: "openai",
        key_var: Some("OPENAI_API_KEY"),
        model_var: "OPENAI_MODEL",
        base_url_var: "OPENAI_BASE_URL",
        default_model: "gpt-4o",
    },
    Backend {
        name: "anthropic",
        key_var: Some("ANTHROPIC_API_KEY"),
        model_var: "ANTHROPIC_MODEL",
        base_url_var: "ANTHROPIC_BASE_URL",
        default_model: "claude-sonnet-4-5-20250929",
    },
];

/// What a story run would get from one backend.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub requires_api_key: bool,
    pub has_api_key: bool,
    /// A run can start against this backend right now.
    pub available: bool,
    /// Model the writer, reviewer and refiner would talk to.
    pub model: String,
    pub base_url: Option<String>,
}

/// Backends known to storyloom and the one runs use by default.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub default_provider: String,
    pub default_model: Option<String>,
    pub providers: Vec<ProviderInfo>,
    pub any_available: bool,
}

impl ProviderStatus {
    /// Inspect the environment. STORYLOOM_PROVIDER / STORYLOOM_MODEL pick the
    /// default; each backend reads its own *_API_KEY, *_MODEL and *_BASE_URL.
    pub fn detect() -> Self {
        let providers: Vec<ProviderInfo> = BACKENDS.iter().map(inspect).collect();

        Self {
            default_provider: env_value("STORYLOOM_PROVIDER")
                .map(|p| p.to_lowercase())
                .unwrap_or_else(|| BACKENDS[0].name.to_string()),
            default_model: env_value("STORYLOOM_MODEL"),
            any_available: providers.iter().any(|p| p.available),
            providers,
        }
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderInfo> {
        self.providers.iter().find(|p| p.name == name)
    }
}

fn inspect(backend: &Backend) -> ProviderInfo {
    let has_api_key = backend.key_var.and_then(env_value).is_some();

    ProviderInfo {
        name: backend.name.to_string(),
        requires_api_key: backend.key_var.is_some(),
        has_api_key,
        available: backend.key_var.is_none() || has_api_key,
        model: env_value(backend.model_var).unwrap_or_else(|| backend.default_model.to_string()),
        base_url: env_value(backend.base_url_var),
    }
}

fn env_value(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}
