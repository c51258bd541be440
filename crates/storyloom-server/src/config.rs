// ABOUTME: Configuration loading and validation for the storyloom server and CLI.
// ABOUTME: Reads STORYLOOM_* environment variables and applies defaults.

use std::net::SocketAddr;
use std::path::PathBuf;

use storyloom_agent::SUPPORTED_PROVIDERS;
use storyloom_core::DEFAULT_MAX_RETRIES;
use thiserror::Error;

const DEFAULT_BIND: &str = "127.0.0.1:7341";
const DEFAULT_PROVIDER: &str = "ollama";
const DEFAULT_PROMPTS_DIR: &str = "system_prompts";

/// Largest retry budget a run may use.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("STORYLOOM_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("STORYLOOM_MAX_RETRIES is not a non-negative integer: {0}")]
    InvalidMaxRetries(String),

    #[error("STORYLOOM_MAX_RETRIES is {value}, above the limit of {limit}")]
    MaxRetriesTooHigh { value: u32, limit: u32 },

    #[error("STORYLOOM_PROVIDER names an unsupported provider: {0}")]
    UnknownProvider(String),
}

/// Configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryloomConfig {
    pub bind: SocketAddr,
    pub provider: String,
    pub model: Option<String>,
    pub prompts_dir: PathBuf,
    pub lorebook_dir: Option<PathBuf>,
    pub max_retries: u32,
}

impl StoryloomConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - STORYLOOM_BIND: socket address to bind (default: 127.0.0.1:7341)
    /// - STORYLOOM_PROVIDER: ollama, openai or anthropic (default: ollama)
    /// - STORYLOOM_MODEL: model name (optional; provider default otherwise)
    /// - STORYLOOM_PROMPTS_DIR: role prompt files (default: system_prompts)
    /// - STORYLOOM_LOREBOOK_DIR: lore files for the lookup tool (optional)
    /// - STORYLOOM_MAX_RETRIES: rejections tolerated per run (default: 3, at most 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_str = non_empty_var("STORYLOOM_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let provider = non_empty_var("STORYLOOM_PROVIDER")
            .map(|p| p.to_lowercase())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
            return Err(ConfigError::UnknownProvider(provider));
        }

        let model = non_empty_var("STORYLOOM_MODEL");

        let prompts_dir = non_empty_var("STORYLOOM_PROMPTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROMPTS_DIR));

        let lorebook_dir = non_empty_var("STORYLOOM_LOREBOOK_DIR").map(PathBuf::from);

        let max_retries = match non_empty_var("STORYLOOM_MAX_RETRIES") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidMaxRetries(raw))?,
            None => DEFAULT_MAX_RETRIES,
        };
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::MaxRetriesTooHigh {
                value: max_retries,
                limit: MAX_RETRIES_LIMIT,
            });
        }

        Ok(Self {
            bind,
            provider,
            model,
            prompts_dir,
            lorebook_dir,
            max_retries,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
