//! # Provider SPI
//!
//! The uniform contract every backend conforms to. The core only ever calls
//! [`Provider::name`], [`Provider::capabilities`], and [`Provider::invoke`] —
//! everything else (HTTP transport, SDK handles, connection pools) is opaque
//! to the orchestrator.
//!
//! Implementations may maintain pooled clients internally but must not leak
//! per-request state across calls: the SPI is otherwise stateless from the
//! core's point of view.

pub mod duration_serde;
pub mod http_client;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod openrouter;
pub mod gemini;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::models::ProviderRequest;

/// A capability token a provider may advertise. The core never requires any
/// capability but callers (CLI, consensus config) may filter on them.
pub type Capability = &'static str;

pub const CAP_STREAMING: Capability = "streaming";
pub const CAP_JSON_MODE: Capability = "json_mode";

/// The uniform call contract every backend implements.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in metrics, weights, and tie-breaking.
    fn name(&self) -> &str;

    /// Capability tokens this backend advertises.
    fn capabilities(&self) -> Vec<Capability> {
        Vec::new()
    }

    /// Perform exactly one invocation. May suspend on I/O; must honour
    /// `deadline` — the caller, not the provider, is responsible for overall
    /// timeout bookkeeping, but a provider that can detect it has exceeded
    /// `deadline` should stop and return [`RunnerError::TimeoutError`] rather
    /// than continue indefinitely.
    async fn invoke(
        &self,
        request: &ProviderRequest,
        deadline: Instant,
    ) -> Result<crate::models::ProviderResponse, RunnerError>;
}

/// Static configuration for constructing one provider backend. Deserialized
/// directly from the CLI's `--providers <path>` YAML file; `timeout` accepts
/// either a `"30s"`-style string or the serde-default struct form via
/// [`duration_serde`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub model_mapping: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            api_key: None,
            base_url: None,
            timeout: default_timeout(),
            model_mapping: HashMap::new(),
            headers: HashMap::new(),
            enabled: true,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_model_mapping(mut self, logical: impl Into<String>, native: impl Into<String>) -> Self {
        self.model_mapping.insert(logical.into(), native.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Builds a concrete [`Provider`] from a [`ProviderConfig`], dispatching on
/// `config.kind`. The returned `name()` matches `config.name`, so multiple
/// instances of the same backend kind (e.g. two OpenAI-compatible endpoints
/// with different base URLs) can coexist in one provider list.
pub fn create_provider(config: ProviderConfig) -> Result<Box<dyn Provider>, RunnerError> {
    if !config.enabled {
        return Err(RunnerError::ProviderSkip {
            reason: format!("provider '{}' disabled by configuration", config.name),
        });
    }
    match config.kind.as_str() {
        "openai" => Ok(Box::new(openai::OpenAiProvider::new(config)?)),
        "gemini" => Ok(Box::new(gemini::GeminiProvider::new(config)?)),
        "ollama" => Ok(Box::new(ollama::OllamaProvider::new(config)?)),
        "openrouter" => Ok(Box::new(openrouter::OpenRouterProvider::new(config)?)),
        "mock" => Ok(Box::new(mock::MockProvider::new(config))),
        other => Err(RunnerError::ConfigError {
            message: format!("unknown provider kind '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_provider_is_skipped_not_constructed() {
        let mut config = ProviderConfig::new("stub", "mock");
        config.enabled = false;
        let err = create_provider(config).unwrap_err();
        assert!(matches!(err, RunnerError::ProviderSkip { .. }));
    }

    #[test]
    fn unknown_kind_is_config_error() {
        let config = ProviderConfig::new("stub", "nonexistent");
        let err = create_provider(config).unwrap_err();
        assert!(matches!(err, RunnerError::ConfigError { .. }));
    }
}
