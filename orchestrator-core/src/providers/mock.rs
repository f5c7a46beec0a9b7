//! Deterministic, in-process provider used by the crate's own test suite and
//! available as a `kind = "mock"` backend from CLI provider config. Never
//! touches the network, which is what makes scenarios S1–S6 reproducible
//! without `wiremock` or a running Ollama/OpenAI endpoint.

use std::time::{Duration, Instant};

use crate::error::{FailureKind, RunnerError};
use crate::models::{ProviderRequest, ProviderResponse, TokenUsage};

use super::{Provider, ProviderConfig};

/// What one [`MockProvider::invoke`] call should do.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Succeed with `text`, reporting `latency_ms` (simulated via `sleep`).
    Succeed { text: String, latency_ms: u64 },
    /// Fail immediately with the given kind and message.
    Fail { kind: FailureKind, message: String },
    /// Sleep `sleep_ms` and then succeed, ignoring `deadline` entirely — the
    /// real HTTP adapters don't check it either, so this is what exercises
    /// the executor's own `tokio::time::timeout` wrapper rather than relying
    /// on provider cooperation.
    HangPast { sleep_ms: u64 },
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior::Succeed {
            text: "ok".to_string(),
            latency_ms: 0,
        }
    }
}

pub struct MockProvider {
    name: String,
    behavior: Behavior,
}

impl MockProvider {
    /// Constructed from [`ProviderConfig`] so `create_provider` can build
    /// one from YAML; defaults to an immediate `"ok"` success. Prefer
    /// [`MockProvider::with_behavior`] in tests that need fine control.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            name: config.name,
            behavior: Behavior::default(),
        }
    }

    pub fn with_behavior(name: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            behavior,
        }
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        _request: &ProviderRequest,
        _deadline: Instant,
    ) -> Result<ProviderResponse, RunnerError> {
        match &self.behavior {
            Behavior::Succeed { text, latency_ms } => {
                if *latency_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(*latency_ms)).await;
                }
                Ok(ProviderResponse {
                    text: text.clone(),
                    latency_ms: *latency_ms,
                    token_usage: Some(TokenUsage {
                        prompt_tokens: 1,
                        completion_tokens: 1,
                    }),
                    model: None,
                    finish_reason: Some("stop".to_string()),
                    raw: None,
                })
            }
            Behavior::Fail { kind, message } => Err(fail(*kind, message.clone())),
            Behavior::HangPast { sleep_ms } => {
                tokio::time::sleep(Duration::from_millis(*sleep_ms)).await;
                Ok(ProviderResponse {
                    text: "late".to_string(),
                    latency_ms: *sleep_ms,
                    token_usage: None,
                    model: None,
                    finish_reason: None,
                    raw: None,
                })
            }
        }
    }
}

fn fail(kind: FailureKind, message: String) -> RunnerError {
    match kind {
        FailureKind::Auth => RunnerError::AuthError { message },
        FailureKind::Config => RunnerError::ConfigError { message },
        FailureKind::RateLimit => RunnerError::RateLimitError { message },
        FailureKind::Timeout => RunnerError::TimeoutError { elapsed_ms: 0 },
        FailureKind::Retriable => RunnerError::RetriableError { message },
        FailureKind::ProviderSkip => RunnerError::ProviderSkip { reason: message },
        FailureKind::ParallelExecution | FailureKind::AllFailed => {
            RunnerError::RetriableError { message }
        }
    }
}
