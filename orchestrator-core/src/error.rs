//! # Error Taxonomy
//!
//! This module defines the closed set of failure kinds that drives every
//! routing decision in the runner: sequential failover, parallel cancellation,
//! and consensus abstention all dispatch on [`RunnerError`] variants rather
//! than on provider-specific error types.
//!
//! ## Overview
//!
//! Every provider backend emits its own transport-level errors internally
//! (HTTP status codes, malformed JSON, connection failures) but must
//! translate them into exactly one [`RunnerError`] variant at the
//! [`crate::providers::Provider::invoke`] boundary. The core never inspects
//! a backend-internal error type.
//!
//! ## Retry semantics
//!
//! Each variant carries fixed advance/retry semantics, enforced by the
//! runners in [`crate::runner`]:
//!
//! - [`RunnerError::AuthError`], [`RunnerError::ConfigError`] — non-retriable, advance to the next provider.
//! - [`RunnerError::RateLimitError`] — sleep `rate_limit_sleep_s`, then advance.
//! - [`RunnerError::TimeoutError`], [`RunnerError::RetriableError`] — advance immediately.
//! - [`RunnerError::ProviderSkip`] — not a failure; never surfaces as a final error.
//! - [`RunnerError::ParallelExecutionError`], [`RunnerError::AllFailedError`] — terminal, carry
//!   the ordered list of per-provider failures for diagnosis without log access.
//!
//! ## Example
//!
//! ```no_run
//! use orchestrator_core::error::{RunnerError, FailureKind};
//!
//! fn classify(e: &RunnerError) -> FailureKind {
//!     e.kind()
//! }
//! ```

use serde::Serialize;
use std::fmt;

/// One entry in an ordered failure list carried by a terminal error.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: FailureKind,
    /// Redacted, human-readable message. Never contains API keys or auth headers.
    pub message: String,
}

/// Discriminator for [`RunnerError`], used as the `failure_kind` field in
/// metric events and in [`ProviderFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    Config,
    RateLimit,
    Timeout,
    Retriable,
    ProviderSkip,
    ParallelExecution,
    AllFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Auth => "auth",
            FailureKind::Config => "config",
            FailureKind::RateLimit => "rate_limit",
            FailureKind::Timeout => "timeout",
            FailureKind::Retriable => "retriable",
            FailureKind::ProviderSkip => "provider_skip",
            FailureKind::ParallelExecution => "parallel_execution",
            FailureKind::AllFailed => "all_failed",
        };
        f.write_str(s)
    }
}

/// The runtime's single public error type. Every provider-call failure,
/// every runner-terminal failure, is one of these eight variants.
#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    /// Credentials missing or rejected by the provider. Non-retriable.
    #[error("authentication failed: {message}")]
    AuthError { message: String },

    /// Provider misconfigured: invalid option, unsupported parameter. Non-retriable.
    #[error("configuration error: {message}")]
    ConfigError { message: String },

    /// Provider signalled quota/rate exhaustion (e.g. HTTP 429). Retriable after a sleep.
    #[error("rate limit exceeded: {message}")]
    RateLimitError { message: String },

    /// Per-attempt deadline exceeded.
    #[error("request timed out after {elapsed_ms}ms")]
    TimeoutError { elapsed_ms: u64 },

    /// Generic transient failure: HTTP 5xx, network error, malformed response.
    #[error("transient provider failure: {message}")]
    RetriableError { message: String },

    /// Provider declined to run (e.g. API key absent, offline mode). Not a
    /// failure: logged and the next provider is tried; never surfaces as final.
    #[error("provider skipped: {reason}")]
    ProviderSkip { reason: String },

    /// A parallel mode could not produce a winner; carries every per-candidate failure.
    #[error("parallel execution produced no usable candidate ({} failures)", failures.len())]
    ParallelExecutionError { failures: Vec<ProviderFailure> },

    /// Every provider in a sequential chain failed; carries the ordered failures.
    #[error("all {} providers failed", failures.len())]
    AllFailedError { failures: Vec<ProviderFailure> },
}

impl RunnerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RunnerError::AuthError { .. } => FailureKind::Auth,
            RunnerError::ConfigError { .. } => FailureKind::Config,
            RunnerError::RateLimitError { .. } => FailureKind::RateLimit,
            RunnerError::TimeoutError { .. } => FailureKind::Timeout,
            RunnerError::RetriableError { .. } => FailureKind::Retriable,
            RunnerError::ProviderSkip { .. } => FailureKind::ProviderSkip,
            RunnerError::ParallelExecutionError { .. } => FailureKind::ParallelExecution,
            RunnerError::AllFailedError { .. } => FailureKind::AllFailed,
        }
    }

    /// Whether the sequential runner should sleep `rate_limit_sleep_s` before advancing.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, RunnerError::RateLimitError { .. })
    }

    /// Whether this kind must never surface as a final error (it is silently skipped).
    pub fn is_skip(&self) -> bool {
        matches!(self, RunnerError::ProviderSkip { .. })
    }
}

/// Narrow, backend-internal error used by provider adapters before they
/// classify a failure into a [`RunnerError`] at the SPI boundary. Never
/// exposed past [`crate::providers::Provider::invoke`].
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http {code}: {message}")]
    Api { code: u16, message: String },

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    #[error("rate limited")]
    RateLimit,

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl From<TransportError> for RunnerError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::InvalidApiKey => RunnerError::AuthError {
                message: e.to_string(),
            },
            TransportError::Configuration { message } => RunnerError::ConfigError { message },
            TransportError::RateLimit => RunnerError::RateLimitError {
                message: e.to_string(),
            },
            TransportError::ModelNotFound { .. } => RunnerError::ConfigError {
                message: e.to_string(),
            },
            TransportError::ServiceUnavailable
            | TransportError::Http(_)
            | TransportError::Api { .. }
            | TransportError::Serialization(_) => RunnerError::RetriableError {
                message: e.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let e = RunnerError::AuthError {
            message: "bad key".into(),
        };
        assert_eq!(e.kind(), FailureKind::Auth);
        assert!(!e.is_rate_limit());
        assert!(!e.is_skip());
    }

    #[test]
    fn rate_limit_detected() {
        let e = RunnerError::RateLimitError {
            message: "429".into(),
        };
        assert!(e.is_rate_limit());
    }

    #[test]
    fn transport_maps_to_expected_kind() {
        let e: RunnerError = TransportError::InvalidApiKey.into();
        assert_eq!(e.kind(), FailureKind::Auth);

        let e: RunnerError = TransportError::ServiceUnavailable.into();
        assert_eq!(e.kind(), FailureKind::Retriable);

        let e: RunnerError = TransportError::RateLimit.into();
        assert_eq!(e.kind(), FailureKind::RateLimit);
    }

    #[test]
    fn failure_kind_display() {
        assert_eq!(FailureKind::RateLimit.to_string(), "rate_limit");
        assert_eq!(FailureKind::AllFailed.to_string(), "all_failed");
    }
}
