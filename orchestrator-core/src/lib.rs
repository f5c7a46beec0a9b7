//! # orchestrator-core
//!
//! The execution engine behind the orchestrator CLI: a provider-agnostic
//! runtime that dispatches a single logical inference request to one or
//! more LLM provider backends, applies failover and concurrency policies,
//! optionally shadows a secondary provider for comparison telemetry, and
//! aggregates parallel candidates into a consensus decision.
//!
//! ## Modules
//!
//! - [`error`] — the closed eight-variant error taxonomy every provider
//!   failure is classified into.
//! - [`models`] — request/response/config data types.
//! - [`providers`] — the [`providers::Provider`] SPI and its backends
//!   (OpenAI, Gemini, Ollama, OpenRouter, Mock).
//! - [`rate_limiter`] — the global sliding-window token bucket.
//! - [`metrics`] — the append-only JSONL metrics sink.
//! - [`executor`] — runs exactly one provider attempt.
//! - [`runner`] — sequential, parallel, consensus, and shadow runners,
//!   bound together by [`runner::run`], the crate's single public entry
//!   point.
//! - [`redact`] — secret-scrubbing applied to every persisted error message.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use orchestrator_core::error::RunnerError;
//! use orchestrator_core::metrics::MetricsSink;
//! use orchestrator_core::models::{Mode, ProviderRequest, RunnerConfig};
//! use orchestrator_core::providers::{self, ProviderConfig};
//! use orchestrator_core::rate_limiter::RateLimiter;
//! use orchestrator_core::runner;
//!
//! # async fn run() -> Result<(), RunnerError> {
//! let provider = providers::create_provider(
//!     ProviderConfig::new("local", "ollama").with_base_url("http://localhost:11434"),
//! )?;
//! let request = ProviderRequest::builder("llama3").with_prompt("hello").build().unwrap();
//! let config = RunnerConfig::new(Mode::Sequential);
//!
//! let response = runner::run(
//!     &request,
//!     &[Arc::from(provider)],
//!     None,
//!     &config,
//!     Arc::new(RateLimiter::new(config.rpm)),
//!     Arc::new(MetricsSink::disabled()),
//!     None,
//!     "run-1",
//! )
//! .await?;
//! println!("{}", response.text);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod executor;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod rate_limiter;
pub mod redact;
pub mod runner;

pub use error::{FailureKind, RunnerError};
pub use models::{
    Candidate, CandidateResult, ConsensusConfig, ConsensusStrategy, Message, Mode, OptionValue,
    ProviderRequest, ProviderResponse, Role, RunnerConfig, TieBreaker, TokenUsage,
};
pub use providers::{create_provider, Provider, ProviderConfig};
pub use runner::{run, Judge};

/// Convenience alias for this crate's single error type.
pub type Result<T> = std::result::Result<T, RunnerError>;
