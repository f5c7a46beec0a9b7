//! # Request/Response Data Model
//!
//! Immutable inputs, structured outputs, and token accounting for a single
//! logical inference request. These types are created fresh per call and
//! discarded once the orchestrator returns — no state survives across
//! requests except what [`crate::rate_limiter::RateLimiter`] and
//! [`crate::metrics::MetricsSink`] hold internally.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in an ordered conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// An opaque, provider-specific value. The core never inspects these past
/// passing them through; only providers interpret keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    String(String),
    Number(f64),
    Bool(bool),
    Map(HashMap<String, OptionValue>),
}

/// Immutable description of a single logical inference request.
///
/// Invariant: `model` is non-empty, and at least one of `prompt` or
/// `messages` must be set. There is no setter API post-construction —
/// build one with [`ProviderRequest::builder`] and treat the result as final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    pub prompt: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop: Vec<String>,
    pub timeout_s: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, OptionValue>,
    #[serde(default)]
    pub options: HashMap<String, OptionValue>,
}

fn default_max_tokens() -> u32 {
    256
}

impl ProviderRequest {
    pub fn builder(model: impl Into<String>) -> ProviderRequestBuilder {
        ProviderRequestBuilder::new(model)
    }

    /// The per-attempt timeout, defaulting to 30s when unset.
    pub fn timeout(&self) -> Duration {
        match self.timeout_s {
            Some(s) if s > 0.0 => Duration::from_secs_f64(s),
            _ => Duration::from_secs(30),
        }
    }
}

/// Builder producing an immutable [`ProviderRequest`].
#[derive(Debug, Clone)]
pub struct ProviderRequestBuilder {
    model: String,
    prompt: Option<String>,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: Option<f32>,
    top_p: Option<f32>,
    stop: Vec<String>,
    timeout_s: Option<f64>,
    metadata: HashMap<String, OptionValue>,
    options: HashMap<String, OptionValue>,
}

impl ProviderRequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: None,
            messages: Vec::new(),
            max_tokens: default_max_tokens(),
            temperature: None,
            top_p: None,
            stop: Vec::new(),
            timeout_s: None,
            metadata: HashMap::new(),
            options: HashMap::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_timeout_s(mut self, timeout_s: f64) -> Self {
        self.timeout_s = Some(timeout_s);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: OptionValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Fails if neither `prompt` nor `messages` was set, or `model` is empty.
    pub fn build(self) -> Result<ProviderRequest, String> {
        if self.model.is_empty() {
            return Err("model must not be empty".to_string());
        }
        if self.prompt.is_none() && self.messages.is_empty() {
            return Err("at least one of prompt or messages must be set".to_string());
        }
        Ok(ProviderRequest {
            model: self.model,
            prompt: self.prompt,
            messages: self.messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stop: self.stop,
            timeout_s: self.timeout_s,
            metadata: self.metadata,
            options: self.options,
        })
    }
}

/// Prompt/completion token accounting. `total` is always derived, never
/// stored independently, so it can never drift from its parts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// The result of one successful provider attempt. A `ProviderResponse` is
/// only ever produced on success — failures are always signalled through
/// [`crate::error::RunnerError`], never through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub text: String,
    /// Measured by the attempt executor, not reported by the provider.
    pub latency_ms: u64,
    pub token_usage: Option<TokenUsage>,
    /// The model the provider actually used, if it differs from the request.
    pub model: Option<String>,
    pub finish_reason: Option<String>,
    /// Opaque provider-native payload, kept only for debugging; never
    /// required by any core operation.
    pub raw: Option<serde_json::Value>,
}

/// Execution mode selecting which runner handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Sequential,
    ParallelAny,
    ParallelAll,
    Consensus,
}

/// Tunables for the sequential runner's recovery behaviour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub rate_limit_sleep_s: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit_sleep_s: 0.05,
        }
    }
}

/// Consensus voting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStrategy {
    MajorityVote,
    MaxScore,
    WeightedVote,
}

/// Deterministic rule breaking ties between candidates of equal rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaker {
    MinLatency,
    MinCost,
    StableOrder,
}

/// Configuration for the consensus aggregator. Required iff `mode = consensus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub strategy: ConsensusStrategy,
    #[serde(default = "default_quorum")]
    pub quorum: u32,
    #[serde(default = "default_tie_breakers")]
    pub tie_breaker: Vec<TieBreaker>,
    /// JSON schema for structured outputs; when set, candidates are compared
    /// by deep field equality rather than normalised text.
    pub schema: Option<serde_json::Value>,
    #[serde(default)]
    pub provider_weights: HashMap<String, f64>,
    pub max_latency_ms: Option<u64>,
    pub max_cost_usd: Option<f64>,
}

fn default_quorum() -> u32 {
    2
}

fn default_tie_breakers() -> Vec<TieBreaker> {
    vec![
        TieBreaker::MinLatency,
        TieBreaker::MinCost,
        TieBreaker::StableOrder,
    ]
}

impl ConsensusConfig {
    pub fn new(strategy: ConsensusStrategy) -> Self {
        Self {
            strategy,
            quorum: default_quorum(),
            tie_breaker: default_tie_breakers(),
            schema: None,
            provider_weights: HashMap::new(),
            max_latency_ms: None,
            max_cost_usd: None,
        }
    }

    pub fn with_quorum(mut self, quorum: u32) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn with_tie_breaker(mut self, tie_breaker: Vec<TieBreaker>) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    pub fn with_weight(mut self, provider: impl Into<String>, weight: f64) -> Self {
        self.provider_weights.insert(provider.into(), weight);
        self
    }

    pub fn with_max_latency_ms(mut self, max_latency_ms: u64) -> Self {
        self.max_latency_ms = Some(max_latency_ms);
        self
    }

    pub fn with_max_cost_usd(mut self, max_cost_usd: f64) -> Self {
        self.max_cost_usd = Some(max_cost_usd);
        self
    }
}

/// Top-level configuration for one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub mode: Mode,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Requests per minute; 0 disables the global rate limiter.
    #[serde(default)]
    pub rpm: u32,
    #[serde(default)]
    pub backoff_policy: BackoffPolicy,
    pub shadow_provider: Option<String>,
    pub metrics_path: Option<std::path::PathBuf>,
    pub consensus_config: Option<ConsensusConfig>,
}

fn default_max_concurrency() -> usize {
    4
}

impl RunnerConfig {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            max_concurrency: default_max_concurrency(),
            rpm: 0,
            backoff_policy: BackoffPolicy::default(),
            shadow_provider: None,
            metrics_path: None,
            consensus_config: None,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_rpm(mut self, rpm: u32) -> Self {
        self.rpm = rpm;
        self
    }

    pub fn with_shadow_provider(mut self, provider: impl Into<String>) -> Self {
        self.shadow_provider = Some(provider.into());
        self
    }

    pub fn with_metrics_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    pub fn with_consensus_config(mut self, config: ConsensusConfig) -> Self {
        self.consensus_config = Some(config);
        self
    }

    /// Validates the invariant that `consensus_config` is present iff
    /// `mode == Mode::Consensus`.
    pub fn validate(&self) -> Result<(), String> {
        match (self.mode, &self.consensus_config) {
            (Mode::Consensus, None) => {
                Err("consensus_config is required when mode = consensus".to_string())
            }
            (m, Some(_)) if m != Mode::Consensus => Err(
                "consensus_config must only be set when mode = consensus".to_string(),
            ),
            _ => Ok(()),
        }
    }
}

/// One attempt's outcome in a `parallel_all` run; the unit the consensus
/// aggregator consumes. Produced once per attempt, consumed once, never
/// persisted past a single `run()` call.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider_id: String,
    /// Position in the originally-supplied provider slice; used for
    /// `stable_order` tie-breaking and to tolerate duplicate provider names.
    pub index: usize,
    pub result: CandidateResult,
    pub latency_ms: u64,
    pub cost_estimate: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum CandidateResult {
    Success(ProviderResponse),
    Failure {
        kind: crate::error::FailureKind,
        message: String,
    },
}

impl Candidate {
    pub fn is_success(&self) -> bool {
        matches!(self.result, CandidateResult::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_prompt_or_messages() {
        let err = ProviderRequest::builder("gpt-4o-mini").build().unwrap_err();
        assert!(err.contains("prompt or messages"));
    }

    #[test]
    fn builder_requires_nonempty_model() {
        let err = ProviderRequest::builder("")
            .with_prompt("hi")
            .build()
            .unwrap_err();
        assert!(err.contains("model"));
    }

    #[test]
    fn builder_defaults_max_tokens() {
        let req = ProviderRequest::builder("gpt-4o-mini")
            .with_prompt("hi")
            .build()
            .unwrap();
        assert_eq!(req.max_tokens, 256);
    }

    #[test]
    fn token_usage_total_is_derived() {
        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
        };
        assert_eq!(usage.total(), 15);
    }

    #[test]
    fn runner_config_validates_consensus_requirement() {
        let cfg = RunnerConfig::new(Mode::Consensus);
        assert!(cfg.validate().is_err());

        let cfg = cfg.with_consensus_config(ConsensusConfig::new(ConsensusStrategy::MajorityVote));
        assert!(cfg.validate().is_ok());

        let cfg = RunnerConfig::new(Mode::Sequential)
            .with_consensus_config(ConsensusConfig::new(ConsensusStrategy::MajorityVote));
        assert!(cfg.validate().is_err());
    }
}
