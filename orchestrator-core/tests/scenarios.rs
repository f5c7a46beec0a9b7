//! End-to-end scenarios (S1-S6) driven entirely through the public
//! `runner::run` entry point, using `MockProvider` so they run without any
//! network access. Each scenario mirrors one of the runner-level unit tests
//! scattered across `src/runner/*.rs`, but exercises the full dispatch path
//! (`RunnerConfig` -> `run` -> the matching runner) instead of calling a
//! single runner function directly.

use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::error::FailureKind;
use orchestrator_core::metrics::MetricsSink;
use orchestrator_core::models::{ConsensusConfig, ConsensusStrategy, Mode, RunnerConfig, TieBreaker};
use orchestrator_core::providers::mock::{Behavior, MockProvider};
use orchestrator_core::providers::Provider;
use orchestrator_core::rate_limiter::RateLimiter;
use orchestrator_core::runner;
use orchestrator_core::{ProviderRequest, RunnerError};

fn provider(name: &str, behavior: Behavior) -> Arc<dyn Provider> {
    Arc::new(MockProvider::with_behavior(name, behavior))
}

fn request() -> ProviderRequest {
    ProviderRequest::builder("mock-model").with_prompt("hello").build().unwrap()
}

fn collaborators() -> (Arc<RateLimiter>, Arc<MetricsSink>) {
    (Arc::new(RateLimiter::new(0)), Arc::new(MetricsSink::disabled()))
}

#[tokio::test]
async fn s1_sequential_fails_over_past_a_rate_limited_provider() {
    let providers = vec![
        provider(
            "flaky",
            Behavior::Fail {
                kind: FailureKind::RateLimit,
                message: "429".to_string(),
            },
        ),
        provider(
            "stable",
            Behavior::Succeed {
                text: "from-stable".to_string(),
                latency_ms: 0,
            },
        ),
    ];
    let config = RunnerConfig::new(Mode::Sequential);
    let (rate_limiter, metrics) = collaborators();

    let response = runner::run(&request(), &providers, None, &config, rate_limiter, metrics, None, "s1")
        .await
        .unwrap();

    assert_eq!(response.text, "from-stable");
}

#[tokio::test]
async fn s2_parallel_any_returns_the_fastest_success() {
    let providers = vec![
        provider(
            "fast",
            Behavior::Succeed {
                text: "fast".to_string(),
                latency_ms: 5,
            },
        ),
        provider(
            "slow",
            Behavior::Succeed {
                text: "slow".to_string(),
                latency_ms: 250,
            },
        ),
    ];
    let config = RunnerConfig::new(Mode::ParallelAny).with_max_concurrency(2);
    let (rate_limiter, metrics) = collaborators();

    let started = std::time::Instant::now();
    let response = runner::run(&request(), &providers, None, &config, rate_limiter, metrics, None, "s2")
        .await
        .unwrap();

    assert_eq!(response.text, "fast");
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[tokio::test]
async fn s3_consensus_majority_vote_picks_the_agreeing_pair() {
    let providers = vec![
        provider(
            "a",
            Behavior::Succeed {
                text: "Paris".to_string(),
                latency_ms: 10,
            },
        ),
        provider(
            "b",
            Behavior::Succeed {
                text: "paris".to_string(),
                latency_ms: 20,
            },
        ),
        provider(
            "c",
            Behavior::Succeed {
                text: "London".to_string(),
                latency_ms: 5,
            },
        ),
    ];
    let consensus = ConsensusConfig::new(ConsensusStrategy::MajorityVote).with_quorum(2);
    let config = RunnerConfig::new(Mode::Consensus)
        .with_max_concurrency(3)
        .with_consensus_config(consensus);
    let (rate_limiter, metrics) = collaborators();

    let response = runner::run(&request(), &providers, None, &config, rate_limiter, metrics, None, "s3")
        .await
        .unwrap();

    assert_eq!(response.text.to_lowercase(), "paris");
}

#[tokio::test]
async fn s4_consensus_falls_back_to_tie_break_without_quorum() {
    let providers = vec![
        provider(
            "a",
            Behavior::Succeed {
                text: "x".to_string(),
                latency_ms: 50,
            },
        ),
        provider(
            "b",
            Behavior::Succeed {
                text: "y".to_string(),
                latency_ms: 5,
            },
        ),
    ];
    let consensus = ConsensusConfig::new(ConsensusStrategy::MajorityVote)
        .with_quorum(2)
        .with_tie_breaker(vec![TieBreaker::MinLatency, TieBreaker::StableOrder]);
    let config = RunnerConfig::new(Mode::Consensus)
        .with_max_concurrency(2)
        .with_consensus_config(consensus);
    let (rate_limiter, metrics) = collaborators();

    let response = runner::run(&request(), &providers, None, &config, rate_limiter, metrics, None, "s4")
        .await
        .unwrap();

    // no majority forms (1 vote each); min_latency picks provider "b".
    assert_eq!(response.text, "y");
}

#[tokio::test]
async fn s5_shadow_provider_never_affects_the_returned_response() {
    let providers = vec![provider(
        "primary",
        Behavior::Succeed {
            text: "primary-answer".to_string(),
            latency_ms: 0,
        },
    )];
    let shadow = provider(
        "shadow",
        Behavior::Fail {
            kind: FailureKind::Timeout,
            message: "shadow timed out".to_string(),
        },
    );
    let config = RunnerConfig::new(Mode::Sequential).with_shadow_provider("shadow");
    let (rate_limiter, metrics) = collaborators();

    let response = runner::run(
        &request(),
        &providers,
        Some(shadow),
        &config,
        rate_limiter,
        metrics,
        None,
        "s5",
    )
    .await
    .unwrap();

    assert_eq!(response.text, "primary-answer");
}

#[tokio::test]
async fn s6_sequential_all_providers_failing_raises_all_failed_error() {
    let providers = vec![
        provider(
            "a",
            Behavior::Fail {
                kind: FailureKind::Auth,
                message: "no key".to_string(),
            },
        ),
        provider(
            "b",
            Behavior::Fail {
                kind: FailureKind::Retriable,
                message: "5xx".to_string(),
            },
        ),
    ];
    let config = RunnerConfig::new(Mode::Sequential);
    let (rate_limiter, metrics) = collaborators();

    let err = runner::run(&request(), &providers, None, &config, rate_limiter, metrics, None, "s6")
        .await
        .unwrap_err();

    match err {
        RunnerError::AllFailedError { failures } => {
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().any(|f| f.kind == FailureKind::Auth));
            assert!(failures.iter().any(|f| f.kind == FailureKind::Retriable));
        }
        other => panic!("expected AllFailedError, got {other:?}"),
    }
}

#[tokio::test]
async fn parallel_all_without_consensus_config_returns_first_stable_success() {
    let providers = vec![
        provider(
            "a",
            Behavior::Fail {
                kind: FailureKind::Config,
                message: "bad".to_string(),
            },
        ),
        provider(
            "b",
            Behavior::Succeed {
                text: "from-b".to_string(),
                latency_ms: 0,
            },
        ),
    ];
    let config = RunnerConfig::new(Mode::ParallelAll).with_max_concurrency(2);
    let (rate_limiter, metrics) = collaborators();

    let response = runner::run(&request(), &providers, None, &config, rate_limiter, metrics, None, "parallel-all")
        .await
        .unwrap();

    assert_eq!(response.text, "from-b");
}
