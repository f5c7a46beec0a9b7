//! Benchmarks the consensus aggregator and the rate limiter's hot path —
//! the two pieces of the runner that run synchronously under a lock (or a
//! vote count) on every request, as opposed to the I/O-bound provider calls.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use orchestrator_core::models::{
    Candidate, CandidateResult, ConsensusConfig, ConsensusStrategy, ProviderResponse,
};
use orchestrator_core::rate_limiter::RateLimiter;

fn response(text: &str) -> ProviderResponse {
    ProviderResponse {
        text: text.to_string(),
        latency_ms: 0,
        token_usage: None,
        model: None,
        finish_reason: None,
        raw: None,
    }
}

fn candidates(n: usize) -> Vec<Candidate> {
    (0..n)
        .map(|i| Candidate {
            provider_id: format!("provider-{i}"),
            index: i,
            latency_ms: (i as u64) * 7,
            cost_estimate: Some(0.0001 * i as f64),
            result: CandidateResult::Success(response(if i % 3 == 0 { "yes" } else { "no" })),
        })
        .collect()
}

fn bench_majority_vote(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("consensus_majority_vote_8_candidates", |b| {
        b.to_async(&rt).iter_batched(
            || candidates(8),
            |candidates| async {
                let config = ConsensusConfig::new(ConsensusStrategy::MajorityVote).with_quorum(1);
                let metrics = orchestrator_core::metrics::MetricsSink::disabled();
                let result = orchestrator_core::runner::consensus::aggregate(
                    black_box(candidates),
                    &config,
                    None,
                    &metrics,
                    "bench-run",
                )
                .await;
                black_box(result).ok();
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_rate_limiter_acquire(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = RateLimiter::new(1_000_000);

    c.bench_function("rate_limiter_acquire_under_no_contention", |b| {
        b.to_async(&rt).iter(|| async {
            limiter.acquire().await;
        })
    });
}

criterion_group!(benches, bench_majority_vote, bench_rate_limiter_acquire);
criterion_main!(benches);
