//! # Parallel Runner (C8)
//!
//! Fans out across a worker pool pulling from a shared queue, capped at
//! `max_concurrency` in-flight attempts. `parallel_any` cancels every
//! loser the moment a winner is found (by aborting its `JoinHandle`, the
//! idiomatic Rust analogue of a cooperative cancellation signal — the
//! future is dropped at its next await point). `parallel_all` waits out
//! every attempt and hands the full [`Candidate`] list to the caller.
//!
//! Both entry points take `Arc`-wrapped collaborators because each worker
//! is an independently spawned `tokio` task and needs `'static` ownership.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::error::{ProviderFailure, RunnerError};
use crate::executor::execute_attempt;
use crate::metrics::{EventPayload, MetricsSink};
use crate::models::{Candidate, CandidateResult, ProviderRequest, ProviderResponse};
use crate::providers::Provider;
use crate::rate_limiter::RateLimiter;

struct Slot {
    index: usize,
    provider: Arc<dyn Provider>,
}

fn queue(providers: &[Arc<dyn Provider>]) -> VecDeque<Slot> {
    providers
        .iter()
        .enumerate()
        .map(|(index, provider)| Slot {
            index,
            provider: provider.clone(),
        })
        .collect()
}

/// Runs every provider concurrently (bounded by `max_concurrency`), returning
/// as soon as one succeeds. Still-pending and in-flight attempts are aborted.
pub async fn run_parallel_any(
    providers: &[Arc<dyn Provider>],
    request: &ProviderRequest,
    deadline: Instant,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsSink>,
    run_id: &str,
    max_concurrency: usize,
) -> Result<ProviderResponse, RunnerError> {
    let mut pending = queue(providers);
    let mut join_set: JoinSet<(usize, Result<ProviderResponse, RunnerError>)> = JoinSet::new();

    fn spawn_next(
        pending: &mut VecDeque<Slot>,
        join_set: &mut JoinSet<(usize, Result<ProviderResponse, RunnerError>)>,
        request: &ProviderRequest,
        deadline: Instant,
        rate_limiter: &Arc<RateLimiter>,
        metrics: &Arc<MetricsSink>,
        run_id: &str,
    ) {
        if let Some(slot) = pending.pop_front() {
            let request = request.clone();
            let rate_limiter = rate_limiter.clone();
            let metrics = metrics.clone();
            let run_id = run_id.to_string();
            join_set.spawn(async move {
                let result = execute_attempt(
                    slot.provider.as_ref(),
                    &request,
                    deadline,
                    &rate_limiter,
                    &metrics,
                    &run_id,
                    slot.index,
                )
                .await;
                (slot.index, result)
            });
        }
    }

    for _ in 0..max_concurrency.min(pending.len()) {
        spawn_next(
            &mut pending,
            &mut join_set,
            request,
            deadline,
            &rate_limiter,
            &metrics,
            run_id,
        );
    }

    let mut failures: Vec<(usize, ProviderFailure)> = Vec::new();
    let mut resolved = vec![false; providers.len()];

    while let Some(joined) = join_set.join_next().await {
        let (index, result) = match joined {
            Ok(pair) => pair,
            Err(_) => continue, // task aborted or panicked, not a candidate failure
        };
        resolved[index] = true;

        match result {
            Ok(response) => {
                let cancelled_providers: Vec<String> = providers
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index && !resolved[*i])
                    .map(|(_, p)| p.name().to_string())
                    .collect();
                join_set.abort_all();

                metrics.emit(
                    run_id,
                    EventPayload::ParallelFirstSuccess {
                        winner_provider: providers[index].name().to_string(),
                        winner_latency_ms: response.latency_ms,
                        cancelled_providers,
                    },
                );
                return Ok(response);
            }
            Err(err) => {
                failures.push((
                    index,
                    ProviderFailure {
                        provider: providers[index].name().to_string(),
                        kind: err.kind(),
                        message: err.to_string(),
                    },
                ));
                spawn_next(
                    &mut pending,
                    &mut join_set,
                    request,
                    deadline,
                    &rate_limiter,
                    &metrics,
                    run_id,
                );
            }
        }
    }

    failures.sort_by_key(|(index, _)| *index);
    Err(RunnerError::ParallelExecutionError {
        failures: failures.into_iter().map(|(_, f)| f).collect(),
    })
}

/// Runs every provider concurrently (bounded by `max_concurrency`), waiting
/// for all of them to terminate, and returns the full ordered candidate set.
pub async fn run_parallel_all(
    providers: &[Arc<dyn Provider>],
    request: &ProviderRequest,
    deadline: Instant,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsSink>,
    run_id: &str,
    max_concurrency: usize,
) -> Vec<Candidate> {
    let mut pending = queue(providers);
    let mut join_set: JoinSet<Candidate> = JoinSet::new();

    fn spawn_next(
        pending: &mut VecDeque<Slot>,
        join_set: &mut JoinSet<Candidate>,
        request: &ProviderRequest,
        deadline: Instant,
        rate_limiter: &Arc<RateLimiter>,
        metrics: &Arc<MetricsSink>,
        run_id: &str,
    ) {
        if let Some(slot) = pending.pop_front() {
            let request = request.clone();
            let rate_limiter = rate_limiter.clone();
            let metrics = metrics.clone();
            let run_id = run_id.to_string();
            let provider_id = slot.provider.name().to_string();
            join_set.spawn(async move {
                let started = Instant::now();
                let result = execute_attempt(
                    slot.provider.as_ref(),
                    &request,
                    deadline,
                    &rate_limiter,
                    &metrics,
                    &run_id,
                    slot.index,
                )
                .await;
                let latency_ms = started.elapsed().as_millis() as u64;
                match result {
                    Ok(response) => Candidate {
                        provider_id,
                        index: slot.index,
                        latency_ms: response.latency_ms,
                        cost_estimate: None,
                        result: CandidateResult::Success(response),
                    },
                    Err(err) => Candidate {
                        provider_id,
                        index: slot.index,
                        latency_ms,
                        cost_estimate: None,
                        result: CandidateResult::Failure {
                            kind: err.kind(),
                            message: err.to_string(),
                        },
                    },
                }
            });
        }
    }

    for _ in 0..max_concurrency.min(pending.len()) {
        spawn_next(
            &mut pending,
            &mut join_set,
            request,
            deadline,
            &rate_limiter,
            &metrics,
            run_id,
        );
    }

    let mut candidates = Vec::with_capacity(providers.len());
    while let Some(joined) = join_set.join_next().await {
        if let Ok(candidate) = joined {
            candidates.push(candidate);
            spawn_next(
                &mut pending,
                &mut join_set,
                request,
                deadline,
                &rate_limiter,
                &metrics,
                run_id,
            );
        }
    }

    candidates.sort_by_key(|c| c.index);
    candidates
}

/// Pass-through aggregator for plain `parallel_all` (no consensus config):
/// the first success in stable provider order wins.
pub fn first_success(candidates: Vec<Candidate>) -> Result<ProviderResponse, RunnerError> {
    let mut failures = Vec::new();
    for candidate in candidates {
        match candidate.result {
            CandidateResult::Success(response) => return Ok(response),
            CandidateResult::Failure { kind, message } => failures.push(ProviderFailure {
                provider: candidate.provider_id,
                kind,
                message,
            }),
        }
    }
    Err(RunnerError::ParallelExecutionError { failures })
}
