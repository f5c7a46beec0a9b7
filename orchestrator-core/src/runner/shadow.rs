//! # Shadow Runner (C10)
//!
//! Fires a secondary "shadow" provider alongside the primary call, purely
//! for comparison telemetry. The primary's result is always what the
//! caller gets back — shadow failures, timeouts, and even panics never
//! touch it. The shadow task is spawned so it can keep running past the
//! point where `run_shadowed` has already returned to its caller.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::error::{FailureKind, RunnerError};
use crate::executor::execute_attempt;
use crate::metrics::{EventPayload, MetricsSink};
use crate::models::{Candidate, CandidateResult, ConsensusConfig, ProviderRequest, ProviderResponse};
use crate::providers::Provider;
use crate::rate_limiter::RateLimiter;
use crate::runner::consensus::{self, Judge};

/// The candidate set and strategy a consensus primary ran with, captured so
/// the shadow task can recompute the vote with the shadow's answer folded
/// in. Built by `runner::run`'s `Mode::Consensus` arm; `None` for every
/// other mode, since there is no vote to have swung.
pub struct ConsensusSnapshot {
    pub candidates: Vec<Candidate>,
    pub consensus_config: ConsensusConfig,
}

/// Stable hash over model + normalised prompt/messages + deterministic
/// options, used to correlate a `shadow_diff` event back to its request
/// without persisting the request body itself.
pub fn request_fingerprint(request: &ProviderRequest) -> String {
    let mut hasher = DefaultHasher::new();
    request.model.hash(&mut hasher);
    request.prompt.as_deref().unwrap_or("").hash(&mut hasher);
    for message in &request.messages {
        format!("{:?}", message.role).hash(&mut hasher);
        message.content.hash(&mut hasher);
    }
    request.max_tokens.hash(&mut hasher);
    format!("{:?}/{:?}", request.temperature, request.top_p).hash(&mut hasher);
    format!("{:0x}", hasher.finish())
}

/// Runs `primary` to completion, firing `shadow` concurrently but never
/// waiting on it beyond best-effort. Returns exactly what invoking
/// `primary` alone would have returned. When the primary was a consensus
/// run, `primary_call` also hands back the [`ConsensusSnapshot`] it voted
/// over, so the detached `shadow_diff` task can recompute the vote with the
/// shadow folded in as one more candidate.
pub async fn run_shadowed<F, Fut>(
    primary_call: F,
    primary_provider_name: String,
    shadow: Arc<dyn Provider>,
    request: ProviderRequest,
    deadline: Instant,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsSink>,
    judge: Option<Arc<dyn Judge>>,
    run_id: String,
) -> Result<ProviderResponse, RunnerError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(ProviderResponse, Option<ConsensusSnapshot>), RunnerError>>,
{
    let fingerprint = request_fingerprint(&request);
    let shadow_request = request.clone();
    let shadow_run_id = run_id.clone();
    let shadow_metrics = metrics.clone();
    let shadow_rate_limiter = rate_limiter.clone();
    let shadow_name = shadow.name().to_string();

    let shadow_handle = tokio::spawn(async move {
        execute_attempt(
            shadow.as_ref(),
            &shadow_request,
            deadline,
            &shadow_rate_limiter,
            &shadow_metrics,
            &shadow_run_id,
            0,
        )
        .await
    });

    let primary_started = Instant::now();
    let primary_outcome = primary_call().await;
    let primary_latency_ms = primary_started.elapsed().as_millis() as u64;

    let (primary_result, consensus_snapshot) = match primary_outcome {
        Ok((response, snapshot)) => (Ok(response), snapshot),
        Err(err) => (Err(err), None),
    };
    let primary_response_for_delta = primary_result.as_ref().ok().cloned();

    tokio::spawn(async move {
        let shadow_outcome = shadow_handle.await;
        let (shadow_ok, shadow_latency_ms, shadow_error, shadow_candidate_result) = match shadow_outcome {
            Ok(Ok(response)) => (
                true,
                Some(response.latency_ms),
                None,
                CandidateResult::Success(response),
            ),
            Ok(Err(err)) => (
                false,
                None,
                Some(err.to_string()),
                CandidateResult::Failure {
                    kind: err.kind(),
                    message: err.to_string(),
                },
            ),
            Err(_) => (
                false,
                None,
                Some("shadow task did not complete".to_string()),
                CandidateResult::Failure {
                    kind: FailureKind::Retriable,
                    message: "shadow task panicked or was cancelled".to_string(),
                },
            ),
        };

        let latency_gap_ms = shadow_latency_ms.map(|s| s as i64 - primary_latency_ms as i64);

        let shadow_consensus_delta = match (consensus_snapshot, primary_response_for_delta) {
            (Some(snapshot), Some(primary_response)) => Some(consensus_delta(
                snapshot,
                &shadow_name,
                shadow_candidate_result,
                shadow_latency_ms.unwrap_or(0),
                judge.as_deref(),
                &primary_response,
            )),
            _ => None,
        };

        metrics.emit(
            &run_id,
            EventPayload::ShadowDiff {
                request_fingerprint: fingerprint,
                primary_provider: primary_provider_name,
                primary_latency_ms,
                shadow_provider: shadow_name,
                shadow_ok,
                shadow_latency_ms,
                latency_gap_ms,
                shadow_error,
                shadow_consensus_delta,
            },
        );
    });

    primary_result
}

/// Re-runs the consensus vote with the shadow's answer appended as one more
/// candidate and compares it against the vote the primary actually produced.
/// Uses `aggregate_outcome` directly (not `aggregate`) so neither run emits
/// its own `consensus_vote` event — only the single `shadow_diff` event
/// carries this comparison.
fn consensus_delta(
    snapshot: ConsensusSnapshot,
    shadow_provider: &str,
    shadow_candidate_result: CandidateResult,
    shadow_latency_ms: u64,
    judge: Option<&dyn Judge>,
    primary_response: &ProviderResponse,
) -> Value {
    let without_shadow = consensus::aggregate_outcome(snapshot.candidates.clone(), &snapshot.consensus_config, judge);

    let shadow_index = snapshot.candidates.len();
    let mut with_shadow_candidates = snapshot.candidates;
    with_shadow_candidates.push(Candidate {
        provider_id: shadow_provider.to_string(),
        index: shadow_index,
        result: shadow_candidate_result,
        latency_ms: shadow_latency_ms,
        cost_estimate: None,
    });
    let with_shadow = consensus::aggregate_outcome(with_shadow_candidates, &snapshot.consensus_config, judge);

    match (without_shadow, with_shadow) {
        (Ok(without), Ok(with)) => serde_json::json!({
            "votes_for_without_shadow": without.votes_for,
            "votes_for_with_shadow": with.votes_for,
            "winner_without_shadow": primary_response.text,
            "winner_with_shadow": with.response.text,
            "would_change_winner": with.response.text != primary_response.text,
            "tie_break_applied_with_shadow": with.tie_break_applied,
        }),
        (_, Ok(with)) => serde_json::json!({
            "winner_without_shadow": primary_response.text,
            "winner_with_shadow": with.response.text,
            "would_change_winner": with.response.text != primary_response.text,
            "tie_break_applied_with_shadow": with.tie_break_applied,
        }),
        (_, Err(err)) => serde_json::json!({
            "winner_without_shadow": primary_response.text,
            "would_change_winner": false,
            "forecast_error": err.to_string(),
        }),
    }
}
