//! # Sequential Runner (C7)
//!
//! Tries providers strictly in declared order, never revisiting a failed
//! provider within one request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ProviderFailure, RunnerError};
use crate::executor::execute_attempt;
use crate::metrics::{EventPayload, MetricsSink};
use crate::models::{BackoffPolicy, ProviderRequest, ProviderResponse};
use crate::providers::Provider;
use crate::rate_limiter::RateLimiter;

pub async fn run_sequential(
    providers: &[Arc<dyn Provider>],
    request: &ProviderRequest,
    deadline: Instant,
    rate_limiter: &RateLimiter,
    metrics: &MetricsSink,
    run_id: &str,
    backoff: &BackoffPolicy,
) -> Result<ProviderResponse, RunnerError> {
    let mut failures = Vec::new();

    for (attempt_index, provider) in providers.iter().enumerate() {
        if Instant::now() >= deadline {
            break;
        }

        let result = execute_attempt(
            provider.as_ref(),
            request,
            deadline,
            rate_limiter,
            metrics,
            run_id,
            attempt_index,
        )
        .await;

        match result {
            Ok(response) => {
                metrics.emit(
                    run_id,
                    EventPayload::ProviderSuccess {
                        provider: provider.name().to_string(),
                        model: response.model.clone().unwrap_or_else(|| request.model.clone()),
                        latency_ms: response.latency_ms,
                        token_usage: response.token_usage,
                        cost_estimate: None,
                    },
                );
                return Ok(response);
            }
            Err(err) => {
                if err.is_rate_limit() {
                    tokio::time::sleep(Duration::from_secs_f64(backoff.rate_limit_sleep_s)).await;
                }
                failures.push(ProviderFailure {
                    provider: provider.name().to_string(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }

    metrics.emit(
        run_id,
        EventPayload::ProviderChainFailed {
            providers: providers.iter().map(|p| p.name().to_string()).collect(),
            failures: failures
                .iter()
                .map(|f| crate::metrics::FailureEntry {
                    provider: f.provider.clone(),
                    failure_kind: f.kind,
                    message: f.message.clone(),
                })
                .collect(),
        },
    );

    Err(RunnerError::AllFailedError { failures })
}
