//! # Attempt Executor
//!
//! Executes exactly one provider invocation: acquires a rate-limit slot,
//! times the call, classifies any failure into a canonical [`RunnerError`],
//! and emits the `provider_call` metric event — success or error — before
//! returning control to whichever runner is driving it.

use std::time::Instant;

use crate::error::RunnerError;
use crate::metrics::{CallStatus, EventPayload, MetricsSink};
use crate::models::{ProviderRequest, ProviderResponse};
use crate::providers::Provider;
use crate::rate_limiter::RateLimiter;

/// Runs one attempt against `provider` and returns its outcome, having
/// already emitted the corresponding `provider_call` event.
pub async fn execute_attempt(
    provider: &dyn Provider,
    request: &ProviderRequest,
    deadline: Instant,
    rate_limiter: &RateLimiter,
    metrics: &MetricsSink,
    run_id: &str,
    attempt_index: usize,
) -> Result<ProviderResponse, RunnerError> {
    rate_limiter.acquire().await;

    let started = Instant::now();
    let budget = deadline.saturating_duration_since(started);
    let outcome = match tokio::time::timeout(budget, provider.invoke(request, deadline)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(RunnerError::TimeoutError {
            elapsed_ms: started.elapsed().as_millis() as u64,
        }),
    };
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(response) => {
            metrics.emit(
                run_id,
                EventPayload::ProviderCall {
                    provider: provider.name().to_string(),
                    model: request.model.clone(),
                    latency_ms,
                    status: CallStatus::Success,
                    failure_kind: None,
                    error_message: None,
                    token_usage: response.token_usage,
                    attempt_index,
                },
            );
            Ok(ProviderResponse {
                latency_ms,
                ..response
            })
        }
        Err(err) => {
            metrics.emit(
                run_id,
                EventPayload::ProviderCall {
                    provider: provider.name().to_string(),
                    model: request.model.clone(),
                    latency_ms,
                    status: CallStatus::Error,
                    failure_kind: Some(err.kind()),
                    error_message: Some(err.to_string()),
                    token_usage: None,
                    attempt_index,
                },
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{Behavior, MockProvider};
    use std::time::Duration;

    #[tokio::test]
    async fn success_reports_executor_measured_latency() {
        let provider = MockProvider::with_behavior(
            "A",
            Behavior::Succeed {
                text: "hi".to_string(),
                latency_ms: 5,
            },
        );
        let limiter = RateLimiter::new(0);
        let metrics = MetricsSink::disabled();
        let req = ProviderRequest::builder("m").with_prompt("p").build().unwrap();

        let resp = execute_attempt(
            &provider,
            &req,
            Instant::now() + Duration::from_secs(1),
            &limiter,
            &metrics,
            "run-1",
            0,
        )
        .await
        .unwrap();

        assert_eq!(resp.text, "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn provider_that_ignores_deadline_is_cut_off_by_the_executor() {
        let provider = MockProvider::with_behavior("A", Behavior::HangPast { sleep_ms: 10_000 });
        let limiter = RateLimiter::new(0);
        let metrics = MetricsSink::disabled();
        let req = ProviderRequest::builder("m").with_prompt("p").build().unwrap();

        let err = execute_attempt(
            &provider,
            &req,
            Instant::now() + Duration::from_millis(50),
            &limiter,
            &metrics,
            "run-1",
            0,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunnerError::TimeoutError { .. }));
    }

    #[tokio::test]
    async fn error_is_propagated() {
        let provider = MockProvider::with_behavior(
            "A",
            Behavior::Fail {
                kind: crate::error::FailureKind::Auth,
                message: "bad key".to_string(),
            },
        );
        let limiter = RateLimiter::new(0);
        let metrics = MetricsSink::disabled();
        let req = ProviderRequest::builder("m").with_prompt("p").build().unwrap();

        let err = execute_attempt(
            &provider,
            &req,
            Instant::now() + Duration::from_secs(1),
            &limiter,
            &metrics,
            "run-1",
            0,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunnerError::AuthError { .. }));
    }
}
