//! # Metrics Sink
//!
//! Append-only JSONL writer, schema version 1. Every line is one
//! newline-terminated JSON object. Writes are serialised under a single
//! mutex so interleaved concurrent events never corrupt a line; transient
//! write errors are retried up to 3 times, 10ms apart, and — per §4.3 —
//! emission failure must never fail the caller's request, so every public
//! method here swallows its own errors after logging a `warn!`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::FailureKind;
use crate::models::TokenUsage;
use crate::redact::redact;

const SCHEMA_VERSION: u32 = 1;
const WRITE_RETRIES: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(10);

/// One append-only record. Carries the common envelope fields plus a
/// discriminated payload matching the `event` column of `SPEC_FULL.md` §6.
#[derive(Debug, Clone, Serialize)]
pub struct MetricEvent {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub run_id: String,
    pub schema_version: u32,
    #[serde(flatten)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventPayload {
    ProviderCall {
        provider: String,
        model: String,
        latency_ms: u64,
        status: CallStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure_kind: Option<FailureKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        token_usage: Option<TokenUsage>,
        attempt_index: usize,
    },
    ProviderSuccess {
        provider: String,
        model: String,
        latency_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        token_usage: Option<TokenUsage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cost_estimate: Option<f64>,
    },
    ProviderSkipped {
        provider: String,
        reason: String,
    },
    ProviderChainFailed {
        providers: Vec<String>,
        failures: Vec<FailureEntry>,
    },
    ParallelFirstSuccess {
        winner_provider: String,
        winner_latency_ms: u64,
        cancelled_providers: Vec<String>,
    },
    ConsensusVote {
        strategy: String,
        quorum: u32,
        votes_for: u32,
        votes_against: u32,
        abstained: u32,
        winner_provider: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner_score: Option<f64>,
        tie_breaker: String,
        tie_break_applied: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        tie_break_reason: Option<String>,
        candidate_summaries: Vec<Value>,
    },
    ShadowDiff {
        request_fingerprint: String,
        primary_provider: String,
        primary_latency_ms: u64,
        shadow_provider: String,
        shadow_ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        shadow_latency_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        latency_gap_ms: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        shadow_error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        shadow_consensus_delta: Option<Value>,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    pub provider: String,
    pub failure_kind: FailureKind,
    pub message: String,
}

/// Append-only JSONL sink. `None` (no `metrics_path` configured) makes every
/// method a silent no-op, matching "disabled mode drops events" in §4.3.
pub struct MetricsSink {
    file: Option<Mutex<std::fs::File>>,
}

impl MetricsSink {
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn open(path: &PathBuf) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Some(Mutex::new(file)),
        })
    }

    pub fn from_config(path: Option<&PathBuf>) -> Self {
        match path {
            None => Self::disabled(),
            Some(p) => Self::open(p).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %p.display(), "failed to open metrics sink, dropping all events");
                Self::disabled()
            }),
        }
    }

    pub fn emit(&self, run_id: &str, mut payload: EventPayload) {
        redact_payload(&mut payload);
        let event = MetricEvent {
            ts: chrono::Utc::now(),
            run_id: run_id.to_string(),
            schema_version: SCHEMA_VERSION,
            payload,
        };
        self.write_line(&event);
    }

    fn write_line(&self, event: &MetricEvent) {
        let Some(file) = &self.file else { return };
        let mut line = match serde_json::to_vec(event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize metric event, dropping");
                return;
            }
        };
        line.push(b'\n');

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = file.lock().unwrap().write_all(&line);
            match result {
                Ok(()) => return,
                Err(e) if attempt >= WRITE_RETRIES => {
                    tracing::warn!(error = %e, attempt, "metrics write failed, giving up for this event");
                    return;
                }
                Err(e) => {
                    tracing::debug!(error = %e, attempt, "metrics write failed, retrying");
                    std::thread::sleep(WRITE_RETRY_DELAY);
                }
            }
        }
    }
}

fn redact_payload(payload: &mut EventPayload) {
    match payload {
        EventPayload::ProviderCall { error_message, .. } => {
            if let Some(m) = error_message {
                *m = redact(m);
            }
        }
        EventPayload::ProviderChainFailed { failures, .. } => {
            for f in failures {
                f.message = redact(&f.message);
            }
        }
        EventPayload::ShadowDiff { shadow_error, .. } => {
            if let Some(m) = shadow_error {
                *m = redact(m);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn disabled_sink_drops_silently() {
        let sink = MetricsSink::disabled();
        sink.emit(
            "run-1",
            EventPayload::ProviderSkipped {
                provider: "a".to_string(),
                reason: "disabled".to_string(),
            },
        );
        // no panic, nothing to assert — the point is it never touches disk
    }

    #[test]
    fn writes_one_jsonl_line_per_event() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("orchestrator-metrics-test-{}.jsonl", std::process::id()));
        let sink = MetricsSink::open(&path).unwrap();

        sink.emit(
            "run-1",
            EventPayload::ProviderSuccess {
                provider: "a".to_string(),
                model: "m".to_string(),
                latency_ms: 10,
                token_usage: None,
                cost_estimate: None,
            },
        );
        sink.emit(
            "run-1",
            EventPayload::ProviderSkipped {
                provider: "b".to_string(),
                reason: "offline".to_string(),
            },
        );
        drop(sink);

        let mut contents = String::new();
        std::fs::File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let v: Value = serde_json::from_str(line).unwrap();
            assert_eq!(v["schema_version"], 1);
            assert_eq!(v["run_id"], "run-1");
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn redacts_error_message_before_persisting() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("orchestrator-metrics-redact-{}.jsonl", std::process::id()));
        let sink = MetricsSink::open(&path).unwrap();

        sink.emit(
            "run-1",
            EventPayload::ProviderCall {
                provider: "a".to_string(),
                model: "m".to_string(),
                latency_ms: 5,
                status: CallStatus::Error,
                failure_kind: Some(FailureKind::Auth),
                error_message: Some("Authorization: Bearer sk-abcdef1234567890".to_string()),
                token_usage: None,
                attempt_index: 0,
            },
        );
        drop(sink);

        let mut contents = String::new();
        std::fs::File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(!contents.contains("sk-abcdef1234567890"));
        let _ = std::fs::remove_file(&path);
    }
}
