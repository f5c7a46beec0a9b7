//! # Consensus Aggregator (C9)
//!
//! Runs once `parallel_all` has collected every candidate. Six steps,
//! always executed in the same order so the winner is a pure function of
//! the candidate set: filter by constraints, normalise outputs, tally by
//! strategy, check quorum, tie-break, emit `consensus_vote`.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{ProviderFailure, RunnerError};
use crate::metrics::{EventPayload, MetricsSink};
use crate::models::{Candidate, CandidateResult, ConsensusConfig, ConsensusStrategy, ProviderResponse, TieBreaker};

/// Scores a successful candidate's text in `[0, 1]`. Built-in judges live in
/// the CLI crate (`--judge <name>` resolves to one); the core only needs the
/// trait object at the aggregation boundary.
pub trait Judge: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

struct Eligible<'a> {
    candidate: &'a Candidate,
    response: &'a ProviderResponse,
    normalized: String,
}

/// Everything [`aggregate`] computes before it emits `consensus_vote` —
/// split out so the shadow runner can re-run the vote with a hypothetical
/// extra candidate (see `shadow::consensus_delta`) without needing a live
/// `MetricsSink` or duplicating the six-step procedure.
pub(crate) struct AggregateOutcome {
    pub response: ProviderResponse,
    pub votes_for: u32,
    pub votes_against: u32,
    pub abstained: u32,
    pub winner_provider: String,
    pub winner_score: Option<f64>,
    pub tie_break_applied: bool,
    pub tie_break_used: Option<TieBreaker>,
    pub tie_break_reason: Option<&'static str>,
    pub candidate_summaries: Vec<Value>,
}

pub async fn aggregate(
    candidates: Vec<Candidate>,
    config: &ConsensusConfig,
    judge: Option<&dyn Judge>,
    metrics: &MetricsSink,
    run_id: &str,
) -> Result<ProviderResponse, RunnerError> {
    let outcome = aggregate_outcome(candidates, config, judge)?;

    metrics.emit(
        run_id,
        EventPayload::ConsensusVote {
            strategy: strategy_name(config.strategy).to_string(),
            quorum: config.quorum,
            votes_for: outcome.votes_for,
            votes_against: outcome.votes_against,
            abstained: outcome.abstained,
            winner_provider: outcome.winner_provider,
            winner_score: outcome.winner_score,
            tie_breaker: outcome.tie_break_used.map(tie_breaker_name).unwrap_or("none").to_string(),
            tie_break_applied: outcome.tie_break_applied,
            tie_break_reason: outcome.tie_break_reason.map(|s| s.to_string()),
            candidate_summaries: outcome.candidate_summaries,
        },
    );

    Ok(outcome.response)
}

/// The pure six-step procedure (no metrics, no async I/O) behind
/// [`aggregate`]: filter by constraints, normalise outputs, tally by
/// strategy, check quorum, tie-break, and summarise the result.
pub(crate) fn aggregate_outcome(
    candidates: Vec<Candidate>,
    config: &ConsensusConfig,
    judge: Option<&dyn Judge>,
) -> Result<AggregateOutcome, RunnerError> {
    // Step 1: filter by constraints.
    let mut failures = Vec::new();
    let mut survivors: Vec<&Candidate> = Vec::new();
    for candidate in &candidates {
        if let Some(max_latency) = config.max_latency_ms {
            if candidate.latency_ms > max_latency {
                continue;
            }
        }
        if let (Some(max_cost), Some(cost)) = (config.max_cost_usd, candidate.cost_estimate) {
            if cost > max_cost {
                continue;
            }
        }
        survivors.push(candidate);
    }

    let eligible: Vec<Eligible> = survivors
        .iter()
        .filter_map(|c| match &c.result {
            CandidateResult::Success(response) => match normalize(&response.text, config) {
                Some(normalized) => Some(Eligible {
                    candidate: c,
                    response,
                    normalized,
                }),
                None => {
                    failures.push(ProviderFailure {
                        provider: c.provider_id.clone(),
                        kind: crate::error::FailureKind::ParallelExecution,
                        message: "output did not parse against the configured schema".to_string(),
                    });
                    None
                }
            },
            CandidateResult::Failure { kind, message } => {
                failures.push(ProviderFailure {
                    provider: c.provider_id.clone(),
                    kind: *kind,
                    message: message.clone(),
                });
                None
            }
        })
        .collect();

    if eligible.is_empty() {
        return Err(RunnerError::ParallelExecutionError { failures });
    }

    let abstained = candidates.len() - survivors.len();
    let votes_against = failures.len();

    // Step 3: strategy dispatch.
    let (leading, winner_score) = match config.strategy {
        ConsensusStrategy::MajorityVote => majority_groups(&eligible),
        ConsensusStrategy::WeightedVote => weighted_groups(&eligible, config),
        ConsensusStrategy::MaxScore => {
            let judge = judge.ok_or_else(|| RunnerError::ParallelExecutionError {
                failures: failures.clone(),
            })?;
            let scored = max_score_leader(&eligible, judge);
            (vec![scored.0], Some(scored.1))
        }
    };

    let votes_for = leading.len() as u32;

    // Step 4: quorum check.
    let (pool, tie_break_reason_prefix): (Vec<&Eligible>, Option<&'static str>) = if votes_for
        >= config.quorum
    {
        (leading, None)
    } else if let Some(judge) = judge {
        let best = leading
            .iter()
            .max_by(|a, b| {
                judge
                    .score(&a.response.text)
                    .partial_cmp(&judge.score(&b.response.text))
                    .unwrap_or(Ordering::Equal)
            })
            .copied();
        (best.into_iter().collect(), Some("quorum not met, judge broke the tie"))
    } else {
        (
            eligible.iter().collect(),
            Some("quorum not met, no judge configured, tie-break applied to all eligible"),
        )
    };

    // Step 5: tie-break.
    let (winner, tie_break_applied, tie_break_used) = tie_break(pool, &config.tie_breaker);

    let candidate_summaries: Vec<Value> = candidates
        .iter()
        .map(|c| {
            serde_json::json!({
                "provider": c.provider_id,
                "index": c.index,
                "success": c.is_success(),
                "latency_ms": c.latency_ms,
                "cost_estimate": c.cost_estimate,
            })
        })
        .collect();

    Ok(AggregateOutcome {
        response: winner.response.clone(),
        votes_for,
        votes_against: votes_against as u32,
        abstained: abstained as u32,
        winner_provider: winner.candidate.provider_id.clone(),
        winner_score,
        tie_break_applied,
        tie_break_used,
        tie_break_reason: tie_break_reason_prefix,
        candidate_summaries,
    })
}

/// Text normalisation unless `config.schema` is set, in which case each
/// candidate must parse as JSON and is compared by deep equality over the
/// schema's declared top-level fields (`None` marks the candidate ineligible).
fn normalize(text: &str, config: &ConsensusConfig) -> Option<String> {
    let Some(schema) = &config.schema else {
        return Some(text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase());
    };

    let parsed: Value = serde_json::from_str(text).ok()?;
    let fields = schema.get("properties").and_then(|p| p.as_object());

    let canonical = match (fields, parsed.as_object()) {
        (Some(fields), Some(obj)) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let mut rendered = serde_json::Map::new();
            for key in keys {
                rendered.insert(key.clone(), obj.get(key).cloned().unwrap_or(Value::Null));
            }
            Value::Object(rendered)
        }
        _ => parsed,
    };
    serde_json::to_string(&canonical).ok()
}

/// Groups `eligible` by normalized text and returns every entry belonging
/// to a group tied for the highest vote count — not just the first group
/// encountered, so a genuine tie is visible to the quorum check below.
fn majority_groups<'a, 'e>(eligible: &'e [Eligible<'a>]) -> (Vec<&'e Eligible<'a>>, Option<f64>) {
    let count_of = |text: &str| eligible.iter().filter(|e| e.normalized == text).count();
    let best_count = eligible.iter().map(|e| count_of(&e.normalized)).max().unwrap_or(0);
    let best = eligible.iter().filter(|e| count_of(&e.normalized) == best_count).collect();
    (best, None)
}

/// Same tie-preserving grouping as [`majority_groups`], but ranks each
/// normalized-text group by the summed `provider_weights` of its members
/// (default weight `1.0`) instead of a raw vote count.
fn weighted_groups<'a, 'e>(
    eligible: &'e [Eligible<'a>],
    config: &ConsensusConfig,
) -> (Vec<&'e Eligible<'a>>, Option<f64>) {
    let weight_of = |e: &Eligible| *config.provider_weights.get(&e.candidate.provider_id).unwrap_or(&1.0);
    let group_weight =
        |text: &str| eligible.iter().filter(|e| e.normalized == text).map(weight_of).sum::<f64>();

    let best_weight = eligible
        .iter()
        .map(|e| group_weight(&e.normalized))
        .fold(f64::MIN, f64::max);
    let best = eligible
        .iter()
        .filter(|e| (group_weight(&e.normalized) - best_weight).abs() < 1e-9)
        .collect();
    (best, None)
}

fn max_score_leader<'a, 'e>(eligible: &'e [Eligible<'a>], judge: &dyn Judge) -> (&'e Eligible<'a>, f64) {
    let scored: Vec<(&Eligible, f64)> = eligible
        .iter()
        .map(|e| (e, judge.score(&e.response.text)))
        .collect();
    scored
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .expect("eligible is non-empty")
}

fn tie_break<'a, 'e>(
    mut pool: Vec<&'e Eligible<'a>>,
    tie_breakers: &[TieBreaker],
) -> (&'e Eligible<'a>, bool, Option<TieBreaker>) {
    let started_with = pool.len();
    let mut used = None;

    for tb in tie_breakers {
        if pool.len() <= 1 {
            break;
        }
        used = Some(*tb);
        pool = match tb {
            TieBreaker::MinLatency => {
                let min = pool.iter().map(|e| e.candidate.latency_ms).min().unwrap();
                pool.into_iter().filter(|e| e.candidate.latency_ms == min).collect()
            }
            TieBreaker::MinCost => {
                let min = pool
                    .iter()
                    .filter_map(|e| e.candidate.cost_estimate)
                    .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))));
                match min {
                    None => pool,
                    Some(min) => pool
                        .into_iter()
                        .filter(|e| e.candidate.cost_estimate.map(|c| c == min).unwrap_or(false))
                        .collect(),
                }
            }
            TieBreaker::StableOrder => {
                let min_index = pool.iter().map(|e| e.candidate.index).min().unwrap();
                pool.into_iter().filter(|e| e.candidate.index == min_index).collect()
            }
        };
    }

    let winner = pool.into_iter().next().expect("at least one candidate survives tie-break");
    (winner, started_with > 1, used)
}

fn strategy_name(strategy: ConsensusStrategy) -> &'static str {
    match strategy {
        ConsensusStrategy::MajorityVote => "majority_vote",
        ConsensusStrategy::MaxScore => "max_score",
        ConsensusStrategy::WeightedVote => "weighted_vote",
    }
}

fn tie_breaker_name(tb: TieBreaker) -> &'static str {
    match tb {
        TieBreaker::MinLatency => "min_latency",
        TieBreaker::MinCost => "min_cost",
        TieBreaker::StableOrder => "stable_order",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConsensusConfig;

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

    fn success(provider_id: &str, index: usize, text: &str, latency_ms: u64) -> Candidate {
        Candidate {
            provider_id: provider_id.to_string(),
            index,
            latency_ms,
            cost_estimate: None,
            result: CandidateResult::Success(response(text)),
        }
    }

    #[tokio::test]
    async fn s3_majority_vote_breaks_tie_on_latency() {
        let candidates = vec![
            success("A", 0, "yes", 50),
            success("B", 1, "yes", 10),
            success("C", 2, "no", 5),
        ];
        let config = ConsensusConfig::new(ConsensusStrategy::MajorityVote).with_quorum(2);
        let metrics = MetricsSink::disabled();

        let resp = aggregate(candidates, &config, None, &metrics, "run-1").await.unwrap();
        assert_eq!(resp.text, "yes");
    }

    #[tokio::test]
    async fn majority_groups_preserves_a_genuine_two_way_tie() {
        // Two single-vote groups tied at count 1; no judge configured, so the
        // quorum-miss fallback tie-breaks across all eligible candidates.
        // min_latency must see both "x" (50ms) and "y" (5ms), not just "x".
        let candidates = vec![success("A", 0, "x", 50), success("B", 1, "y", 5)];
        let config = ConsensusConfig::new(ConsensusStrategy::MajorityVote)
            .with_quorum(2)
            .with_tie_breaker(vec![TieBreaker::MinLatency, TieBreaker::StableOrder]);
        let metrics = MetricsSink::disabled();

        let resp = aggregate(candidates, &config, None, &metrics, "run-1").await.unwrap();
        assert_eq!(resp.text, "y");
    }

    struct FixedJudge {
        scores: std::collections::HashMap<String, f64>,
    }
    impl Judge for FixedJudge {
        fn score(&self, text: &str) -> f64 {
            *self.scores.get(text).unwrap_or(&0.0)
        }
    }

    #[tokio::test]
    async fn s4_max_score_picks_highest_judged_candidate() {
        let candidates = vec![success("A", 0, "a", 10), success("B", 1, "b", 10)];
        let config = ConsensusConfig::new(ConsensusStrategy::MaxScore).with_quorum(1);
        let judge = FixedJudge {
            scores: [("a".to_string(), 0.7), ("b".to_string(), 0.9)].into_iter().collect(),
        };
        let metrics = MetricsSink::disabled();

        let resp = aggregate(candidates, &config, Some(&judge), &metrics, "run-1")
            .await
            .unwrap();
        assert_eq!(resp.text, "b");
    }

    #[tokio::test]
    async fn all_failed_candidates_raise_parallel_execution_error() {
        let candidates = vec![Candidate {
            provider_id: "A".to_string(),
            index: 0,
            latency_ms: 10,
            cost_estimate: None,
            result: CandidateResult::Failure {
                kind: crate::error::FailureKind::Config,
                message: "bad".to_string(),
            },
        }];
        let config = ConsensusConfig::new(ConsensusStrategy::MajorityVote);
        let metrics = MetricsSink::disabled();

        let err = aggregate(candidates, &config, None, &metrics, "run-1").await.unwrap_err();
        assert!(matches!(err, RunnerError::ParallelExecutionError { .. }));
    }

    #[tokio::test]
    async fn weighted_vote_favours_higher_weighted_provider() {
        let candidates = vec![success("heavy", 0, "x", 10), success("light", 1, "y", 10)];
        let config = ConsensusConfig::new(ConsensusStrategy::WeightedVote)
            .with_quorum(1)
            .with_weight("heavy", 5.0)
            .with_weight("light", 1.0);
        let metrics = MetricsSink::disabled();

        let resp = aggregate(candidates, &config, None, &metrics, "run-1").await.unwrap();
        assert_eq!(resp.text, "x");
    }
}
