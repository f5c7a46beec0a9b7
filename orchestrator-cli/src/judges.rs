//! Built-in [`Judge`] implementations resolvable by name from `--judge`.
//!
//! The core only knows the trait object; concrete scoring functions are a
//! CLI concern since they encode policy ("what makes an answer better"),
//! not execution semantics.

use std::sync::Arc;

use orchestrator_core::Judge;

/// Scores longer (non-whitespace) output higher, saturating at 1.0 past
/// 500 characters. A reasonable default when no domain-specific judge is
/// configured.
pub struct LongestAnswerJudge;

impl Judge for LongestAnswerJudge {
    fn score(&self, text: &str) -> f64 {
        let len = text.trim().chars().count() as f64;
        (len / 500.0).min(1.0)
    }
}

/// Scores shorter output higher, the inverse of [`LongestAnswerJudge`].
/// Useful for summarisation-style consensus where terseness wins ties.
pub struct ShortestAnswerJudge;

impl Judge for ShortestAnswerJudge {
    fn score(&self, text: &str) -> f64 {
        let len = text.trim().chars().count() as f64;
        1.0 - (len / 500.0).min(1.0)
    }
}

/// Resolves a `--judge <name>` flag to a concrete implementation. Returned
/// as an `Arc` (not `Box`) because `runner::run` shares it into a detached
/// shadow task across possibly-concurrent requests, not just one call.
pub fn resolve(name: &str) -> Option<Arc<dyn Judge>> {
    match name {
        "longest" => Some(Arc::new(LongestAnswerJudge)),
        "shortest" => Some(Arc::new(ShortestAnswerJudge)),
        _ => None,
    }
}
