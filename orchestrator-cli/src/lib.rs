//! # orchestrator-cli
//!
//! The command-line front end over `orchestrator-core`: loads provider
//! configuration from YAML, assembles a `RunnerConfig` from flags, reads
//! one or more prompts, and prints one JSON record per prompt.

pub mod config;
pub mod judges;

use clap::Parser;
use std::path::PathBuf;

/// Dispatch a prompt to one or more LLM providers under a failover,
/// racing, or consensus policy, emitting structured JSONL metrics.
#[derive(Parser, Debug)]
#[command(name = "orchestrator", author, version, about, long_about = None)]
pub struct Args {
    /// YAML file declaring one or more providers; repeatable.
    #[arg(long = "providers", required = true)]
    pub providers: Vec<PathBuf>,

    /// Execution mode.
    #[arg(long, default_value = "sequential")]
    pub mode: String,

    /// Maximum concurrent in-flight provider attempts (parallel modes only).
    #[arg(long, default_value_t = 4)]
    pub max_concurrency: usize,

    /// Global requests-per-minute cap; 0 disables rate limiting.
    #[arg(long, default_value_t = 0)]
    pub rpm: u32,

    /// Append-only JSONL metrics sink path; omit to disable metrics entirely.
    #[arg(long)]
    pub metrics: Option<PathBuf>,

    /// Consensus voting strategy; required when `--mode consensus`.
    #[arg(long)]
    pub aggregate: Option<String>,

    /// Minimum vote count for the leading group to win outright.
    #[arg(long)]
    pub quorum: Option<u32>,

    /// Comma-separated tie-break order, e.g. `min_latency,stable_order`.
    #[arg(long)]
    pub tie_breaker: Option<String>,

    /// Path to a JSON schema file; when set, consensus compares structured
    /// fields instead of normalised text.
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Built-in judge name for the `max_score` strategy (see `judges`).
    #[arg(long)]
    pub judge: Option<String>,

    /// `name=weight,...` pairs for the `weighted_vote` strategy.
    #[arg(long)]
    pub weights: Option<String>,

    /// Drop candidates slower than this latency before aggregating.
    #[arg(long)]
    pub max_latency_ms: Option<u64>,

    /// Drop candidates costing more than this before aggregating.
    #[arg(long)]
    pub max_cost_usd: Option<f64>,

    /// Provider name to run concurrently as a shadow; never affects the result.
    #[arg(long)]
    pub shadow: Option<String>,

    /// Literal prompt text.
    #[arg(long, conflicts_with_all = ["prompt_file", "prompts_jsonl"])]
    pub prompt: Option<String>,

    /// Read a single prompt from a file.
    #[arg(long = "prompt-file", conflicts_with = "prompts_jsonl")]
    pub prompt_file: Option<PathBuf>,

    /// One request object per line, processed sequentially.
    #[arg(long = "prompts-jsonl")]
    pub prompts_jsonl: Option<PathBuf>,

    /// Overrides the generated run id.
    #[arg(long = "run-id")]
    pub run_id: Option<String>,

    /// Raise log verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log line format.
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: String,

    /// Model name forwarded to every provider for this run.
    #[arg(long, default_value = "default")]
    pub model: String,
}
