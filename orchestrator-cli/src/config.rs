//! # CLI Configuration Assembly (C13)
//!
//! `RunnerConfig`/`ConsensusConfig` are per-invocation values assembled
//! straight from `clap`-parsed flags — there is no separate runner-config
//! file. Provider definitions are the one piece of state worth persisting
//! across invocations, so those alone come from YAML via `serde_yaml`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use orchestrator_core::{
    ConsensusConfig, ConsensusStrategy, Mode, ProviderConfig, RunnerConfig, TieBreaker,
};

use crate::Args;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read provider config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse provider config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// One `--providers <path>` YAML file: a flat list under a top-level
/// `providers:` key.
#[derive(Debug, serde::Deserialize)]
struct ProviderFile {
    providers: Vec<ProviderConfig>,
}

/// Loads and concatenates every `--providers` file, in the order given on
/// the command line. Later files may repeat a provider name — the core
/// tolerates duplicates by list index (see `SPEC_FULL.md` §9).
pub fn load_provider_configs(paths: &[PathBuf]) -> Result<Vec<ProviderConfig>, ConfigError> {
    let mut configs = Vec::new();
    for path in paths {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let file: ProviderFile = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        configs.extend(file.providers);
    }
    if configs.is_empty() {
        return Err(ConfigError::Invalid(
            "at least one provider must be configured via --providers".to_string(),
        ));
    }
    Ok(configs)
}

fn parse_mode(s: &str) -> Result<Mode, ConfigError> {
    match s {
        "sequential" => Ok(Mode::Sequential),
        "parallel_any" => Ok(Mode::ParallelAny),
        "parallel_all" => Ok(Mode::ParallelAll),
        "consensus" => Ok(Mode::Consensus),
        other => Err(ConfigError::Invalid(format!("unknown --mode '{other}'"))),
    }
}

fn parse_strategy(s: &str) -> Result<ConsensusStrategy, ConfigError> {
    match s {
        "majority_vote" => Ok(ConsensusStrategy::MajorityVote),
        "max_score" => Ok(ConsensusStrategy::MaxScore),
        "weighted_vote" => Ok(ConsensusStrategy::WeightedVote),
        other => Err(ConfigError::Invalid(format!("unknown --aggregate strategy '{other}'"))),
    }
}

fn parse_tie_breakers(s: &str) -> Result<Vec<TieBreaker>, ConfigError> {
    s.split(',')
        .map(|part| match part.trim() {
            "min_latency" => Ok(TieBreaker::MinLatency),
            "min_cost" => Ok(TieBreaker::MinCost),
            "stable_order" => Ok(TieBreaker::StableOrder),
            other => Err(ConfigError::Invalid(format!("unknown --tie-breaker '{other}'"))),
        })
        .collect()
}

/// `name=weight,name=weight` pairs as passed to `--weights`.
fn parse_weights(s: &str) -> Result<HashMap<String, f64>, ConfigError> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (name, weight) = part
                .split_once('=')
                .ok_or_else(|| ConfigError::Invalid(format!("malformed --weights entry '{part}'")))?;
            let weight: f64 = weight
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid weight in '{part}'")))?;
            Ok((name.trim().to_string(), weight))
        })
        .collect()
}

fn parse_schema(path: &Path) -> Result<serde_json::Value, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid(format!("invalid --schema JSON: {e}")))
}

/// Assembles `RunnerConfig` from parsed CLI flags, validating eagerly so
/// the caller can map failures to exit code 2 before touching any provider.
pub fn build_runner_config(args: &Args) -> Result<RunnerConfig, ConfigError> {
    let mode = parse_mode(&args.mode)?;
    let mut config = RunnerConfig::new(mode)
        .with_max_concurrency(args.max_concurrency)
        .with_rpm(args.rpm);

    if let Some(path) = &args.metrics {
        config = config.with_metrics_path(path.clone());
    }
    if let Some(shadow) = &args.shadow {
        config = config.with_shadow_provider(shadow.clone());
    }

    if mode == Mode::Consensus {
        let strategy = parse_strategy(
            args.aggregate
                .as_deref()
                .ok_or_else(|| ConfigError::Invalid("--aggregate is required when --mode consensus".to_string()))?,
        )?;
        let mut consensus = ConsensusConfig::new(strategy);
        if let Some(quorum) = args.quorum {
            if quorum < 1 {
                return Err(ConfigError::Invalid("--quorum must be >= 1".to_string()));
            }
            consensus = consensus.with_quorum(quorum);
        }
        if let Some(tie_breaker) = &args.tie_breaker {
            consensus = consensus.with_tie_breaker(parse_tie_breakers(tie_breaker)?);
        }
        if let Some(schema_path) = &args.schema {
            consensus.schema = Some(parse_schema(schema_path)?);
        }
        if let Some(weights) = &args.weights {
            for (provider, weight) in parse_weights(weights)? {
                consensus = consensus.with_weight(provider, weight);
            }
        }
        if let Some(max_latency_ms) = args.max_latency_ms {
            consensus = consensus.with_max_latency_ms(max_latency_ms);
        }
        if let Some(max_cost_usd) = args.max_cost_usd {
            consensus = consensus.with_max_cost_usd(max_cost_usd);
        }
        config = config.with_consensus_config(consensus);
    }

    config
        .validate()
        .map_err(ConfigError::Invalid)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_weights_reads_pairs() {
        let weights = parse_weights("openai=2.0, ollama=1.0").unwrap();
        assert_eq!(weights["openai"], 2.0);
        assert_eq!(weights["ollama"], 1.0);
    }

    #[test]
    fn parse_tie_breakers_reads_ordered_list() {
        let order = parse_tie_breakers("min_latency,stable_order").unwrap();
        assert_eq!(order, vec![TieBreaker::MinLatency, TieBreaker::StableOrder]);
    }

    #[test]
    fn unknown_mode_is_invalid() {
        assert!(parse_mode("bogus").is_err());
    }
}
