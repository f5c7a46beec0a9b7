//! # orchestrator CLI binary
//!
//! Loads provider config, assembles a `RunnerConfig`, dispatches one or
//! more prompts through `orchestrator_core::runner::run`, and prints one
//! JSON record per prompt to stdout.

use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use orchestrator_core::error::RunnerError;
use orchestrator_core::metrics::MetricsSink;
use orchestrator_core::models::ProviderRequest;
use orchestrator_core::providers::{self, Provider};
use orchestrator_core::rate_limiter::RateLimiter;
use orchestrator_core::runner;

use orchestrator_cli::config::{self, ConfigError};
use orchestrator_cli::judges;
use orchestrator_cli::Args;

#[derive(Serialize)]
struct OutputRecord {
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn init_tracing(args: &Args) {
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.log_format == "json" {
        builder.json().init();
    } else {
        let ansi = std::env::var("NO_COLOR").is_err();
        builder.with_ansi(ansi).init();
    }
}

fn exit_code_for(err: &RunnerError) -> i32 {
    match err {
        RunnerError::ConfigError { .. } => 2,
        RunnerError::AuthError { .. } => 3,
        RunnerError::TimeoutError { .. } | RunnerError::RetriableError { .. } => 4,
        RunnerError::RateLimitError { .. } => 6,
        RunnerError::AllFailedError { failures } | RunnerError::ParallelExecutionError { failures } => {
            if failures.iter().any(|f| f.kind == orchestrator_core::FailureKind::RateLimit) {
                6
            } else {
                5
            }
        }
        RunnerError::ProviderSkip { .. } => 5,
    }
}

fn read_prompts(args: &Args) -> Result<Vec<ProviderRequest>, ConfigError> {
    if let Some(prompt) = &args.prompt {
        return Ok(vec![ProviderRequest::builder(&args.model)
            .with_prompt(prompt.clone())
            .build()
            .map_err(ConfigError::Invalid)?]);
    }
    if let Some(path) = &args.prompt_file {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        return Ok(vec![ProviderRequest::builder(&args.model)
            .with_prompt(text)
            .build()
            .map_err(ConfigError::Invalid)?]);
    }
    if let Some(path) = &args.prompts_jsonl {
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let reader = std::io::BufReader::new(file);
        let mut requests = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let request: ProviderRequest = serde_json::from_str(&line)
                .map_err(|e| ConfigError::Invalid(format!("invalid request on line: {e}")))?;
            requests.push(request);
        }
        return Ok(requests);
    }
    Err(ConfigError::Invalid(
        "one of --prompt, --prompt-file, or --prompts-jsonl is required".to_string(),
    ))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args);

    std::process::exit(run_cli(args).await);
}

async fn run_cli(args: Args) -> i32 {
    let provider_configs = match config::load_provider_configs(&args.providers) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return 2;
        }
    };

    let runner_config = match config::build_runner_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return 2;
        }
    };

    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    let mut shadow_provider: Option<Arc<dyn Provider>> = None;
    for provider_config in provider_configs {
        let name = provider_config.name.clone();
        match providers::create_provider(provider_config) {
            Ok(provider) => {
                let provider: Arc<dyn Provider> = Arc::from(provider);
                if args.shadow.as_deref() == Some(name.as_str()) {
                    shadow_provider = Some(provider.clone());
                } else {
                    providers.push(provider);
                }
            }
            Err(RunnerError::ProviderSkip { reason }) => {
                tracing::warn!(provider = %name, reason, "skipping disabled provider");
            }
            Err(e) => {
                eprintln!("failed to construct provider '{name}': {e}");
                return 2;
            }
        }
    }

    if providers.is_empty() {
        eprintln!("no enabled providers configured");
        return 2;
    }

    let judge = args.judge.as_deref().and_then(judges::resolve);
    if args.judge.is_some() && judge.is_none() {
        eprintln!("unknown --judge '{}'", args.judge.as_deref().unwrap_or(""));
        return 2;
    }

    let requests = match read_prompts(&args) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{e}");
            return 2;
        }
    };

    let rate_limiter = Arc::new(RateLimiter::new(runner_config.rpm));
    let metrics = Arc::new(MetricsSink::from_config(runner_config.metrics_path.as_ref()));

    let stdout = std::io::stdout();
    let mut writer = stdout.lock();
    let mut last_exit_code = 0;

    for request in requests {
        let run_id = args.run_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let outcome = runner::run(
            &request,
            &providers,
            shadow_provider.clone(),
            &runner_config,
            rate_limiter.clone(),
            metrics.clone(),
            judge.clone(),
            &run_id,
        )
        .await;

        let record = match outcome {
            Ok(response) => OutputRecord {
                run_id,
                response: Some(response.text),
                error: None,
            },
            Err(err) => {
                last_exit_code = exit_code_for(&err);
                eprintln!("{err}");
                OutputRecord {
                    run_id,
                    response: None,
                    error: Some(err.to_string()),
                }
            }
        };

        if let Ok(line) = serde_json::to_string(&record) {
            let _ = writeln!(writer, "{line}");
        }
    }

    last_exit_code
}
