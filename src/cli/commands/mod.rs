//! CLI command implementations.

pub mod batch;
pub mod config;
pub mod run;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::cli::types::{AlgorithmArgs, Cli};
use crate::domain::models::{Config, ExecutionConfig, RunOutcome, RunRequest};
use crate::domain::ports::Evaluator;
use crate::infrastructure::config::ConfigLoader;
use crate::services::EvaluatorBuilder;

/// Load the effective configuration, applying global command line overrides.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(cores) = cli.cores {
        config.command_line.cores = cores;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    ConfigLoader::validate(&config).context("Invalid configuration")?;
    Ok(config)
}

/// Override the configured algorithm from command line arguments.
pub fn apply_algorithm_args(config: &mut Config, args: &AlgorithmArgs) -> Result<()> {
    if let Some(executable) = &args.executable {
        config
            .algorithm
            .get_or_insert_with(|| ExecutionConfig::new(executable.clone(), "."))
            .executable
            .clone_from(executable);
    }
    let Some(algorithm) = config.algorithm.as_mut() else {
        anyhow::bail!("No target algorithm configured; pass --exec or set algorithm.executable");
    };
    if let Some(dir) = &args.exec_dir {
        algorithm.exec_dir.clone_from(dir);
    }
    Ok(())
}

/// Build the decorated evaluator, evaluate one batch, and shut down.
pub async fn evaluate_batch(config: Config, requests: Vec<RunRequest>) -> Result<Vec<RunOutcome>> {
    if let Some(algorithm) = &config.algorithm {
        for request in requests.iter().filter(|r| r.cutoff() > algorithm.cutoff) {
            warn!(run = %request, max_cutoff = algorithm.cutoff, "Request cutoff exceeds the algorithm cutoff");
        }
    }

    let evaluator: Arc<dyn Evaluator> = EvaluatorBuilder::new(config)
        .build()
        .await
        .context("Failed to build target algorithm evaluator")?;

    let result = evaluator.evaluate(requests, None).await;
    evaluator.shutdown().await;
    result.context("Target algorithm evaluation failed")
}
