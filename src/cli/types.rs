//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command line interface of the evaluator.
#[derive(Parser, Debug)]
#[command(name = "tae")]
#[command(about = "Target algorithm evaluator", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .tae/config.yaml and .tae/local.yaml)
    #[arg(short, long, global = true, env = "TAE_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Number of runs that may execute at once
    #[arg(long, global = true)]
    pub cores: Option<usize>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a single run request
    Run(RunArgs),

    /// Evaluate a YAML list of run requests as one batch
    Batch(BatchArgs),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Target algorithm overrides shared by the run commands.
#[derive(Args, Debug)]
pub struct AlgorithmArgs {
    /// Wrapper command line (overrides the configured algorithm)
    #[arg(long = "exec")]
    pub executable: Option<String>,

    /// Working directory of the wrapper
    #[arg(long)]
    pub exec_dir: Option<PathBuf>,
}

/// Evaluate a single run request
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Target algorithm overrides
    #[command(flatten)]
    pub algorithm: AlgorithmArgs,

    /// Problem instance name
    #[arg(long)]
    pub instance: String,

    /// Instance specific information
    #[arg(long)]
    pub instance_info: Option<String>,

    /// Seed passed to the wrapper
    #[arg(long, default_value = "1")]
    pub seed: i64,

    /// Cutoff time in seconds
    #[arg(long)]
    pub cutoff: f64,

    /// Parameter setting as name=value (repeatable)
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

/// Evaluate a YAML list of run requests as one batch
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Target algorithm overrides
    #[command(flatten)]
    pub algorithm: AlgorithmArgs,

    /// YAML file containing a list of run requests
    pub file: PathBuf,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
}

/// Parse a `name=value` parameter setting.
pub fn parse_param(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in '{s}'"));
    }
    Ok((name.to_string(), value.to_string()))
}
