//! Layered configuration loading with figment.

use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::infrastructure::process::MIN_OBSERVER_FREQUENCY_MS;

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".tae";

/// Prefix of environment variable overrides. Nested keys use `__`.
pub const ENV_PREFIX: &str = "TAE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `cores` is zero
    #[error("Invalid cores: {0}. Must be at least 1")]
    InvalidCores(usize),

    /// Observer interval below the minimum
    #[error("Invalid observer frequency: {0}ms. Must be at least 25ms")]
    InvalidObserverFrequency(u64),

    /// Unrecognized log level
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Algorithm cutoff is negative or not finite
    #[error("Invalid cutoff: {0}. Must be finite and non-negative")]
    InvalidCutoff(f64),

    /// Kill factor is not greater than 1
    #[error("Invalid kill factor: {0}. Must be greater than 1")]
    InvalidKillFactor(f64),

    /// Walltime scaling factor is not positive
    #[error("Invalid walltime scaling factor: {0}. Must be positive")]
    InvalidWalltimeScaling(f64),

    /// Concurrency bound is zero
    #[error("Invalid max_concurrent_algo_execs: {0}. Must be at least 1")]
    InvalidConcurrencyBound(usize),

    /// Any other rejected combination
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .tae/config.yaml (project config)
    /// 3. .tae/local.yaml (project local overrides, optional)
    /// 4. Environment variables (TAE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same as [`ConfigLoader::load`] with the configuration directory given explicitly.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let command_line = &config.command_line;
        if command_line.cores == 0 {
            return Err(ConfigError::InvalidCores(command_line.cores));
        }
        if command_line.observer_frequency_ms < MIN_OBSERVER_FREQUENCY_MS {
            return Err(ConfigError::InvalidObserverFrequency(
                command_line.observer_frequency_ms,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if let Some(algorithm) = &config.algorithm {
            if algorithm.executable.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "algorithm executable cannot be empty".to_string(),
                ));
            }
            if !algorithm.cutoff.is_finite() || algorithm.cutoff < 0.0 {
                return Err(ConfigError::InvalidCutoff(algorithm.cutoff));
            }
        }

        let decorators = &config.decorators;
        if decorators.kill_runs_exceeding_captime && decorators.kill_runs_exceeding_captime_factor <= 1.0 {
            return Err(ConfigError::InvalidKillFactor(
                decorators.kill_runs_exceeding_captime_factor,
            ));
        }
        if decorators.use_walltime_if_no_runtime
            && (!decorators.walltime_scaling_factor.is_finite() || decorators.walltime_scaling_factor <= 0.0)
        {
            return Err(ConfigError::InvalidWalltimeScaling(
                decorators.walltime_scaling_factor,
            ));
        }
        if decorators.bound_runs && decorators.max_concurrent_algo_execs == 0 {
            return Err(ConfigError::InvalidConcurrencyBound(
                decorators.max_concurrent_algo_execs,
            ));
        }
        if decorators.track_scheduled_runs && decorators.track_scheduled_runs_resolution <= 0.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "track_scheduled_runs_resolution must be positive, got {}",
                decorators.track_scheduled_runs_resolution
            )));
        }
        if decorators.file_to_watch.is_some() && decorators.file_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "file_poll_interval_ms must be positive when watching a file".to_string(),
            ));
        }

        Ok(())
    }
}
