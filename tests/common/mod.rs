//! Common test utilities for integration tests
//!
//! Provides wrapper-script fixtures and request builders used across
//! multiple integration test files.

#![allow(dead_code)]

use std::path::Path;

use tae::domain::models::{
    Config, ExecutionConfig, ParamConfiguration, ProblemInstance, RunRequest,
};
use tempfile::TempDir;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Write a shell wrapper into `dir` and return the command line that runs it.
///
/// The wrapper is run through `sh` so it needs no executable bit. Arguments
/// follow the wrapper protocol: `$1` instance, `$2` instance info, `$3`
/// cutoff, `$4` run length limit, `$5` seed, then `-name 'value'` pairs.
pub fn write_wrapper(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write wrapper");
    format!("sh {}", path.display())
}

/// Configuration running `executable` in `dir` with fast observer updates.
pub fn wrapper_config(executable: String, dir: &Path) -> Config {
    let mut config = Config {
        algorithm: Some(ExecutionConfig::new(executable, dir)),
        ..Config::default()
    };
    config.command_line.observer_frequency_ms = 25;
    config.command_line.listen_for_updates = false;
    config
}

pub fn request(instance: &str, seed: i64, cutoff: f64) -> RunRequest {
    RunRequest::new(
        ProblemInstance::new(instance),
        seed,
        cutoff,
        ParamConfiguration::new().with("alpha", "1"),
    )
    .expect("valid request")
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 10ms until it returns true or timeout is reached.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    predicate()
}
