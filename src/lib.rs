//! tae - Target Algorithm Evaluator
//!
//! tae launches an external target algorithm under strict time budgets,
//! parses its result line, enforces cancellation and timeout policy, bounds
//! concurrency, and stacks correctness and safety policies (retry, abort on
//! crash, consistency checks, timing enforcement) around a pluggable
//! execution backend.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): run model, errors, and the `Evaluator` port
//! - **Adapters** (`adapters`): base evaluators (command line, constant, preloaded)
//! - **Service Layer** (`services`): policy decorators and the builder that composes them
//! - **Infrastructure Layer** (`infrastructure`): process launching, configuration, logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use tae::{EvaluatorBuilder, ConfigLoader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let evaluator = EvaluatorBuilder::new(config).build().await?;
//!     let outcomes = evaluator.evaluate(requests, None).await?;
//!     evaluator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::evaluators::{CommandLineEvaluator, ConstantEvaluator, PreloadedEvaluator, PreloadedResponse};
pub use domain::errors::{EvalResult, EvaluatorError, MalformedResult};
pub use domain::models::{
    Config, ExecutionConfig, KillToken, LiveRun, ParamConfiguration, ProblemInstance, RunOutcome,
    RunRequest, RunResult,
};
pub use domain::ports::{EvaluationCallback, Evaluator, ObserverHandle, RunObserver};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::EvaluatorBuilder;
