//! Domain models: requests, outcomes, live views and configuration.

pub mod config;
pub mod kill_token;
pub mod live_run;
pub mod run_outcome;
pub mod run_request;
pub mod run_result;

pub use config::{
    CommandLineOptions, Config, DecoratorOptions, ExecutionConfig, KillCommands, LogFormat,
    LoggingConfig, RotationPolicy, TransformExpr, TransformRule,
};
pub use kill_token::KillToken;
pub use live_run::LiveRun;
pub use run_outcome::{Latched, OutcomeLatch, RunOutcome, KILLED_RAW_LINE, NOT_RUN_RAW_LINE};
pub use run_request::{ParamConfiguration, ProblemInstance, RunRequest};
pub use run_result::RunResult;
