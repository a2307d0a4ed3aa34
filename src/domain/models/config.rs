//! Configuration model: the algorithm, launcher, decorator and logging options.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::models::RunResult;

/// Main configuration structure for the evaluation engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Target algorithm to execute (may also come from the command line)
    #[serde(default)]
    pub algorithm: Option<ExecutionConfig>,

    /// Process launcher options
    #[serde(default)]
    pub command_line: CommandLineOptions,

    /// Shell templates used to terminate runs
    #[serde(default)]
    pub kill_commands: KillCommands,

    /// Policy decorator options
    #[serde(default)]
    pub decorators: DecoratorOptions,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to invoke the target algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionConfig {
    /// Wrapper command line; may contain quoted arguments
    pub executable: String,

    /// Working directory of every run
    #[serde(default = "default_exec_dir")]
    pub exec_dir: PathBuf,

    /// Whether the algorithm ignores its seed
    #[serde(default)]
    pub deterministic: bool,

    /// Largest cutoff any request may use, in seconds
    #[serde(default = "default_algorithm_cutoff")]
    pub cutoff: f64,
}

fn default_exec_dir() -> PathBuf {
    PathBuf::from(".")
}

const fn default_algorithm_cutoff() -> f64 {
    300.0
}

impl ExecutionConfig {
    /// Run `executable` from `exec_dir` with the default cutoff.
    pub fn new(executable: impl Into<String>, exec_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            exec_dir: exec_dir.into(),
            deterministic: false,
            cutoff: default_algorithm_cutoff(),
        }
    }

    /// Set the largest cutoff any request may use.
    #[must_use]
    pub const fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }
}

/// Process launcher options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandLineOptions {
    /// Number of runs that may execute at once (size of the slot pool)
    #[serde(default = "default_cores")]
    pub cores: usize,

    /// Interval between observer snapshots in milliseconds (minimum 25)
    #[serde(default = "default_observer_frequency_ms")]
    pub observer_frequency_ms: u64,

    /// Listen on a UDP port for CPU time updates from the wrapper
    #[serde(default = "default_true")]
    pub listen_for_updates: bool,

    /// Log every call string at INFO
    #[serde(default)]
    pub log_all_call_strings: bool,

    /// Log every line of process output at DEBUG
    #[serde(default)]
    pub log_all_process_output: bool,

    /// Run the runs of one batch concurrently (otherwise one at a time)
    #[serde(default = "default_true")]
    pub concurrent_execution: bool,

    /// Number of trailing output lines retained for diagnostics
    #[serde(default = "default_output_tail_lines")]
    pub output_tail_lines: usize,
}

const fn default_cores() -> usize {
    1
}

const fn default_observer_frequency_ms() -> u64 {
    750
}

const fn default_true() -> bool {
    true
}

const fn default_output_tail_lines() -> usize {
    1000
}

impl Default for CommandLineOptions {
    fn default() -> Self {
        Self {
            cores: default_cores(),
            observer_frequency_ms: default_observer_frequency_ms(),
            listen_for_updates: true,
            log_all_call_strings: false,
            log_all_process_output: false,
            concurrent_execution: true,
            output_tail_lines: default_output_tail_lines(),
        }
    }
}

/// Operator supplied kill commands. `%pid` is replaced by the process id.
///
/// Unset templates fall back to sending the signal directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KillCommands {
    /// Graceful signal to the process group
    #[serde(default)]
    pub process_group_graceful: Option<String>,

    /// Graceful signal to the process
    #[serde(default)]
    pub process_graceful: Option<String>,

    /// Forceful signal to the process group
    #[serde(default)]
    pub process_group_force: Option<String>,

    /// Forceful signal to the process
    #[serde(default)]
    pub process_force: Option<String>,
}

/// Replacement value used by the response transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformExpr {
    /// Keep the reported value
    Reported,
    /// The request cutoff
    Cutoff,
    /// A fixed value
    Constant(f64),
    /// Reported value times a factor
    ScaledReported(f64),
    /// Cutoff times a factor
    ScaledCutoff(f64),
}

/// Remapping applied to outcomes of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransformRule {
    /// Result kind the rule matches
    pub applies_to: RunResult,

    /// Replacement runtime; unchanged when unset
    #[serde(default)]
    pub runtime: Option<TransformExpr>,

    /// Replacement quality; unchanged when unset
    #[serde(default)]
    pub quality: Option<TransformExpr>,
}

/// Policy decorator options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(clippy::struct_excessive_bools)]
pub struct DecoratorOptions {
    /// Report evaluators dropped without shutdown (or shut down twice)
    #[serde(default = "default_true")]
    pub unclean_shutdown_check: bool,

    /// Times a crashed run is retried
    #[serde(default)]
    pub retry_count: u32,

    /// Treat any crashed run as fatal
    #[serde(default)]
    pub abort_on_crash: bool,

    /// Treat a crash of the very first run as fatal
    #[serde(default = "default_true")]
    pub abort_on_first_run_crash: bool,

    /// Response transform rules
    #[serde(default)]
    pub transform: Vec<TransformRule>,

    /// Check decided outcomes against instance specific info (None = auto)
    #[serde(default)]
    pub verify_sat: Option<bool>,

    /// Require each instance to always be decided the same way
    #[serde(default = "default_true")]
    pub check_sat_consistency: bool,

    /// Fail the batch on a SAT/UNSAT discrepancy instead of logging it
    #[serde(default = "default_true")]
    pub check_sat_consistency_exception: bool,

    /// Record dispatched runs over time
    #[serde(default)]
    pub track_scheduled_runs: bool,

    /// Bucket width of the dispatch record in seconds
    #[serde(default = "default_track_resolution")]
    pub track_scheduled_runs_resolution: f64,

    /// Directory the dispatch record is written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Bound the number of runs in flight through the chain
    #[serde(default)]
    pub bound_runs: bool,

    /// Limit used when `bound_runs` is set
    #[serde(default = "default_max_concurrent_algo_execs")]
    pub max_concurrent_algo_execs: usize,

    /// Verify that outcomes come back in request order
    #[serde(default)]
    pub check_result_order_consistent: bool,

    /// Leak memory on every run (debugging aid)
    #[serde(default)]
    pub leak_memory: bool,

    /// Bytes leaked per run
    #[serde(default = "default_leak_memory_amount")]
    pub leak_memory_amount: usize,

    /// File of `Run Hash Codes: <h> After <n> runs` lines to verify against
    #[serde(default)]
    pub run_hash_codes_file: Option<PathBuf>,

    /// Log the rolling run hash code after every batch
    #[serde(default)]
    pub log_run_hash_codes: bool,

    /// Command executed when the chain is built
    #[serde(default)]
    pub pre_command: Option<String>,

    /// Command executed at shutdown
    #[serde(default)]
    pub post_command: Option<String>,

    /// Working directory of the pre/post commands
    #[serde(default = "default_exec_dir")]
    pub pre_post_exec_dir: PathBuf,

    /// Fail if a pre/post command exits with an error
    #[serde(default = "default_true")]
    pub pre_post_exception_on_error: bool,

    /// Do not track outstanding evaluations
    #[serde(default)]
    pub skip_outstanding_eval_tae: bool,

    /// Log every request and response at DEBUG
    #[serde(default)]
    pub log_requests_responses: bool,

    /// Log only the request part
    #[serde(default)]
    pub log_requests_responses_rc_only: bool,

    /// Look for duplicate requests in a batch
    #[serde(default = "default_true")]
    pub check_for_duplicates: bool,

    /// Fail batches containing duplicates instead of logging them
    #[serde(default = "default_true")]
    pub check_for_duplicates_exception: bool,

    /// Estimate runtime from wallclock when the algorithm reports none
    #[serde(default = "default_true")]
    pub use_walltime_if_no_runtime: bool,

    /// Factor applied to wallclock for the estimate
    #[serde(default = "default_walltime_scaling_factor")]
    pub walltime_scaling_factor: f64,

    /// Seconds of wallclock before an estimate is made
    #[serde(default = "default_walltime_delay")]
    pub walltime_delay: f64,

    /// Kill runs whose runtime exceeds a multiple of their cutoff
    #[serde(default = "default_true")]
    pub kill_runs_exceeding_captime: bool,

    /// Multiple of the cutoff at which runs are killed
    #[serde(default = "default_kill_factor")]
    pub kill_runs_exceeding_captime_factor: f64,

    /// Deleting this file kills every outstanding run
    #[serde(default)]
    pub file_to_watch: Option<PathBuf>,

    /// How often the watched file is checked, in milliseconds
    #[serde(default = "default_file_poll_interval_ms")]
    pub file_poll_interval_ms: u64,
}

const fn default_track_resolution() -> f64 {
    1.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".tae/output")
}

const fn default_max_concurrent_algo_execs() -> usize {
    1
}

const fn default_leak_memory_amount() -> usize {
    1024
}

const fn default_walltime_scaling_factor() -> f64 {
    0.95
}

const fn default_walltime_delay() -> f64 {
    5.0
}

const fn default_kill_factor() -> f64 {
    10.0
}

const fn default_file_poll_interval_ms() -> u64 {
    1000
}

impl Default for DecoratorOptions {
    fn default() -> Self {
        Self {
            unclean_shutdown_check: true,
            retry_count: 0,
            abort_on_crash: false,
            abort_on_first_run_crash: true,
            transform: vec![],
            verify_sat: None,
            check_sat_consistency: true,
            check_sat_consistency_exception: true,
            track_scheduled_runs: false,
            track_scheduled_runs_resolution: default_track_resolution(),
            output_dir: default_output_dir(),
            bound_runs: false,
            max_concurrent_algo_execs: default_max_concurrent_algo_execs(),
            check_result_order_consistent: false,
            leak_memory: false,
            leak_memory_amount: default_leak_memory_amount(),
            run_hash_codes_file: None,
            log_run_hash_codes: false,
            pre_command: None,
            post_command: None,
            pre_post_exec_dir: default_exec_dir(),
            pre_post_exception_on_error: true,
            skip_outstanding_eval_tae: false,
            log_requests_responses: false,
            log_requests_responses_rc_only: false,
            check_for_duplicates: true,
            check_for_duplicates_exception: true,
            use_walltime_if_no_runtime: true,
            walltime_scaling_factor: default_walltime_scaling_factor(),
            walltime_delay: default_walltime_delay(),
            kill_runs_exceeding_captime: true,
            kill_runs_exceeding_captime_factor: default_kill_factor(),
            file_to_watch: None,
            file_poll_interval_ms: default_file_poll_interval_ms(),
        }
    }
}

impl DecoratorOptions {
    /// Disable every policy that turns a crash into a fatal error.
    pub fn turn_off_crashes(&mut self) {
        self.abort_on_crash = false;
        self.abort_on_first_run_crash = false;
        self.verify_sat = Some(false);
        self.check_sat_consistency_exception = false;
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (if None logs only to the terminal)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Also log to stderr when logging to files
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Log file rotation
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human readable lines
    #[default]
    Pretty,
}

/// Log file rotation schedule.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// New file every day
    #[default]
    Daily,
    /// New file every hour
    Hourly,
    /// Single file
    Never,
}
