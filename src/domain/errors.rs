//! Domain errors for the target algorithm evaluation engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::models::RunRequest;

/// Format a list of requests as `[a, b, c]` for error messages.
fn format_requests(requests: &[RunRequest]) -> String {
    let rendered: Vec<String> = requests.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

/// A result that violates the run outcome invariants.
///
/// Raised when a terminal result is constructed; the launcher turns it into
/// a `CRASHED` outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedResult {
    /// Runtime is NaN or negative
    #[error("Runtime is NaN or negative: {0}")]
    InvalidRuntime(f64),

    /// Run length is NaN, or negative other than the `-1` sentinel
    #[error("Run length is NaN or negative (and not -1): {0}")]
    InvalidRunLength(f64),

    /// Quality is NaN
    #[error("Quality is NaN")]
    InvalidQuality,

    /// `RUNNING` used for a terminal outcome
    #[error("Only live runs may report RUNNING")]
    RunningNotTerminal,
}

/// Accessing the outcome of a run that has not reached a terminal state.
#[derive(Debug, Clone, Error)]
#[error("Run has not completed: {0}")]
pub struct OutcomePending(pub String);

/// Errors surfaced by evaluators and their decorators.
///
/// Everything here is fatal for the batch it occurred in. Ordinary algorithm
/// failures are data (a `CRASHED` outcome), not errors.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// A run reported `ABORT`
    #[error("Target algorithm abort: {0}")]
    Abort(String),

    /// A run crashed while crashes are fatal
    #[error("Target Algorithm Run Reported Crashed: {0}")]
    RunCrashed(String),

    /// The very first run crashed
    #[error("First Run Crashed: {0}")]
    FirstRunCrashed(String),

    /// The same request appeared more than once in a batch
    #[error(
        "Duplicate Run Configurations cannot be part of the same call: {}",
        format_requests(.0)
    )]
    DuplicateRequests(Vec<RunRequest>),

    /// An instance was decided both `SAT` and `UNSAT`
    #[error("SAT/UNSAT discrepancy detected on problem instance: {instance}, previously {previous} now {current}")]
    SatInconsistency {
        /// Instance name
        instance: String,
        /// First decision seen
        previous: String,
        /// Conflicting decision
        current: String,
    },

    /// An outcome came back at the wrong position in its batch
    #[error("Result order violated at index {index}: expected {expected}, got {actual}")]
    ResultOrder {
        /// Position in the batch
        index: usize,
        /// Request sent at that position
        expected: String,
        /// Request the outcome belongs to
        actual: String,
    },

    /// The rolling run hash diverged from the expected codes
    #[error("Run hash code mismatch after {runs} runs: expected {expected}, computed {computed}")]
    RunHashMismatch {
        /// Runs folded into the hash so far
        runs: u64,
        /// Code read from the expected list
        expected: u64,
        /// Code computed from this session
        computed: u64,
    },

    /// An evaluator returned a different number of outcomes than requests
    #[error("Wrong number of outcomes: requested {requested}, received {received}")]
    OutcomeCount {
        /// Requests in the batch
        requested: usize,
        /// Outcomes returned
        received: usize,
    },

    /// An outcome violated its invariants
    #[error(transparent)]
    Malformed(#[from] MalformedResult),

    /// The execution directory is missing
    #[error("Execution directory does not exist or is not a directory: {0}")]
    InvalidExecDir(PathBuf),

    /// Options rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A pre or post command exited unsuccessfully
    #[error("External command failed: {0}")]
    CommandFailed(String),

    /// Work submitted after shutdown
    #[error("Evaluator has been shut down")]
    Shutdown,

    /// A submission finished without completing its callback
    #[error("Evaluation callback dropped without completion")]
    CallbackDropped,

    /// The evaluator cannot perform the operation
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvaluatorError>;
