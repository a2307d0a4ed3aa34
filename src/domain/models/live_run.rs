//! Live views of runs, handed to observers while a batch executes.

use std::fmt;

use crate::domain::models::{KillToken, RunOutcome, RunRequest, RunResult};

#[derive(Debug, Clone)]
enum LiveStatus {
    Running {
        request: RunRequest,
        runtime: f64,
        wallclock: f64,
    },
    Completed(RunOutcome),
}

/// Snapshot of one run as seen by an observer.
///
/// This is the only type that can report `RUNNING`. Snapshots are immutable;
/// the only way to affect the run is [`LiveRun::kill`].
#[derive(Debug, Clone)]
pub struct LiveRun {
    status: LiveStatus,
    kill_token: KillToken,
}

impl LiveRun {
    /// Snapshot of an in-flight run.
    pub fn running(request: RunRequest, runtime: f64, wallclock: f64, kill_token: KillToken) -> Self {
        Self {
            status: LiveStatus::Running {
                request,
                runtime: runtime.max(0.0),
                wallclock: wallclock.max(0.0),
            },
            kill_token,
        }
    }

    /// Final view of a finished run.
    pub const fn completed(outcome: RunOutcome, kill_token: KillToken) -> Self {
        Self {
            status: LiveStatus::Completed(outcome),
            kill_token,
        }
    }

    /// The request being run.
    pub const fn request(&self) -> &RunRequest {
        match &self.status {
            LiveStatus::Running { request, .. } => request,
            LiveStatus::Completed(outcome) => outcome.request(),
        }
    }

    /// `Running` until the run finishes, then its terminal kind.
    pub const fn kind(&self) -> RunResult {
        match &self.status {
            LiveStatus::Running { .. } => RunResult::Running,
            LiveStatus::Completed(outcome) => outcome.kind(),
        }
    }

    /// Whether the run is still in flight.
    pub const fn is_running(&self) -> bool {
        matches!(self.status, LiveStatus::Running { .. })
    }

    /// Best known CPU time.
    pub const fn runtime(&self) -> f64 {
        match &self.status {
            LiveStatus::Running { runtime, .. } => *runtime,
            LiveStatus::Completed(outcome) => outcome.runtime(),
        }
    }

    /// Seconds since the run started.
    pub const fn wallclock(&self) -> f64 {
        match &self.status {
            LiveStatus::Running { wallclock, .. } => *wallclock,
            LiveStatus::Completed(outcome) => outcome.wallclock(),
        }
    }

    /// The terminal outcome, if the run has finished.
    pub const fn outcome(&self) -> Option<&RunOutcome> {
        match &self.status {
            LiveStatus::Running { .. } => None,
            LiveStatus::Completed(outcome) => Some(outcome),
        }
    }

    /// Same run with a different runtime estimate. Completed runs are left
    /// untouched if the estimate would make the outcome malformed.
    #[must_use]
    pub fn with_runtime(&self, runtime: f64) -> Self {
        let status = match &self.status {
            LiveStatus::Running {
                request, wallclock, ..
            } => LiveStatus::Running {
                request: request.clone(),
                runtime: runtime.max(0.0),
                wallclock: *wallclock,
            },
            LiveStatus::Completed(outcome) => LiveStatus::Completed(
                outcome
                    .with_values(outcome.kind(), runtime, outcome.quality())
                    .unwrap_or_else(|_| outcome.clone()),
            ),
        };
        Self {
            status,
            kill_token: self.kill_token.clone(),
        }
    }

    /// Request termination of the underlying run. No-op once it has finished.
    pub fn kill(&self) {
        if self.is_running() {
            self.kill_token.kill();
        }
    }

    /// Whether a kill has been requested for this run.
    pub fn is_kill_requested(&self) -> bool {
        self.kill_token.is_killed()
    }

    /// Token that terminates this run.
    pub const fn kill_token(&self) -> &KillToken {
        &self.kill_token
    }
}

impl fmt::Display for LiveRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            LiveStatus::Running {
                request,
                runtime,
                wallclock,
            } => write!(f, "{request} ==> <RUNNING, {runtime:.3}> W:({wallclock:.3})"),
            LiveStatus::Completed(outcome) => outcome.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ParamConfiguration, ProblemInstance};

    fn request() -> RunRequest {
        RunRequest::new(ProblemInstance::new("inst"), 1, 5.0, ParamConfiguration::new()).unwrap()
    }

    #[test]
    fn test_running_snapshot_reports_running() {
        let live = LiveRun::running(request(), 1.5, 2.0, KillToken::new());
        assert_eq!(live.kind(), RunResult::Running);
        assert!(live.outcome().is_none());
        assert!((live.runtime() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_kill_goes_through_token() {
        let token = KillToken::new();
        let live = LiveRun::running(request(), 0.0, 0.0, token.clone());
        live.kill();
        live.kill();
        assert!(token.is_killed());
    }

    #[test]
    fn test_kill_on_completed_run_is_noop() {
        let token = KillToken::new();
        let live = LiveRun::completed(RunOutcome::crashed(request(), "x"), token.clone());
        live.kill();
        assert!(!token.is_killed());
    }

    #[test]
    fn test_with_runtime_keeps_identity() {
        let live = LiveRun::running(request(), 0.0, 7.0, KillToken::new());
        let estimated = live.with_runtime(6.65);
        assert_eq!(estimated.request(), live.request());
        assert!((estimated.runtime() - 6.65).abs() < f64::EPSILON);
        assert!((estimated.wallclock() - 7.0).abs() < f64::EPSILON);
    }
}
