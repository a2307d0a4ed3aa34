//! Decorator reporting cutoff overruns and timing totals.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::errors::EvalResult;
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Warns when runs exceed their cutoff by a growing margin, and reports
/// accumulated runtime and overhead totals at shutdown.
pub struct TimingCheckerEvaluator {
    inner: Arc<dyn Evaluator>,
    state: Mutex<TimingState>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TimingState {
    runtime_delta: f64,
    wallclock_delta: f64,
    total_runtime: f64,
    total_overhead: f64,
    total_wallclock: f64,
    total_wall_overhead: f64,
}

impl TimingState {
    fn new(algorithm_cutoff: f64) -> Self {
        Self {
            runtime_delta: 1.0,
            wallclock_delta: (algorithm_cutoff * 1.5).min(10.0),
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: &RunOutcome) {
        let cutoff = outcome.request().cutoff();
        let overhead = (outcome.runtime() - cutoff).max(0.0);
        let wall_overhead = (outcome.wallclock() - cutoff).max(0.0);

        self.total_runtime += outcome.runtime();
        self.total_wallclock += outcome.wallclock();
        self.total_overhead += overhead;
        self.total_wall_overhead += wall_overhead;

        if overhead > self.runtime_delta {
            self.runtime_delta = overhead + 1.0;
            warn!(
                run = %outcome,
                overhead,
                next_warning = self.runtime_delta,
                "Algorithm reported a runtime exceeding its cutoff; further warnings only above the next threshold"
            );
        }
        if wall_overhead > self.wallclock_delta {
            self.wallclock_delta = wall_overhead + 1.0;
            warn!(
                run = %outcome,
                overhead = wall_overhead,
                next_warning = self.wallclock_delta,
                "Algorithm wallclock time exceeded its cutoff; further warnings only above the next threshold"
            );
        }
    }
}

impl TimingCheckerEvaluator {
    /// `algorithm_cutoff` sets the initial overrun margin.
    pub fn new(inner: Arc<dyn Evaluator>, algorithm_cutoff: f64) -> Self {
        Self {
            inner,
            state: Mutex::new(TimingState::new(algorithm_cutoff)),
        }
    }

    /// Current warning thresholds for runtime and wallclock overhead.
    pub fn thresholds(&self) -> (f64, f64) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.runtime_delta, state.wallclock_delta)
    }
}

#[async_trait]
impl Evaluator for TimingCheckerEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let outcomes = self.inner.evaluate(requests, observer).await?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for outcome in &outcomes {
            state.record(outcome);
        }
        Ok(outcomes)
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }

    async fn shutdown(&self) {
        let totals = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        info!(
            total_runtime = totals.total_runtime,
            total_overhead = totals.total_overhead,
            total_wallclock = totals.total_wallclock,
            total_wall_overhead = totals.total_wall_overhead,
            wallclock_minus_runtime = totals.total_wallclock - totals.total_runtime,
            "Target algorithm timing totals"
        );
        self.inner.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunResult;
    use crate::services::decorators::test_support::{request, ScriptedEvaluator};

    #[test]
    fn test_initial_thresholds() {
        assert!((TimingState::new(300.0).wallclock_delta - 10.0).abs() < f64::EPSILON);
        assert!((TimingState::new(2.0).wallclock_delta - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_threshold_rearms_after_overrun() {
        // cutoff is 10, runtime 13.5 overruns by 3.5
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 13.5));
        let checker = TimingCheckerEvaluator::new(inner, 10.0);

        checker.evaluate(vec![request("a", 1)], None).await.unwrap();
        let (runtime_delta, _) = checker.thresholds();
        assert!((runtime_delta - 4.5).abs() < 1e-9);

        // same overrun does not move the threshold again
        checker.evaluate(vec![request("a", 2)], None).await.unwrap();
        let (runtime_delta, _) = checker.thresholds();
        assert!((runtime_delta - 4.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_shutdown_reaches_inner() {
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0));
        let checker = TimingCheckerEvaluator::new(inner.clone(), 10.0);
        checker.shutdown().await;
        assert_eq!(inner.shutdowns.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
