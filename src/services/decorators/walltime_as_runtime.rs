//! Decorator substituting wallclock time for missing runtimes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::errors::EvalResult;
use crate::domain::models::{LiveRun, RunOutcome, RunRequest, RunResult};
use crate::domain::ports::{Evaluator, ObserverHandle};

const ESTIMATE_PREFIX: &str = "[Probably not accurate:]";

/// Substitutes scaled wallclock time for the runtime of runs that report
/// none, both in live snapshots and in `KILLED` outcomes.
pub struct WalltimeAsRuntimeEvaluator {
    inner: Arc<dyn Evaluator>,
    estimator: Estimator,
}

/// Estimate parameters, copied into wrapped observers.
#[derive(Debug, Clone, Copy)]
struct Estimator {
    scale: f64,
    delay: f64,
}

impl Estimator {
    fn applies(self, runtime: f64, wallclock: f64) -> bool {
        runtime == 0.0 && wallclock > self.delay
    }

    fn live(self, run: &LiveRun) -> LiveRun {
        if run.is_running() && self.applies(run.runtime(), run.wallclock()) {
            run.with_runtime(run.wallclock() * self.scale)
        } else {
            run.clone()
        }
    }

    fn outcome(self, outcome: RunOutcome) -> EvalResult<RunOutcome> {
        if outcome.kind() != RunResult::Killed || !self.applies(outcome.runtime(), outcome.wallclock()) {
            return Ok(outcome);
        }
        let runtime = outcome.wallclock() * self.scale;
        debug!(run = %outcome, runtime, "Using wallclock time as runtime of killed run");
        let raw_line = format!("{ESTIMATE_PREFIX} {}", outcome.raw_line());
        Ok(outcome
            .with_values(RunResult::Killed, runtime, outcome.quality())?
            .with_raw_line(raw_line))
    }
}

impl WalltimeAsRuntimeEvaluator {
    /// Runtime is `scale` times wallclock, once past `delay` seconds.
    pub fn new(inner: Arc<dyn Evaluator>, scale: f64, delay: f64) -> Self {
        Self {
            inner,
            estimator: Estimator { scale, delay },
        }
    }
}

#[async_trait]
impl Evaluator for WalltimeAsRuntimeEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let estimator = self.estimator;
        let estimating = observer.map(|observer| -> ObserverHandle {
            Arc::new(move |runs: &[LiveRun]| {
                let view: Vec<LiveRun> = runs.iter().map(|run| estimator.live(run)).collect();
                observer.current_status(&view);
            })
        });

        let outcomes = self.inner.evaluate(requests, estimating).await?;
        outcomes
            .into_iter()
            .map(|outcome| estimator.outcome(outcome))
            .collect()
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}
