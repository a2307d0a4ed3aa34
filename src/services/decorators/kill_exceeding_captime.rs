//! Decorator killing runs that overshoot their cutoff.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::warn;

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{LiveRun, RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Kills runs whose reported runtime passes `factor` times their cutoff.
///
/// Only runs that are observed can be killed, so an observer is always
/// installed on the wrapped evaluator.
pub struct KillExceedingCaptimeEvaluator {
    inner: Arc<dyn Evaluator>,
    factor: f64,
}

impl KillExceedingCaptimeEvaluator {
    /// Fails unless `factor` is greater than 1.
    pub fn new(inner: Arc<dyn Evaluator>, factor: f64) -> EvalResult<Self> {
        if factor.is_nan() || factor <= 1.0 {
            return Err(EvaluatorError::InvalidConfiguration(format!(
                "kill_runs_exceeding_captime_factor must be greater than 1, got {factor}"
            )));
        }
        if factor < 2.0 {
            warn!(factor, "Runs will be killed close to their cutoff; measurement noise may kill legitimate runs");
        }
        Ok(Self { inner, factor })
    }
}

#[async_trait]
impl Evaluator for KillExceedingCaptimeEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let factor = self.factor;
        let killed: Mutex<HashSet<RunRequest>> = Mutex::new(HashSet::new());
        let enforcing: ObserverHandle = Arc::new(move |runs: &[LiveRun]| {
            for run in runs.iter().filter(|run| run.is_running()) {
                let cutoff = run.request().cutoff();
                if cutoff * factor < run.runtime() {
                    let mut killed = killed.lock().unwrap_or_else(PoisonError::into_inner);
                    if killed.insert(run.request().clone()) {
                        warn!(
                            run = %run,
                            factor,
                            "Killed run for exceeding {factor} times its cutoff of {cutoff}"
                        );
                    }
                    run.kill();
                }
            }
            if let Some(observer) = &observer {
                observer.current_status(runs);
            }
        });

        self.inner.evaluate(requests, Some(enforcing)).await
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunResult;
    use crate::services::decorators::test_support::{request, ScriptedEvaluator};

    #[tokio::test]
    async fn test_kills_run_past_factor() {
        // cutoff 10, factor 2, reported runtime 25
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0).with_running_view(25.0, 25.0));
        let evaluator = KillExceedingCaptimeEvaluator::new(inner, 2.0).unwrap();
        let outcomes = evaluator.evaluate(vec![request("a", 1)], None).await.unwrap();
        assert_eq!(outcomes[0].kind(), RunResult::Killed);
    }

    #[tokio::test]
    async fn test_leaves_run_within_factor() {
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0).with_running_view(15.0, 15.0));
        let evaluator = KillExceedingCaptimeEvaluator::new(inner, 2.0).unwrap();
        let outcomes = evaluator.evaluate(vec![request("a", 1)], None).await.unwrap();
        assert_eq!(outcomes[0].kind(), RunResult::Sat);
    }

    #[test]
    fn test_factor_must_exceed_one() {
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0));
        assert!(KillExceedingCaptimeEvaluator::new(inner.clone(), 1.0).is_err());
        assert!(KillExceedingCaptimeEvaluator::new(inner.clone(), f64::NAN).is_err());
        assert!(KillExceedingCaptimeEvaluator::new(inner, 1.5).is_ok());
    }
}
