//! Decorator checking that instances are decided consistently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::error;

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{ProblemInstance, RunOutcome, RunRequest, RunResult};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Checks that every instance is always decided the same way.
///
/// The first decided result per instance is remembered; a later opposite
/// decision is logged and, when `fail_on_inconsistency` is set, fails the batch.
pub struct SatConsistencyEvaluator {
    inner: Arc<dyn Evaluator>,
    decided: Mutex<HashMap<ProblemInstance, RunResult>>,
    fail_on_inconsistency: bool,
}

impl SatConsistencyEvaluator {
    /// Fail the batch on a discrepancy when `fail_on_inconsistency` is set.
    pub fn new(inner: Arc<dyn Evaluator>, fail_on_inconsistency: bool) -> Self {
        Self {
            inner,
            decided: Mutex::new(HashMap::new()),
            fail_on_inconsistency,
        }
    }

    fn check(&self, outcomes: &[RunOutcome]) -> EvalResult<()> {
        let mut decided = self.decided.lock().unwrap_or_else(PoisonError::into_inner);
        for outcome in outcomes.iter().filter(|o| o.kind().is_decided()) {
            let instance = outcome.request().instance();
            let previous = *decided.entry(instance.clone()).or_insert_with(|| outcome.kind());
            if previous == outcome.kind() {
                continue;
            }

            error!(
                instance = %instance.name,
                previous = %previous,
                current = %outcome.kind(),
                "SAT/UNSAT discrepancy detected on problem instance"
            );
            if self.fail_on_inconsistency {
                return Err(EvaluatorError::SatInconsistency {
                    instance: instance.name.clone(),
                    previous: previous.to_string(),
                    current: outcome.kind().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Evaluator for SatConsistencyEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let outcomes = self.inner.evaluate(requests, observer).await?;
        self.check(&outcomes)?;
        Ok(outcomes)
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::decorators::test_support::{outcome, request, ScriptedEvaluator};

    fn alternating() -> Arc<ScriptedEvaluator> {
        Arc::new(ScriptedEvaluator::new(|req| {
            let kind = if req.seed() % 2 == 0 { RunResult::Unsat } else { RunResult::Sat };
            outcome(req, kind, 1.0)
        }))
    }

    #[tokio::test]
    async fn test_strict_mode_raises() {
        let evaluator = SatConsistencyEvaluator::new(alternating(), true);
        evaluator.evaluate(vec![request("x", 1)], None).await.unwrap();

        let err = evaluator.evaluate(vec![request("x", 2)], None).await.unwrap_err();
        match err {
            EvaluatorError::SatInconsistency { instance, previous, current } => {
                assert_eq!(instance, "x");
                assert_eq!(previous, "SAT");
                assert_eq!(current, "UNSAT");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_lenient_mode_only_logs() {
        let evaluator = SatConsistencyEvaluator::new(alternating(), false);
        evaluator.evaluate(vec![request("x", 1)], None).await.unwrap();
        let outcomes = evaluator.evaluate(vec![request("x", 2)], None).await.unwrap();
        assert_eq!(outcomes[0].kind(), RunResult::Unsat);
    }

    #[tokio::test]
    async fn test_different_instances_are_independent() {
        let evaluator = SatConsistencyEvaluator::new(alternating(), true);
        evaluator.evaluate(vec![request("x", 1)], None).await.unwrap();
        assert!(evaluator.evaluate(vec![request("y", 2)], None).await.is_ok());
    }
}
