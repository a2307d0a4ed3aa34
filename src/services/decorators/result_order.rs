//! Decorator checking outcome alignment.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Verifies that outcomes come back index-aligned with their requests.
pub struct ResultOrderCheckEvaluator {
    inner: Arc<dyn Evaluator>,
}

impl ResultOrderCheckEvaluator {
    /// Check every batch `inner` returns.
    pub fn new(inner: Arc<dyn Evaluator>) -> Self {
        Self { inner }
    }
}

fn check_order(requests: &[RunRequest], outcomes: &[RunOutcome]) -> EvalResult<()> {
    if requests.len() != outcomes.len() {
        return Err(EvaluatorError::OutcomeCount {
            requested: requests.len(),
            received: outcomes.len(),
        });
    }
    for (index, (request, outcome)) in requests.iter().zip(outcomes).enumerate() {
        if outcome.request() != request {
            error!(index, expected = %request, actual = %outcome.request(), "Outcome order violated");
            return Err(EvaluatorError::ResultOrder {
                index,
                expected: request.to_string(),
                actual: outcome.request().to_string(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl Evaluator for ResultOrderCheckEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let outcomes = self.inner.evaluate(requests.clone(), observer).await?;
        check_order(&requests, &outcomes)?;
        Ok(outcomes)
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunResult;
    use crate::services::decorators::test_support::{outcome, request, ScriptedEvaluator};

    /// Inner evaluator that answers in reverse order.
    struct Reversing;

    #[async_trait]
    impl Evaluator for Reversing {
        async fn evaluate(
            &self,
            requests: Vec<RunRequest>,
            _observer: Option<ObserverHandle>,
        ) -> EvalResult<Vec<RunOutcome>> {
            Ok(requests.iter().rev().map(|r| outcome(r, RunResult::Sat, 1.0)).collect())
        }
    }

    #[tokio::test]
    async fn test_reordered_results_rejected() {
        let evaluator = ResultOrderCheckEvaluator::new(Arc::new(Reversing));
        let err = evaluator
            .evaluate(vec![request("a", 1), request("a", 2)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::ResultOrder { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_ordered_results_pass() {
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0));
        let evaluator = ResultOrderCheckEvaluator::new(inner);
        let outcomes = evaluator
            .evaluate(vec![request("a", 1), request("b", 1)], None)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
    }
}
