//! Decorator failing the session when its first run crashes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{RunOutcome, RunRequest, RunResult};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Fails if the very first run to complete crashed. Later crashes pass through.
pub struct AbortOnFirstRunCrashEvaluator {
    inner: Arc<dyn Evaluator>,
    first_run_checked: AtomicBool,
}

impl AbortOnFirstRunCrashEvaluator {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn Evaluator>) -> Self {
        Self {
            inner,
            first_run_checked: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Evaluator for AbortOnFirstRunCrashEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let outcomes = self.inner.evaluate(requests, observer).await?;
        let Some(first) = outcomes.first() else {
            return Ok(outcomes);
        };
        if !self.first_run_checked.swap(true, Ordering::SeqCst) && first.kind() == RunResult::Crashed {
            return Err(EvaluatorError::FirstRunCrashed(first.to_string()));
        }
        Ok(outcomes)
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::decorators::test_support::{request, ScriptedEvaluator};

    #[tokio::test]
    async fn test_only_first_run_is_checked() {
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Crashed, 1.0));
        let evaluator = AbortOnFirstRunCrashEvaluator::new(inner);

        // empty batches do not count as the first run
        assert!(evaluator.evaluate(vec![], None).await.unwrap().is_empty());

        let first = evaluator.evaluate(vec![request("a", 1)], None).await;
        assert!(matches!(first, Err(EvaluatorError::FirstRunCrashed(_))));

        let second = evaluator.evaluate(vec![request("a", 2)], None).await.unwrap();
        assert_eq!(second[0].kind(), RunResult::Crashed);
    }

    #[tokio::test]
    async fn test_successful_first_run_disarms() {
        let inner = Arc::new(ScriptedEvaluator::new(|req| {
            let kind = if req.seed() == 1 { RunResult::Sat } else { RunResult::Crashed };
            crate::services::decorators::test_support::outcome(req, kind, 1.0)
        }));
        let evaluator = AbortOnFirstRunCrashEvaluator::new(inner);

        evaluator.evaluate(vec![request("a", 1)], None).await.unwrap();
        assert!(evaluator.evaluate(vec![request("a", 2)], None).await.is_ok());
    }
}
