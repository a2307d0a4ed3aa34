//! Decorator failing the batch on any crashed run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{RunOutcome, RunRequest, RunResult};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Treats every `CRASHED` outcome as fatal.
pub struct AbortOnCrashEvaluator {
    inner: Arc<dyn Evaluator>,
}

impl AbortOnCrashEvaluator {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn Evaluator>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Evaluator for AbortOnCrashEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let outcomes = self.inner.evaluate(requests, observer).await?;
        if let Some(crashed) = outcomes.iter().find(|o| o.kind() == RunResult::Crashed) {
            return Err(EvaluatorError::RunCrashed(crashed.to_string()));
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
    use crate::domain::ports::EvaluationCallback;
    use crate::services::decorators::test_support::{outcome, request, ScriptedEvaluator};

    #[tokio::test]
    async fn test_any_crash_is_fatal() {
        let inner = Arc::new(ScriptedEvaluator::new(|req| {
            let kind = if req.seed() == 3 { RunResult::Crashed } else { RunResult::Sat };
            outcome(req, kind, 1.0)
        }));
        let evaluator = AbortOnCrashEvaluator::new(inner);

        let ok = evaluator.evaluate(vec![request("a", 1)], None).await;
        assert!(ok.is_ok());

        let err = evaluator
            .evaluate(vec![request("a", 2), request("a", 3)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::RunCrashed(_)));
    }

    #[tokio::test]
    async fn test_async_path_reports_failure() {
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Crashed, 1.0));
        let evaluator: Arc<dyn Evaluator> = Arc::new(AbortOnCrashEvaluator::new(inner));

        let (callback, receiver) = EvaluationCallback::channel();
        evaluator.submit(vec![request("a", 1)], callback, None);
        let result = receiver.await.unwrap();
        assert!(matches!(result, Err(EvaluatorError::RunCrashed(_))));
    }
}
