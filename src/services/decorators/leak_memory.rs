//! Decorator retaining memory per completed run.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::warn;

use crate::domain::errors::EvalResult;
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Debug aid that retains `amount` bytes for every completed run, to
/// exercise memory pressure handling in long configuration runs.
pub struct LeakMemoryEvaluator {
    inner: Arc<dyn Evaluator>,
    amount: usize,
    leaked: Mutex<Vec<Box<[u8]>>>,
}

impl LeakMemoryEvaluator {
    /// Leak `amount` bytes per completed run.
    pub fn new(inner: Arc<dyn Evaluator>, amount: usize) -> Self {
        warn!(bytes_per_run = amount, "Evaluator will leak memory for every run");
        Self {
            inner,
            amount,
            leaked: Mutex::new(Vec::new()),
        }
    }

    /// Bytes retained so far.
    pub fn leaked_bytes(&self) -> usize {
        self.leaked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|block| block.len())
            .sum()
    }
}

#[async_trait]
impl Evaluator for LeakMemoryEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let outcomes = self.inner.evaluate(requests, observer).await?;
        {
            let mut leaked = self.leaked.lock().unwrap_or_else(PoisonError::into_inner);
            leaked.extend(outcomes.iter().map(|_| vec![1_u8; self.amount].into_boxed_slice()));
            warn!(total_bytes = leaked.len() * self.amount, "Leaking memory");
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
    use crate::domain::models::RunResult;
    use crate::services::decorators::test_support::{request, ScriptedEvaluator};

    #[tokio::test]
    async fn test_retains_memory_per_run() {
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0));
        let evaluator = LeakMemoryEvaluator::new(inner, 64);
        evaluator
            .evaluate(vec![request("a", 1), request("a", 2)], None)
            .await
            .unwrap();
        assert_eq!(evaluator.leaked_bytes(), 128);
    }
}
