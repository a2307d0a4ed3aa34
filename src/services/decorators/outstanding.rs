//! Decorator counting batches and runs in flight.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::EvalResult;
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::{EvaluationCallback, Evaluator, ObserverHandle};
use crate::infrastructure::sync::InFlightCounter;

/// Tracks batches and runs in flight through the chain, for backends that
/// cannot report it themselves.
///
/// A submitted batch counts as outstanding until its callback has returned.
pub struct OutstandingEvaluationsEvaluator {
    inner: Arc<dyn Evaluator>,
    batches: InFlightCounter,
    runs: InFlightCounter,
}

impl OutstandingEvaluationsEvaluator {
    /// Count work passing through to `inner`.
    pub fn new(inner: Arc<dyn Evaluator>) -> Self {
        Self {
            inner,
            batches: InFlightCounter::new(),
            runs: InFlightCounter::new(),
        }
    }
}

#[async_trait]
impl Evaluator for OutstandingEvaluationsEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let _batch = self.batches.enter();
        let _runs = self.runs.enter_many(requests.len());
        self.inner.evaluate(requests, observer).await
    }

    fn submit(
        self: Arc<Self>,
        requests: Vec<RunRequest>,
        callback: EvaluationCallback,
        observer: Option<ObserverHandle>,
    ) {
        let batch = self.batches.enter();
        let runs = self.runs.enter_many(requests.len());
        let wrapped = EvaluationCallback::new(move |result| {
            callback.complete(result);
            drop(runs);
            drop(batch);
        });
        Arc::clone(&self.inner).submit(requests, wrapped, observer);
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }

    async fn wait_for_outstanding_evaluations(&self) -> EvalResult<()> {
        self.batches.wait_for_zero().await;
        Ok(())
    }

    fn outstanding_batches(&self) -> EvalResult<usize> {
        Ok(self.batches.current())
    }

    fn outstanding_runs(&self) -> EvalResult<usize> {
        Ok(self.runs.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunResult;
    use crate::services::decorators::test_support::{request, ScriptedEvaluator};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_counts_until_callback_returns() {
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0));
        let evaluator = Arc::new(OutstandingEvaluationsEvaluator::new(inner));
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (entered_tx, entered_rx) = oneshot::channel::<()>();

        let callback = EvaluationCallback::new(move |_| {
            let _ = entered_tx.send(());
            // hold the callback open until the test has looked at the counters
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        });
        Arc::clone(&evaluator).submit(vec![request("a", 1), request("a", 2)], callback, None);

        entered_rx.await.unwrap();
        assert_eq!(evaluator.outstanding_batches().unwrap(), 1);
        assert_eq!(evaluator.outstanding_runs().unwrap(), 2);

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), evaluator.wait_for_outstanding_evaluations())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(evaluator.outstanding_runs().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_evaluation_is_counted() {
        let observed = Arc::new(AtomicUsize::new(0));
        let evaluator = Arc::new(OutstandingEvaluationsEvaluator::new(Arc::new(
            ScriptedEvaluator::always(RunResult::Sat, 1.0).with_running_view(0.5, 0.5),
        )));
        let observer: ObserverHandle = {
            let observed = Arc::clone(&observed);
            let evaluator = Arc::clone(&evaluator);
            Arc::new(move |_: &[crate::domain::models::LiveRun]| {
                observed.store(evaluator.outstanding_batches().unwrap_or(0), Ordering::SeqCst);
            })
        };

        evaluator.evaluate(vec![request("a", 1)], Some(observer)).await.unwrap();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
        assert_eq!(evaluator.outstanding_batches().unwrap(), 0);
    }
}
