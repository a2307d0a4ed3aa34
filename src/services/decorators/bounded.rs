//! Decorator bounding the number of runs in flight.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{KillToken, LiveRun, RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Limits how many runs are in the wrapped evaluator at once, across all
/// batches.
///
/// Each run is forwarded as its own single-run batch once a permit is free.
/// The observer sees one merged, index-aligned view of the whole batch; runs
/// still waiting for a permit appear as `RUNNING` with zero runtime and may
/// be killed before they start.
pub struct BoundedEvaluator {
    inner: Arc<dyn Evaluator>,
    permits: Arc<Semaphore>,
    limit: usize,
}

/// Merged snapshot of a bounded batch.
struct MergedView {
    runs: Mutex<Vec<LiveRun>>,
    observer: Option<ObserverHandle>,
}

impl MergedView {
    fn update(&self, index: usize, live: &LiveRun, token: &KillToken) {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = runs.get_mut(index) {
            if !entry.is_running() && live.is_running() {
                return;
            }
            // kills requested on the merged view must reach the real run
            if token.is_killed() {
                live.kill();
            }
            *entry = live.clone();
        }
        if let Some(observer) = &self.observer {
            observer.current_status(&runs);
        }
    }
}

impl BoundedEvaluator {
    /// Fails when `limit` is zero.
    pub fn new(inner: Arc<dyn Evaluator>, limit: usize) -> EvalResult<Self> {
        if limit == 0 {
            return Err(EvaluatorError::InvalidConfiguration(
                "max_concurrent_algo_execs must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            inner,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        })
    }

    /// Maximum runs in flight.
    pub const fn limit(&self) -> usize {
        self.limit
    }

    async fn run_one(
        &self,
        index: usize,
        request: RunRequest,
        token: KillToken,
        view: Arc<MergedView>,
    ) -> EvalResult<RunOutcome> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EvaluatorError::Shutdown)?;

        if token.is_killed() {
            debug!(run = %request, "Run killed before it was dispatched");
            let outcome = RunOutcome::killed(request, 0.0);
            view.update(index, &LiveRun::completed(outcome.clone(), token.clone()), &token);
            return Ok(outcome);
        }

        let forward: ObserverHandle = {
            let view = Arc::clone(&view);
            let token = token.clone();
            Arc::new(move |runs: &[LiveRun]| {
                if let Some(live) = runs.first() {
                    view.update(index, live, &token);
                }
            })
        };

        trace!(run = %request, "Dispatching bounded run");
        let mut outcomes = self.inner.evaluate(vec![request], Some(forward)).await?;
        match outcomes.pop() {
            Some(outcome) if outcomes.is_empty() => {
                view.update(index, &LiveRun::completed(outcome.clone(), token.clone()), &token);
                Ok(outcome)
            }
            other => Err(EvaluatorError::OutcomeCount {
                requested: 1,
                received: outcomes.len() + usize::from(other.is_some()),
            }),
        }
    }
}

#[async_trait]
impl Evaluator for BoundedEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let tokens: Vec<KillToken> = requests.iter().map(|_| KillToken::new()).collect();
        let view = Arc::new(MergedView {
            runs: Mutex::new(
                requests
                    .iter()
                    .zip(&tokens)
                    .map(|(request, token)| LiveRun::running(request.clone(), 0.0, 0.0, token.clone()))
                    .collect(),
            ),
            observer,
        });

        let runs = requests
            .into_iter()
            .zip(tokens)
            .enumerate()
            .map(|(index, (request, token))| self.run_one(index, request, token, Arc::clone(&view)));

        try_join_all(runs).await
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }

    async fn shutdown(&self) {
        self.permits.close();
        self.inner.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunResult;
    use crate::domain::ports::notify_observer;
    use crate::services::decorators::test_support::{outcome, request};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Inner evaluator that records its peak concurrency.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Evaluator for Gauge {
        async fn evaluate(
            &self,
            requests: Vec<RunRequest>,
            observer: Option<ObserverHandle>,
        ) -> EvalResult<Vec<RunOutcome>> {
            let now = self.current.fetch_add(requests.len(), Ordering::SeqCst) + requests.len();
            self.peak.fetch_max(now, Ordering::SeqCst);
            let views: Vec<LiveRun> = requests
                .iter()
                .map(|r| LiveRun::running(r.clone(), 0.1, 0.1, KillToken::new()))
                .collect();
            notify_observer(observer.as_ref(), &views);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(requests.len(), Ordering::SeqCst);
            Ok(requests.iter().map(|r| outcome(r, RunResult::Sat, 0.1)).collect())
        }
    }

    #[tokio::test]
    async fn test_bound_and_order() {
        let inner = Arc::new(Gauge::default());
        let bounded = BoundedEvaluator::new(inner.clone(), 2).unwrap();

        let requests: Vec<RunRequest> = (0..6).map(|seed| request("a", seed)).collect();
        let outcomes = bounded.evaluate(requests.clone(), None).await.unwrap();

        assert!(inner.peak.load(Ordering::SeqCst) <= 2);
        for (req, out) in requests.iter().zip(&outcomes) {
            assert_eq!(out.request(), req);
        }
    }

    #[tokio::test]
    async fn test_merged_view_covers_whole_batch() {
        let inner = Arc::new(Gauge::default());
        let bounded = BoundedEvaluator::new(inner, 1).unwrap();
        let widths = Arc::new(Mutex::new(Vec::new()));
        let observer: ObserverHandle = {
            let widths = Arc::clone(&widths);
            Arc::new(move |runs: &[LiveRun]| widths.lock().unwrap().push(runs.len()))
        };

        bounded
            .evaluate(vec![request("a", 1), request("a", 2), request("a", 3)], Some(observer))
            .await
            .unwrap();

        let widths = widths.lock().unwrap();
        assert!(!widths.is_empty());
        assert!(widths.iter().all(|&w| w == 3));
    }

    #[tokio::test]
    async fn test_queued_run_killed_before_dispatch() {
        let inner = Arc::new(Gauge::default());
        let bounded = BoundedEvaluator::new(inner, 1).unwrap();
        let observer: ObserverHandle = Arc::new(|runs: &[LiveRun]| {
            for run in runs.iter().filter(|run| run.request().seed() == 2) {
                run.kill();
            }
        });

        let outcomes = bounded
            .evaluate(vec![request("a", 1), request("a", 2)], Some(observer))
            .await
            .unwrap();
        assert_eq!(outcomes[0].kind(), RunResult::Sat);
        assert_eq!(outcomes[1].kind(), RunResult::Killed);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let inner = Arc::new(Gauge::default());
        assert!(BoundedEvaluator::new(inner, 0).is_err());
    }
}
