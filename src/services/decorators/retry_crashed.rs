//! Decorator retrying crashed runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{RunOutcome, RunRequest, RunResult};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Re-evaluates `CRASHED` runs up to `retry_count` more times.
///
/// Retried outcomes are matched back to their slot by request identity.
/// `ABORT` is never retried.
pub struct RetryCrashedRunsEvaluator {
    inner: Arc<dyn Evaluator>,
    retry_count: u32,
    retried_runs: AtomicU64,
}

impl RetryCrashedRunsEvaluator {
    /// Retry each crashed run up to `retry_count` times.
    pub fn new(inner: Arc<dyn Evaluator>, retry_count: u32) -> Self {
        if inner.is_run_final() {
            warn!("Evaluator issues final runs, retrying crashed runs will not change them");
        }
        Self {
            inner,
            retry_count,
            retried_runs: AtomicU64::new(0),
        }
    }

    /// Number of individual retry attempts performed so far.
    pub fn retried_runs(&self) -> u64 {
        self.retried_runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for RetryCrashedRunsEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let mut outcomes = self.inner.evaluate(requests, observer.clone()).await?;

        for attempt in 1..=self.retry_count {
            let mut crashed: HashMap<RunRequest, Vec<usize>> = HashMap::new();
            for (index, outcome) in outcomes.iter().enumerate() {
                if outcome.kind() == RunResult::Crashed {
                    crashed.entry(outcome.request().clone()).or_default().push(index);
                }
            }
            if crashed.is_empty() {
                debug!("No crashed runs to retry");
                break;
            }

            info!(crashed = crashed.len(), attempt, "Retrying crashed runs");
            let retry: Vec<RunRequest> = crashed.keys().cloned().collect();
            self.retried_runs.fetch_add(retry.len() as u64, Ordering::SeqCst);

            let retried = self.inner.evaluate(retry.clone(), observer.clone()).await?;
            if retried.len() != retry.len() {
                return Err(EvaluatorError::OutcomeCount {
                    requested: retry.len(),
                    received: retried.len(),
                });
            }
            for outcome in retried {
                if let Some(indices) = crashed.get(outcome.request()) {
                    for &index in indices {
                        outcomes[index] = outcome.clone();
                    }
                }
            }
        }

        Ok(outcomes)
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}
