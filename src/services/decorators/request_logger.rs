//! Decorator logging requests and outcomes.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::EvalResult;
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Logs every request of a batch, and its outcome, at DEBUG.
pub struct RequestLoggingEvaluator {
    inner: Arc<dyn Evaluator>,
    requests_only: bool,
}

impl RequestLoggingEvaluator {
    /// Log only requests when `requests_only` is set.
    pub fn new(inner: Arc<dyn Evaluator>, requests_only: bool) -> Self {
        Self { inner, requests_only }
    }
}

#[async_trait]
impl Evaluator for RequestLoggingEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let batch_id = Uuid::new_v4();
        for (index, request) in requests.iter().enumerate() {
            debug!(%batch_id, index, run = %request, "Run Scheduled");
        }

        let started = Instant::now();
        let result = self.inner.evaluate(requests, observer).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(outcomes) if self.requests_only => {
                debug!(%batch_id, runs = outcomes.len(), elapsed, "Batch Completed");
            }
            Ok(outcomes) => {
                for (index, outcome) in outcomes.iter().enumerate() {
                    debug!(%batch_id, index, outcome = %outcome, "Run Completed");
                }
            }
            Err(err) => warn!(%batch_id, error = %err, elapsed, "Batch failed"),
        }
        result
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}
