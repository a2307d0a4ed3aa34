//! Decorator rejecting batches with repeated requests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Rejects (or reports) batches that contain the same request twice.
pub struct DuplicateCheckEvaluator {
    inner: Arc<dyn Evaluator>,
    fail_on_duplicates: bool,
}

impl DuplicateCheckEvaluator {
    /// Fail on duplicates when `fail_on_duplicates` is set, otherwise only log them.
    pub fn new(inner: Arc<dyn Evaluator>, fail_on_duplicates: bool) -> Self {
        Self {
            inner,
            fail_on_duplicates,
        }
    }
}

/// Every request that appears more than once, each listed once.
fn duplicates(requests: &[RunRequest]) -> Vec<RunRequest> {
    let mut seen = HashSet::with_capacity(requests.len());
    let mut reported = HashSet::new();
    requests
        .iter()
        .filter(|request| !seen.insert(*request) && reported.insert(*request))
        .cloned()
        .collect()
}

#[async_trait]
impl Evaluator for DuplicateCheckEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let duplicated = duplicates(&requests);
        if !duplicated.is_empty() {
            let err = EvaluatorError::DuplicateRequests(duplicated);
            if self.fail_on_duplicates {
                return Err(err);
            }
            error!(error = %err, "Duplicate requests in batch, evaluating anyway");
        }
        self.inner.evaluate(requests, observer).await
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}
