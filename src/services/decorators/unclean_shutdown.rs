//! Decorator detecting missing or repeated shutdowns.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::domain::errors::EvalResult;
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Reports evaluators that are dropped without being shut down, and
/// shutdowns that happen more than once.
pub struct UncleanShutdownDetector {
    inner: Arc<dyn Evaluator>,
    shutdowns: AtomicU32,
}

impl UncleanShutdownDetector {
    /// Watch `inner` for shutdown misuse.
    pub fn new(inner: Arc<dyn Evaluator>) -> Self {
        Self {
            inner,
            shutdowns: AtomicU32::new(0),
        }
    }

    /// Shutdowns seen so far.
    pub fn shutdown_count(&self) -> u32 {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for UncleanShutdownDetector {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        self.inner.evaluate(requests, observer).await
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }

    async fn shutdown(&self) {
        let previous = self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if previous > 0 {
            warn!(count = previous + 1, "Evaluator shut down more than once");
        } else {
            debug!("Evaluator shut down cleanly");
        }
        self.inner.shutdown().await;
    }
}

impl Drop for UncleanShutdownDetector {
    fn drop(&mut self) {
        if self.shutdowns.load(Ordering::SeqCst) == 0 {
            error!(
                "Evaluator was dropped without being shut down; target algorithm processes or \
                 worker tasks may have been left behind"
            );
        }
    }
}
