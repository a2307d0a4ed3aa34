//! Evaluator port: the pluggable abstraction every backend and policy
//! decorator implements.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::ObserverHandle;

type Handler = Box<dyn FnOnce(EvalResult<Vec<RunOutcome>>) + Send>;

/// Completion handler for an asynchronous submission.
///
/// Consumed when invoked, so it fires at most once. If it is dropped without
/// being invoked it fires with [`EvaluatorError::CallbackDropped`], so a
/// submitter is never left waiting.
pub struct EvaluationCallback {
    handler: Option<Handler>,
}

impl EvaluationCallback {
    /// Wrap a handler receiving the result of the batch.
    pub fn new(handler: impl FnOnce(EvalResult<Vec<RunOutcome>>) + Send + 'static) -> Self {
        Self {
            handler: Some(Box::new(handler)),
        }
    }

    /// Build a callback from separate success and failure handlers.
    pub fn from_handlers(
        on_success: impl FnOnce(Vec<RunOutcome>) + Send + 'static,
        on_failure: impl FnOnce(EvaluatorError) + Send + 'static,
    ) -> Self {
        Self::new(move |result| match result {
            Ok(outcomes) => on_success(outcomes),
            Err(err) => on_failure(err),
        })
    }

    /// A callback paired with a receiver for its result.
    pub fn channel() -> (Self, oneshot::Receiver<EvalResult<Vec<RunOutcome>>>) {
        let (tx, rx) = oneshot::channel();
        let callback = Self::new(move |result| {
            // the receiver may have given up waiting
            let _ = tx.send(result);
        });
        (callback, rx)
    }

    /// Complete with outcomes.
    pub fn on_success(self, outcomes: Vec<RunOutcome>) {
        self.complete(Ok(outcomes));
    }

    /// Complete with an error.
    pub fn on_failure(self, error: EvaluatorError) {
        self.complete(Err(error));
    }

    /// Complete with a result.
    pub fn complete(mut self, result: EvalResult<Vec<RunOutcome>>) {
        if let Some(handler) = self.handler.take() {
            handler(result);
        }
    }
}

impl Drop for EvaluationCallback {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler(Err(EvaluatorError::CallbackDropped));
        }
    }
}

impl fmt::Debug for EvaluationCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationCallback")
            .field("pending", &self.handler.is_some())
            .finish()
    }
}

/// Derive a synchronous evaluation from an asynchronous submission.
pub async fn evaluate_via_submit<F>(submit: F) -> EvalResult<Vec<RunOutcome>>
where
    F: FnOnce(EvaluationCallback),
{
    let (callback, receiver) = EvaluationCallback::channel();
    submit(callback);
    receiver
        .await
        .unwrap_or(Err(EvaluatorError::CallbackDropped))
}

/// Evaluates run requests against a target algorithm.
///
/// Backends implement [`Evaluator::evaluate`]; [`Evaluator::submit`] is
/// derived from it by running the evaluation on a spawned task. Decorators
/// return the evaluator they wrap from [`Evaluator::inner`], and every
/// method they do not override is forwarded to it.
///
/// `submit` must be called from within a Tokio runtime.
#[async_trait]
pub trait Evaluator: Send + Sync + 'static {
    /// Evaluate a batch, returning outcomes index-aligned with `requests`.
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>>;

    /// Evaluate a batch in the background. `callback` fires exactly once.
    fn submit(
        self: Arc<Self>,
        requests: Vec<RunRequest>,
        callback: EvaluationCallback,
        observer: Option<ObserverHandle>,
    ) {
        tokio::spawn(async move {
            let result = self.evaluate(requests, observer).await;
            callback.complete(result);
        });
    }

    /// The evaluator this one wraps, if it is a decorator.
    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        None
    }

    /// Wait until the number of in-flight batches is momentarily zero.
    ///
    /// New work may start as soon as this returns.
    async fn wait_for_outstanding_evaluations(&self) -> EvalResult<()> {
        match self.inner() {
            Some(inner) => inner.wait_for_outstanding_evaluations().await,
            None => Err(EvaluatorError::Unsupported("waiting for outstanding evaluations")),
        }
    }

    /// Number of batches currently in flight.
    fn outstanding_batches(&self) -> EvalResult<usize> {
        self.inner().map_or(
            Err(EvaluatorError::Unsupported("outstanding batch count")),
            |inner| inner.outstanding_batches(),
        )
    }

    /// Number of runs currently in flight.
    fn outstanding_runs(&self) -> EvalResult<usize> {
        self.inner().map_or(
            Err(EvaluatorError::Unsupported("outstanding run count")),
            |inner| inner.outstanding_runs(),
        )
    }

    /// Total number of runs performed by the backend.
    fn run_count(&self) -> u64 {
        self.inner().map_or(0, |inner| inner.run_count())
    }

    /// Whether outcomes are final and should never be re-evaluated.
    fn is_run_final(&self) -> bool {
        self.inner().is_some_and(|inner| inner.is_run_final())
    }

    /// Whether observers receive live snapshots.
    fn are_runs_observable(&self) -> bool {
        self.inner().is_some_and(|inner| inner.are_runs_observable())
    }

    /// Whether outcomes are persisted outside this process.
    fn are_runs_persisted(&self) -> bool {
        self.inner().is_some_and(|inner| inner.are_runs_persisted())
    }

    /// Release every resource held by the chain. Must reach the base backend.
    async fn shutdown(&self) {
        if let Some(inner) = self.inner() {
            inner.shutdown().await;
        }
    }
}
