//! Observer port for live run snapshots.

use std::sync::Arc;

use crate::domain::models::LiveRun;

/// Subscriber to periodic snapshots of in-flight runs.
///
/// Snapshots are handed over by reference and must not be retained past the
/// call; a subscriber affects runs only through [`LiveRun::kill`].
pub trait RunObserver: Send + Sync {
    /// Called with the current state of every run in a batch, in request order.
    fn current_status(&self, runs: &[LiveRun]);
}

impl<F> RunObserver for F
where
    F: Fn(&[LiveRun]) + Send + Sync,
{
    fn current_status(&self, runs: &[LiveRun]) {
        self(runs);
    }
}

/// Shared observer handle threaded through the evaluator chain.
pub type ObserverHandle = Arc<dyn RunObserver>;

/// Deliver a snapshot to an optional observer.
pub fn notify_observer(observer: Option<&ObserverHandle>, runs: &[LiveRun]) {
    if let Some(observer) = observer {
        observer.current_status(runs);
    }
}
