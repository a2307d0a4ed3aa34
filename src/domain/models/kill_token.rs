//! Cancellation tokens for individual runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cooperative cancellation handle for one run.
///
/// Clones share state. Triggering is idempotent and safe from any thread at
/// any time, including after the run has finished.
#[derive(Debug, Clone, Default)]
pub struct KillToken {
    inner: Arc<KillState>,
}

#[derive(Debug, Default)]
struct KillState {
    killed: AtomicBool,
    notify: Notify,
}

impl KillToken {
    /// A token that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination. Returns `true` only for the call that flipped the flag.
    pub fn kill(&self) -> bool {
        let first = !self.inner.killed.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether termination has been requested.
    pub fn is_killed(&self) -> bool {
        self.inner.killed.load(Ordering::SeqCst)
    }

    /// Resolves once the token has been triggered.
    pub async fn killed(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_killed() {
                return;
            }
            notified.await;
        }
    }
}
