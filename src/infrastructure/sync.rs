//! Small concurrency primitives shared by backends and decorators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counts units of in-flight work and lets callers wait for a zero crossing.
#[derive(Debug, Clone, Default)]
pub struct InFlightCounter {
    inner: Arc<CounterState>,
}

#[derive(Debug, Default)]
struct CounterState {
    count: AtomicUsize,
    zero: Notify,
}

/// Decrements its counter by `amount` when dropped.
#[derive(Debug)]
#[must_use = "the work is counted as finished when the guard is dropped"]
pub struct InFlightGuard {
    inner: Arc<CounterState>,
    amount: usize,
}

impl InFlightCounter {
    /// A counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one unit of work until the guard is dropped.
    pub fn enter(&self) -> InFlightGuard {
        self.enter_many(1)
    }

    /// Count `amount` units of work until the guard is dropped.
    pub fn enter_many(&self, amount: usize) -> InFlightGuard {
        self.inner.count.fetch_add(amount, Ordering::SeqCst);
        InFlightGuard {
            inner: Arc::clone(&self.inner),
            amount,
        }
    }

    /// Units currently in flight.
    pub fn current(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Resolve as soon as the count is observed at zero.
    ///
    /// This is a point-in-time check: work may be entered again immediately.
    pub async fn wait_for_zero(&self) {
        loop {
            let notified = self.inner.zero.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let previous = self.inner.count.fetch_sub(self.amount, Ordering::SeqCst);
        if previous == self.amount {
            self.inner.zero.notify_waiters();
        }
    }
}
