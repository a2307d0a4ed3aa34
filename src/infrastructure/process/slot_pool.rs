//! Concurrency slots handed to running processes.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::errors::{EvalResult, EvaluatorError};

/// Fixed pool of concurrency slots, identified by `0..size`.
///
/// Each running process holds one slot; its id is handed to the wrapper so
/// concurrent runs can avoid clobbering each other's scratch files.
#[derive(Debug, Clone)]
pub struct SlotPool {
    permits: Arc<Semaphore>,
    free_ids: Arc<Mutex<Vec<usize>>>,
}

/// A held slot. Returned to the pool when dropped, including on cancellation.
#[derive(Debug)]
pub struct Slot {
    id: usize,
    free_ids: Arc<Mutex<Vec<usize>>>,
    _permit: OwnedSemaphorePermit,
}

impl SlotPool {
    /// A pool of `size` free slots.
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            free_ids: Arc::new(Mutex::new((0..size).rev().collect())),
        }
    }

    /// Wait for a free slot. Fails once the pool has been closed.
    pub async fn acquire(&self) -> EvalResult<Slot> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| EvaluatorError::Shutdown)?;

        let id = self
            .free_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or_else(|| EvaluatorError::Abort("slot pool has a permit but no free id".to_string()))?;

        Ok(Slot {
            id,
            free_ids: Arc::clone(&self.free_ids),
            _permit: permit,
        })
    }

    /// Wake every waiter with an error and refuse further acquisitions.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Slot {
    /// Slot id, passed to the wrapper.
    pub const fn id(&self) -> usize {
        self.id
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // the id goes back before the permit field is dropped
        self.free_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.id);
    }
}
