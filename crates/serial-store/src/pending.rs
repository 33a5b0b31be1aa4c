//! FIFO of deferred work waiting for the store to become free.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ordered, thread-safe queue of deferred units.
///
/// Strict FIFO: no reordering, no priority, no deduplication and no
/// capacity bound. Units are never cancelled once enqueued; they are only
/// released by [`dequeue`](Self::dequeue) or by dropping the queue.
pub struct PendingQueue<T> {
    units: Mutex<VecDeque<T>>,
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self {
            units: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a unit at the tail and return the new length.
    pub fn enqueue(&self, unit: T) -> usize {
        let mut units = self.lock();
        units.push_back(unit);
        units.len()
    }

    /// Remove and return the head unit, or `None` when empty.
    pub fn dequeue(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panic while holding this lock cannot leave the deque half-updated.
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
