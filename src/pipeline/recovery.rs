//! Recovery store: failed tasks waiting for the next sweep.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::task::Task;

/// Holding area for tasks whose last execution failed.
///
/// Grows without bound while a dependency stays down; every failed task
/// accumulates here until the sweeper takes it.
#[derive(Debug, Default)]
pub struct RecoveryStore {
    tasks: Mutex<Vec<Task>>,
}

impl RecoveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, task: Task) {
        self.lock().push(task);
    }

    /// Empty the store and return everything it held.
    ///
    /// The swap happens under the lock: an append racing this call lands
    /// either in the returned batch or in the store for the next drain.
    pub fn drain_all(&self) -> Vec<Task> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the held tasks, for inspection.
    pub fn snapshot(&self) -> Vec<Task> {
        self.lock().clone()
    }

    // A panic while holding the lock cannot leave the Vec half-written.
    fn lock(&self) -> MutexGuard<'_, Vec<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
