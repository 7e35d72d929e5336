//! Completion counter: in-flight task accounting with a drain wait.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counts tasks that were submitted but have not reached a terminal
/// outcome. A task that failed into the recovery store counts as
/// terminal for this submission.
#[derive(Debug, Default)]
pub struct CompletionCounter {
    pending: AtomicUsize,
    zero: Notify,
}

impl CompletionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrement(&self) {
        let previous = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "completion counter underflow");
        if previous == 1 {
            self.zero.notify_waiters();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until every counted task has reached a terminal outcome.
    pub async fn wait_zero(&self) {
        loop {
            let notified = self.zero.notified();
            tokio::pin!(notified);
            // Register before checking so a decrement in between is not missed.
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
