//! Retry sweeper: periodically re-submits everything in the recovery store.
//!
//! Fixed interval, no backoff, no retry cap, no jitter. A dependency that
//! stays down produces one resubmission wave per interval for as long as
//! it is down.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::pool::Submitter;
use super::recovery::RecoveryStore;
use crate::telemetry::metrics;

pub struct RetrySweeper {
    recovery: Arc<RecoveryStore>,
    submitter: Submitter,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Clone for RetrySweeper {
    fn clone(&self) -> Self {
        Self {
            recovery: Arc::clone(&self.recovery),
            submitter: self.submitter.clone(),
            interval: self.interval,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl RetrySweeper {
    pub fn new(recovery: Arc<RecoveryStore>, submitter: Submitter, interval: Duration) -> Self {
        Self {
            recovery,
            submitter,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the sweeper loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Sweep every `interval` until shutdown.
    pub async fn run(&self) {
        info!(interval_ms = self.interval.as_millis() as u64, "retry sweeper started");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("retry sweeper shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
            self.sweep_once();
        }
    }

    /// Drain the recovery store and re-submit every task. Returns how many
    /// tasks went back on the queue.
    pub fn sweep_once(&self) -> usize {
        let tasks = self.recovery.drain_all();
        if tasks.is_empty() {
            debug!("recovery store empty");
            return 0;
        }

        let count = tasks.len();
        info!(pending = count, "rerunning {count} pending task(s)");
        for task in tasks {
            let kind = task.kind();
            self.submitter.submit(task);
            metrics::recovery_resubmitted().add(1, &[KeyValue::new("kind", kind)]);
        }
        count
    }
}
