//! Write-behind task pipeline.
//!
//! Request handling submits [`Task`]s and returns immediately. A fixed
//! [`WorkerPool`] executes them; failures go to the [`RecoveryStore`];
//! the [`RetrySweeper`] puts them back on the queue every interval.

pub mod counter;
pub mod pool;
pub mod recovery;
pub mod sweeper;
pub mod task;

pub use counter::CompletionCounter;
pub use pool::{Submitter, WorkerPool};
pub use recovery::RecoveryStore;
pub use sweeper::RetrySweeper;
pub use task::{Task, TaskError, TaskOutcome, TaskRunner};

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Runtime constants for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Pause between recovery sweeps.
    pub retry_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            retry_interval: Duration::from_secs(3),
        }
    }
}

/// Worker pool, recovery store and sweeper wired together.
pub struct Pipeline {
    pool: WorkerPool,
    recovery: Arc<RecoveryStore>,
    sweeper: RetrySweeper,
    sweeper_join: Option<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, runner: Arc<dyn TaskRunner>) -> Self {
        let recovery = Arc::new(RecoveryStore::new());
        let pool = WorkerPool::new(config.workers, runner, Arc::clone(&recovery));
        let sweeper = RetrySweeper::new(
            Arc::clone(&recovery),
            pool.submitter(),
            config.retry_interval,
        );
        Self {
            pool,
            recovery,
            sweeper,
            sweeper_join: None,
        }
    }

    /// Spawn the workers and the sweeper loop.
    pub fn start(&mut self) {
        self.pool.start();
        if self.sweeper_join.is_none() {
            let sweeper = self.sweeper.clone();
            self.sweeper_join = Some(tokio::spawn(async move { sweeper.run().await }));
        }
    }

    pub fn submitter(&self) -> Submitter {
        self.pool.submitter()
    }

    pub fn recovery(&self) -> &Arc<RecoveryStore> {
        &self.recovery
    }

    pub fn sweeper(&self) -> &RetrySweeper {
        &self.sweeper
    }

    pub fn pending(&self) -> usize {
        self.pool.pending()
    }

    /// Wait for every submitted task to reach a terminal outcome.
    pub async fn drain(&self) {
        self.pool.drain().await;
    }

    /// Stop sweeping, drain the pool and stop the workers.
    ///
    /// Tasks still in the recovery store at this point are not retried
    /// again and are reported in the log.
    pub async fn shutdown(mut self) {
        self.sweeper.shutdown();
        if let Some(join) = self.sweeper_join.take() {
            if let Err(e) = join.await {
                error!("retry sweeper exited abnormally: {e}");
            }
        }
        self.pool.shutdown().await;

        let abandoned = self.recovery.len();
        if abandoned > 0 {
            warn!(abandoned, "pipeline stopped with tasks still awaiting retry");
        }
        info!("pipeline stopped");
    }
}
