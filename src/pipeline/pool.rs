//! Worker pool: N executors draining one shared task queue.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use super::counter::CompletionCounter;
use super::recovery::RecoveryStore;
use super::task::{Task, TaskError, TaskRunner};
use crate::telemetry::metrics;
use crate::telemetry::task::{record_task_outcome, start_task_span};

type TaskQueue = Arc<Mutex<mpsc::UnboundedReceiver<Task>>>;

/// Cloneable handle for placing tasks on the pool's queue.
#[derive(Debug, Clone)]
pub struct Submitter {
    tx: mpsc::UnboundedSender<Task>,
    counter: Arc<CompletionCounter>,
}

impl Submitter {
    /// Count the task and enqueue it. Returns once the task is queued, not
    /// once it has run.
    pub fn submit(&self, task: Task) {
        let kind = task.kind();
        self.counter.increment();
        if let Err(mpsc::error::SendError(task)) = self.tx.send(task) {
            // Only reachable after the pool was shut down.
            self.counter.decrement();
            error!(
                task.kind = kind,
                task.subject = %task.subject(),
                "task queue closed, task dropped"
            );
            return;
        }
        metrics::tasks_submitted().add(1, &[KeyValue::new("kind", kind)]);
    }

    pub fn counter(&self) -> &Arc<CompletionCounter> {
        &self.counter
    }
}

/// Fixed-size set of workers. Failed tasks go to the recovery store; a
/// failure never stops the worker that saw it.
pub struct WorkerPool {
    submitter: Submitter,
    queue: TaskQueue,
    runner: Arc<dyn TaskRunner>,
    recovery: Arc<RecoveryStore>,
    workers: usize,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Build the pool. No worker runs until [`WorkerPool::start`].
    pub fn new(workers: usize, runner: Arc<dyn TaskRunner>, recovery: Arc<RecoveryStore>) -> Self {
        let workers = if workers == 0 {
            warn!("worker pool configured with 0 workers, using 1");
            1
        } else {
            workers
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            submitter: Submitter {
                tx,
                counter: Arc::new(CompletionCounter::new()),
            },
            queue: Arc::new(Mutex::new(rx)),
            runner,
            recovery,
            workers,
            shutdown_tx,
            joins: Vec::new(),
        }
    }

    /// Spawn the workers. Calling it again on a running pool does nothing.
    pub fn start(&mut self) {
        if !self.joins.is_empty() {
            return;
        }
        for worker_id in 0..self.workers {
            let worker = Worker {
                id: worker_id,
                queue: Arc::clone(&self.queue),
                runner: Arc::clone(&self.runner),
                recovery: Arc::clone(&self.recovery),
                counter: Arc::clone(&self.submitter.counter),
            };
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.joins.push(tokio::spawn(worker.run(shutdown_rx)));
        }
        info!(workers = self.workers, "worker pool started");
    }

    pub fn submit(&self, task: Task) {
        self.submitter.submit(task);
    }

    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tasks submitted but not yet at a terminal outcome.
    pub fn pending(&self) -> usize {
        self.submitter.counter.pending()
    }

    /// Wait until every submitted task has succeeded or been handed to the
    /// recovery store.
    pub async fn drain(&self) {
        self.submitter.counter.wait_zero().await;
    }

    /// Drain, then stop the workers. In-flight tasks always finish.
    pub async fn shutdown(self) {
        self.drain().await;
        // ignore send error: workers may already be gone
        let _ = self.shutdown_tx.send(true);
        for join in self.joins {
            if let Err(e) = join.await {
                error!("worker exited abnormally: {e}");
            }
        }
        info!("worker pool stopped");
    }
}

struct Worker {
    id: usize,
    queue: TaskQueue,
    runner: Arc<dyn TaskRunner>,
    recovery: Arc<RecoveryStore>,
    counter: Arc<CompletionCounter>,
}

impl Worker {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        debug!(worker = self.id, "worker started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let next = tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                task = async { self.queue.lock().await.recv().await } => task,
            };

            let Some(task) = next else {
                break;
            };
            self.execute(task).await;
        }
        debug!(worker = self.id, "worker stopped");
    }

    async fn execute(&self, task: Task) {
        let kind = task.kind();
        let span = start_task_span(kind, &task.subject(), self.id);
        let started = Instant::now();

        // Run on its own tokio task so a panicking body counts as a failure
        // instead of taking the worker down.
        let runner = Arc::clone(&self.runner);
        let attempt = task.clone();
        let outcome = match tokio::spawn(
            async move { runner.run(&attempt).await }.instrument(span.clone()),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => Err(TaskError::Other(format!("task panicked: {e}"))),
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::task_duration_ms().record(duration_ms, &[KeyValue::new("kind", kind)]);

        match outcome {
            Ok(()) => {
                record_task_outcome(&span, "success");
                metrics::tasks_completed().add(
                    1,
                    &[KeyValue::new("kind", kind), KeyValue::new("result", "success")],
                );
            }
            Err(e) => {
                record_task_outcome(&span, "failure");
                span.in_scope(|| warn!(error = %e, "task failed, moved to recovery"));
                self.recovery.append(task);
                metrics::tasks_completed().add(
                    1,
                    &[KeyValue::new("kind", kind), KeyValue::new("result", "failure")],
                );
            }
        }
        self.counter.decrement();
    }
}
