//! In-process broker for tests and dry runs.
//!
//! Faults are scripted on the [`InMemoryBroker`] and consumed by whichever
//! producer connection hits them next. Committed records and call counts
//! are observable from the broker handle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{BrokerError, ProducerFactory, Record, TransactionalProducer, TxnStatus};

/// How a scripted commit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    /// Commit fails, no flag raised.
    Transient,
    /// Commit fails with `ABORTABLE_ERROR | IN_ERROR`.
    Abortable,
    /// Commit fails with `FATAL_ERROR | IN_ERROR`.
    Fatal,
    /// Commit fails with `FATAL_ERROR` only.
    FatalWithoutInError,
}

#[derive(Debug, Default)]
struct BrokerState {
    committed: Vec<Record>,
    commit_faults: VecDeque<CommitFault>,
    send_errors: VecDeque<String>,
    abort_failures: usize,
    begin_failures: usize,
    connect_failures: usize,
    connections: usize,
    begins: usize,
    commits: usize,
    aborts: usize,
    closes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue commit failures; each commit call consumes one.
    pub fn fail_commits(&self, faults: impl IntoIterator<Item = CommitFault>) {
        self.lock().commit_faults.extend(faults);
    }

    pub fn fail_aborts(&self, count: usize) {
        self.lock().abort_failures += count;
    }

    pub fn fail_begins(&self, count: usize) {
        self.lock().begin_failures += count;
    }

    pub fn fail_connects(&self, count: usize) {
        self.lock().connect_failures += count;
    }

    /// Make the error channel yield `message` on the next send.
    pub fn push_send_error(&self, message: impl Into<String>) {
        self.lock().send_errors.push_back(message.into());
    }

    pub fn committed(&self) -> Vec<Record> {
        self.lock().committed.clone()
    }

    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    pub fn begins(&self) -> usize {
        self.lock().begins
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn aborts(&self) -> usize {
        self.lock().aborts
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Open a connection without going through the factory.
    pub fn producer(&self) -> InMemoryProducer {
        self.lock().connections += 1;
        InMemoryProducer::new(self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProducerFactory for InMemoryBroker {
    async fn connect(&self) -> Result<Box<dyn TransactionalProducer>, BrokerError> {
        {
            let mut state = self.lock();
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(BrokerError::new("broker unreachable", TxnStatus::UNINITIALIZED));
            }
        }
        Ok(Box::new(self.producer()))
    }
}

/// One connection to an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryProducer {
    broker: InMemoryBroker,
    status: Mutex<TxnStatus>,
    staged: Mutex<Vec<Record>>,
    closed: AtomicBool,
}

impl InMemoryProducer {
    fn new(broker: InMemoryBroker) -> Self {
        Self {
            broker,
            status: Mutex::new(TxnStatus::READY),
            staged: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn status_lock(&self) -> MutexGuard<'_, TxnStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn staged_lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn error(&self, message: &str) -> BrokerError {
        BrokerError::new(message, *self.status_lock())
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.error("producer closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionalProducer for InMemoryProducer {
    async fn begin(&self) -> Result<(), BrokerError> {
        self.ensure_open()?;
        {
            let mut state = self.broker.lock();
            state.begins += 1;
            if state.begin_failures > 0 {
                state.begin_failures -= 1;
                drop(state);
                return Err(self.error("transaction already in progress"));
            }
        }
        self.staged_lock().clear();
        let mut status = self.status_lock();
        status.remove(TxnStatus::READY);
        status.insert(TxnStatus::IN_TRANSACTION);
        Ok(())
    }

    async fn enqueue(&self, record: Record) {
        self.staged_lock().push(record);
    }

    async fn next_error(&self) -> BrokerError {
        let pending = self.broker.lock().send_errors.pop_front();
        match pending {
            Some(message) => self.error(&message),
            None => std::future::pending().await,
        }
    }

    async fn commit(&self) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let fault = {
            let mut state = self.broker.lock();
            state.commits += 1;
            state.commit_faults.pop_front()
        };

        let raised = match fault {
            None => {
                let records: Vec<Record> = self.staged_lock().drain(..).collect();
                self.broker.lock().committed.extend(records);
                let mut status = self.status_lock();
                status.remove(TxnStatus::IN_TRANSACTION);
                status.insert(TxnStatus::READY);
                return Ok(());
            }
            Some(CommitFault::Transient) => TxnStatus::empty(),
            Some(CommitFault::Abortable) => TxnStatus::ABORTABLE_ERROR | TxnStatus::IN_ERROR,
            Some(CommitFault::Fatal) => TxnStatus::FATAL_ERROR | TxnStatus::IN_ERROR,
            Some(CommitFault::FatalWithoutInError) => TxnStatus::FATAL_ERROR,
        };
        self.status_lock().insert(raised);
        Err(self.error("commit failed"))
    }

    async fn abort(&self) -> Result<(), BrokerError> {
        self.ensure_open()?;
        {
            let mut state = self.broker.lock();
            state.aborts += 1;
            if state.abort_failures > 0 {
                state.abort_failures -= 1;
                drop(state);
                return Err(self.error("abort failed"));
            }
        }
        self.staged_lock().clear();
        *self.status_lock() = TxnStatus::READY;
        Ok(())
    }

    fn status(&self) -> TxnStatus {
        *self.status_lock()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.broker.lock().closes += 1;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
