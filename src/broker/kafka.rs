//! Kafka producer connection via rdkafka (feature `kafka`).
//!
//! librdkafka has no status bitmask; the flags are derived from the
//! transactional errors it returns (`is_fatal`, `txn_requires_abort`).
//! Delivery failures reported after the record was buffered are fed into
//! the error channel. `close` flushes and then drops the client handle;
//! calls after that fail with "producer closed".

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{BrokerError, ProducerFactory, Record, TransactionalProducer, TxnStatus};

/// Opens transactional Kafka producers.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    pub brokers: String,
    pub transactional_id: String,
    /// Bound for init/commit/abort round trips.
    pub timeout: Duration,
}

impl KafkaConnector {
    pub fn new(brokers: impl Into<String>, transactional_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            transactional_id: transactional_id.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl ProducerFactory for KafkaConnector {
    async fn connect(&self) -> Result<Box<dyn TransactionalProducer>, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("transactional.id", &self.transactional_id)
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| BrokerError::new(format!("create producer: {e}"), TxnStatus::UNINITIALIZED))?;

        let init = producer.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || init.init_transactions(timeout))
            .await
            .map_err(|e| BrokerError::new(format!("init_transactions join: {e}"), TxnStatus::UNINITIALIZED))?
            .map_err(|e| BrokerError::new(format!("init_transactions: {e}"), TxnStatus::UNINITIALIZED))?;

        info!(brokers = %self.brokers, transactional_id = %self.transactional_id, "kafka producer ready");
        Ok(Box::new(KafkaProducer::new(producer, self.timeout)))
    }
}

pub struct KafkaProducer {
    /// `None` once closed.
    producer: Mutex<Option<FutureProducer>>,
    timeout: Duration,
    status: Mutex<TxnStatus>,
    errors_tx: mpsc::UnboundedSender<KafkaError>,
    errors_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<KafkaError>>,
}

impl KafkaProducer {
    /// Wrap an already created producer. Transactions must have been
    /// initialised on it before `begin` is called.
    pub fn new(producer: FutureProducer, timeout: Duration) -> Self {
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        Self {
            producer: Mutex::new(Some(producer)),
            timeout,
            status: Mutex::new(TxnStatus::READY),
            errors_tx,
            errors_rx: tokio::sync::Mutex::new(errors_rx),
        }
    }

    fn status_lock(&self) -> MutexGuard<'_, TxnStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn producer_lock(&self) -> MutexGuard<'_, Option<FutureProducer>> {
        self.producer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A handle to the live client, or an error once closed.
    fn handle(&self) -> Result<FutureProducer, BrokerError> {
        let producer = self.producer_lock().clone();
        producer.ok_or_else(|| BrokerError::new("producer closed", self.status()))
    }

    /// Translate a librdkafka error into status flags and a `BrokerError`.
    fn record(&self, context: &str, err: KafkaError) -> BrokerError {
        if let KafkaError::Transaction(ref txn) = err {
            let mut status = self.status_lock();
            if txn.is_fatal() {
                status.insert(TxnStatus::FATAL_ERROR | TxnStatus::IN_ERROR);
            } else if txn.txn_requires_abort() {
                status.insert(TxnStatus::ABORTABLE_ERROR | TxnStatus::IN_ERROR);
            }
        }
        BrokerError::new(format!("{context}: {err}"), self.status())
    }

    async fn blocking<F>(&self, context: &str, op: F) -> Result<(), BrokerError>
    where
        F: FnOnce(FutureProducer, Duration) -> Result<(), KafkaError> + Send + 'static,
    {
        let producer = self.handle()?;
        let timeout = self.timeout;
        match tokio::task::spawn_blocking(move || op(producer, timeout)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.record(context, e)),
            Err(e) => Err(BrokerError::new(format!("{context} join: {e}"), self.status())),
        }
    }
}

#[async_trait]
impl TransactionalProducer for KafkaProducer {
    async fn begin(&self) -> Result<(), BrokerError> {
        self.handle()?
            .begin_transaction()
            .map_err(|e| self.record("begin_transaction", e))?;
        let mut status = self.status_lock();
        status.remove(TxnStatus::READY);
        status.insert(TxnStatus::IN_TRANSACTION);
        Ok(())
    }

    async fn enqueue(&self, record: Record) {
        let mut future_record = FutureRecord::to(&record.topic).payload(&record.payload);
        if let Some(ref key) = record.key {
            future_record = future_record.key(key);
        }

        let producer = match self.handle() {
            Ok(producer) => producer,
            Err(e) => {
                debug!(error = %e, "enqueue on a closed producer");
                let _ = self.errors_tx.send(KafkaError::Canceled);
                std::future::pending::<()>().await;
                return;
            }
        };
        let refused = match producer.send_result(future_record) {
            Ok(delivery) => {
                let errors = self.errors_tx.clone();
                tokio::spawn(async move {
                    if let Ok(Err((e, _))) = delivery.await {
                        debug!(error = %e, "kafka delivery failed");
                        let _ = errors.send(e);
                    }
                });
                false
            }
            Err((e, _)) => {
                let _ = self.errors_tx.send(e);
                true
            }
        };
        if refused {
            // Never accepted: let the error channel win the race.
            std::future::pending::<()>().await;
        }
    }

    async fn next_error(&self) -> BrokerError {
        let next = self.errors_rx.lock().await.recv().await;
        match next {
            Some(e) => self.record("send", e),
            None => std::future::pending().await,
        }
    }

    async fn commit(&self) -> Result<(), BrokerError> {
        self.blocking("commit_transaction", |p, t| p.commit_transaction(t))
            .await?;
        let mut status = self.status_lock();
        status.remove(TxnStatus::IN_TRANSACTION);
        status.insert(TxnStatus::READY);
        Ok(())
    }

    async fn abort(&self) -> Result<(), BrokerError> {
        self.blocking("abort_transaction", |p, t| p.abort_transaction(t))
            .await?;
        *self.status_lock() = TxnStatus::READY;
        Ok(())
    }

    fn status(&self) -> TxnStatus {
        *self.status_lock()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.producer_lock().is_none() {
            return Ok(());
        }
        let flushed = self.blocking("flush", |p, t| p.flush(t)).await;

        // Destroying the client can block on its background threads.
        let producer = self.producer_lock().take();
        if let Some(producer) = producer {
            let _ = tokio::task::spawn_blocking(move || drop(producer)).await;
        }
        info!("kafka producer closed");
        flushed
    }
}
