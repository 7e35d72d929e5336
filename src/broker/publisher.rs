//! Transactional publish: begin, send, commit, and the commit-failure
//! classification loop.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{BrokerError, ProducerFactory, Record, TransactionalProducer, TxnStatus};
use crate::telemetry::metrics;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub topic: String,
    /// Upper bound on classification rounds after a failed commit.
    pub max_commit_attempts: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: "UsersearchTopic".to_string(),
            max_commit_attempts: 16,
        }
    }
}

/// Terminal result of one publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Committed.
    Delivered,
    /// Not delivered; the connection can be used again.
    Rejected,
    /// Not delivered; the connection was closed and must be replaced.
    ConnectionPoisoned,
}

impl PublishOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
            Self::ConnectionPoisoned => "connection_poisoned",
        }
    }
}

impl std::fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a publish call is in the producer's transaction protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Began,
    InputAccepted,
    ProducerErrored,
    CommitAttempted,
    Committed,
    AbortableError,
    FatalError,
}

/// How the classification loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Committed,
    Aborted,
    Fatal,
    Exhausted,
}

/// Drives one producer connection through begin/send/commit-or-abort.
pub struct TransactionalPublisher {
    producer: Box<dyn TransactionalProducer>,
    config: PublisherConfig,
    closed: bool,
}

impl TransactionalPublisher {
    pub fn new(producer: Box<dyn TransactionalProducer>, config: PublisherConfig) -> Self {
        Self {
            producer,
            config,
            closed: false,
        }
    }

    /// False once the connection was closed or reported a fatal error.
    pub fn is_usable(&self) -> bool {
        !self.closed && !self.producer.status().contains(TxnStatus::FATAL_ERROR)
    }

    pub fn status(&self) -> TxnStatus {
        self.producer.status()
    }

    /// Publish one message to the configured topic inside its own
    /// transaction.
    ///
    /// `ConnectionPoisoned` is only reported by the call that saw
    /// `IN_ERROR` and closed the connection. Later calls on the closed
    /// connection run nothing and report `Rejected`.
    pub async fn publish(&mut self, key: Option<String>, payload: String) -> PublishOutcome {
        if self.closed {
            warn!("publish on a closed producer connection");
            metrics::publish_outcomes()
                .add(1, &[KeyValue::new("outcome", PublishOutcome::Rejected.as_str())]);
            return PublishOutcome::Rejected;
        }

        let mut state = TransactionState::Idle;

        // A rejected begin is logged and the attempt carries on; the
        // commit below then reports whatever state the producer is in.
        if let Err(e) = self.producer.begin().await {
            error!(error = %e, "producer: unable to begin transaction");
        }
        advance(&mut state, TransactionState::Began);

        let record = Record {
            topic: self.config.topic.clone(),
            key,
            payload,
        };
        let send_state = tokio::select! {
            biased;
            err = self.producer.next_error() => {
                warn!(error = %err, "producer: send failed");
                TransactionState::ProducerErrored
            }
            () = self.producer.enqueue(record) => TransactionState::InputAccepted,
        };
        advance(&mut state, send_state);
        let accepted = send_state == TransactionState::InputAccepted;

        advance(&mut state, TransactionState::CommitAttempted);
        let resolution = match self.producer.commit().await {
            Ok(()) => Resolution::Committed,
            Err(e) => {
                warn!(error = %e, "producer: unable to commit transaction");
                self.classify_commit_failure().await
            }
        };
        match resolution {
            Resolution::Committed => advance(&mut state, TransactionState::Committed),
            Resolution::Aborted => advance(&mut state, TransactionState::AbortableError),
            Resolution::Fatal => advance(&mut state, TransactionState::FatalError),
            // Never reached a terminal state; stays at CommitAttempted.
            Resolution::Exhausted => {}
        }

        let outcome = if self.producer.status().contains(TxnStatus::IN_ERROR) {
            if let Err(e) = self.producer.close().await {
                warn!(error = %e, "producer: close failed");
            }
            self.closed = true;
            error!(status = %self.producer.status(), "producer: connection in error, closed");
            PublishOutcome::ConnectionPoisoned
        } else if resolution == Resolution::Committed && accepted {
            PublishOutcome::Delivered
        } else {
            PublishOutcome::Rejected
        };

        metrics::publish_outcomes().add(1, &[KeyValue::new("outcome", outcome.as_str())]);
        debug!(outcome = %outcome, ?state, "publish finished");
        outcome
    }

    /// After a failed commit: re-read the status flags each round and
    /// either give up (fatal), abort (abortable) or retry the commit.
    async fn classify_commit_failure(&self) -> Resolution {
        for attempt in 1..=self.config.max_commit_attempts {
            let status = self.producer.status();

            if status.contains(TxnStatus::FATAL_ERROR) {
                error!(%status, "producer: fatal state, connection must be recreated");
                return Resolution::Fatal;
            }

            if status.contains(TxnStatus::ABORTABLE_ERROR) {
                match self.producer.abort().await {
                    Ok(()) => {
                        info!(attempt, "producer: transaction aborted");
                        return Resolution::Aborted;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "producer: unable to abort transaction");
                        continue;
                    }
                }
            }

            match self.producer.commit().await {
                Ok(()) => {
                    info!(attempt, "producer: commit succeeded on retry");
                    return Resolution::Committed;
                }
                Err(e) => warn!(attempt, error = %e, "producer: unable to commit transaction"),
            }
        }

        error!(
            attempts = self.config.max_commit_attempts,
            "producer: commit still unresolved, giving up"
        );
        Resolution::Exhausted
    }
}

fn advance(state: &mut TransactionState, next: TransactionState) {
    debug!(from = ?*state, to = ?next, "transaction state");
    *state = next;
}

/// Shared entry point for publish tasks.
///
/// Holds at most one connection and serializes publishes through it.
/// Connects lazily and reconnects after the connection became unusable.
pub struct EventPublisher {
    factory: Arc<dyn ProducerFactory>,
    config: PublisherConfig,
    current: Mutex<Option<TransactionalPublisher>>,
}

impl EventPublisher {
    pub fn new(factory: Arc<dyn ProducerFactory>, config: PublisherConfig) -> Self {
        Self {
            factory,
            config,
            current: Mutex::new(None),
        }
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Publish one message. `Err` means no connection could be opened.
    pub async fn publish(
        &self,
        key: Option<String>,
        payload: String,
    ) -> Result<PublishOutcome, BrokerError> {
        let mut slot = self.current.lock().await;

        let publisher = match slot.take() {
            Some(publisher) if publisher.is_usable() => slot.insert(publisher),
            stale => {
                if stale.is_some() {
                    info!("discarding unusable producer connection");
                }
                let producer = self.factory.connect().await?;
                info!(topic = %self.config.topic, "producer connection opened");
                slot.insert(TransactionalPublisher::new(producer, self.config.clone()))
            }
        };

        Ok(publisher.publish(key, payload).await)
    }
}
