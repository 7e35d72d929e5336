//! Broker side: the transactional producer interface, the publisher that
//! drives it, and the adapters behind it.
//!
//! A producer connection carries at most one open transaction. The
//! [`TransactionalPublisher`] takes `&mut self` to publish so the borrow
//! checker enforces that; [`EventPublisher`] shares one publisher between
//! workers by serializing calls, and swaps in a fresh connection when the
//! previous one was poisoned.

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod publisher;

pub use publisher::{EventPublisher, PublishOutcome, PublisherConfig, TransactionalPublisher};

use async_trait::async_trait;
use thiserror::Error;

/// Transaction status bitmask reported by a producer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxnStatus(u16);

impl TxnStatus {
    pub const UNINITIALIZED: Self = Self(1 << 0);
    pub const READY: Self = Self(1 << 1);
    pub const IN_TRANSACTION: Self = Self(1 << 2);
    pub const COMMITTING: Self = Self(1 << 3);
    pub const ABORTING: Self = Self(1 << 4);
    /// Set alongside `ABORTABLE_ERROR` or `FATAL_ERROR`.
    pub const IN_ERROR: Self = Self(1 << 5);
    /// The open transaction must be aborted; the connection survives.
    pub const ABORTABLE_ERROR: Self = Self(1 << 6);
    /// The connection must be discarded.
    pub const FATAL_ERROR: Self = Self(1 << 7);

    const NAMES: [(Self, &'static str); 8] = [
        (Self::UNINITIALIZED, "uninitialized"),
        (Self::READY, "ready"),
        (Self::IN_TRANSACTION, "in_transaction"),
        (Self::COMMITTING, "committing"),
        (Self::ABORTING, "aborting"),
        (Self::IN_ERROR, "in_error"),
        (Self::ABORTABLE_ERROR, "abortable_error"),
        (Self::FATAL_ERROR, "fatal_error"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for TxnStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TxnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TxnStatus({self})")
    }
}

/// A failure reported by the producer, with the status flags at the time.
#[derive(Debug, Clone, Error)]
#[error("{message} (status: {status})")]
pub struct BrokerError {
    pub message: String,
    pub status: TxnStatus,
}

impl BrokerError {
    pub fn new(message: impl Into<String>, status: TxnStatus) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }
}

/// One message bound for a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub key: Option<String>,
    pub payload: String,
}

/// A transactional producer connection.
///
/// `enqueue` and `next_error` are the input and error channels: the first
/// resolves once the client buffered the record, the second once an
/// asynchronous transport error is pending (it stays pending otherwise).
#[async_trait]
pub trait TransactionalProducer: Send + Sync {
    async fn begin(&self) -> Result<(), BrokerError>;
    async fn enqueue(&self, record: Record);
    async fn next_error(&self) -> BrokerError;
    async fn commit(&self) -> Result<(), BrokerError>;
    async fn abort(&self) -> Result<(), BrokerError>;
    fn status(&self) -> TxnStatus;
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Opens producer connections. Called lazily and again whenever the
/// current connection became unusable.
#[async_trait]
pub trait ProducerFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn TransactionalProducer>, BrokerError>;
}
