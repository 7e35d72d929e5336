//! Error types for koala-user.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller input rejected before any task was built.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already registered")]
    AlreadyExists(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("broker error: {0}")]
    Broker(#[from] crate::broker::BrokerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
