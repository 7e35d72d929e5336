//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Sensitive values wrapped in secrecy::SecretString to prevent
//! log leaks.

pub mod secrets;

use crate::broker::PublisherConfig;
use crate::error::{Error, Result};
use crate::pipeline::PipelineConfig;
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// When unset the service falls back to the in-process cache.
    pub redis_url: Option<SecretString>,
    pub kafka_brokers: String,
    pub kafka_topic: String,
    pub kafka_transactional_id: String,
    pub worker_count: usize,
    pub retry_interval: Duration,
    pub max_commit_attempts: u32,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            redis_url: std::env::var("REDIS_URL").ok().map(SecretString::from),
            kafka_brokers: var_or("KAFKA_BROKERS", "localhost:9092"),
            kafka_topic: var_or("KAFKA_TOPIC", "UsersearchTopic"),
            kafka_transactional_id: var_or("KAFKA_TRANSACTIONAL_ID", "koala-user"),
            worker_count: parsed_var("WORKER_COUNT", 10)?,
            retry_interval: Duration::from_secs(parsed_var("RETRY_INTERVAL_SECS", 3)?),
            max_commit_attempts: parsed_var("MAX_COMMIT_ATTEMPTS", 16)?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            workers: self.worker_count,
            retry_interval: self.retry_interval,
        }
    }

    pub fn publisher(&self) -> PublisherConfig {
        PublisherConfig {
            topic: self.kafka_topic.clone(),
            max_commit_attempts: self.max_commit_attempts,
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}
