//! Existence/identity cache.
//!
//! A best-effort hint in front of the store: a hit short-circuits an
//! existence lookup, a miss falls through to the store.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_cache;

pub use memory::InMemoryCache;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` under `key` for `ttl` unless the key is present.
    /// Returns whether the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`. Returns whether it was present.
    async fn delete(&self, key: &str) -> Result<bool>;
}
