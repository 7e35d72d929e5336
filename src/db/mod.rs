//! Postgres access for the user store.

pub mod memory;
pub mod users;

pub use memory::InMemoryUserRepository;
pub use users::UserRepository;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use crate::config::secrets::redacted_url;
use crate::error::Result;

const MAX_CONNECTIONS: u32 = 10;
/// A store task waiting longer than this for a connection fails and goes
/// to the recovery store instead of holding its worker.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the connection pool every store task shares.
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(url: &SecretString) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url.expose_secret())
            .await?;
        info!(url = %redacted_url(url), "connected to postgres");
        Ok(Self { pool })
    }

    /// Apply `./migrations`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        let (_,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
