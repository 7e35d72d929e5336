//! User account queries.

use async_trait::async_trait;
use opentelemetry::KeyValue;
use uuid::Uuid;

use super::Db;
use crate::error::Result;
use crate::model::{User, UserInput};
use crate::telemetry::metrics;

/// The store the pipeline's mutation tasks run against.
///
/// Every mutation may be retried verbatim, so implementations must
/// tolerate seeing the same call more than once.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn save(&self, user: &User) -> Result<()>;

    /// Overwrite every field.
    async fn update(&self, uuid: Uuid, changes: &UserInput) -> Result<()>;

    /// Overwrite only the non-empty fields.
    async fn patch(&self, uuid: Uuid, changes: &UserInput) -> Result<()>;

    /// Returns whether a row was removed.
    async fn delete(&self, uuid: Uuid) -> Result<bool>;

    /// True when an account already uses `username` or `email`.
    async fn exists(&self, username: &str, email: &str) -> Result<bool>;

    async fn exists_uuid(&self, uuid: Uuid) -> Result<bool>;
}

fn record(operation: &'static str) {
    metrics::store_operations().add(1, &[KeyValue::new("operation", operation)]);
}

#[async_trait]
impl UserRepository for Db {
    async fn save(&self, user: &User) -> Result<()> {
        // A retried save of an already stored account is a no-op.
        sqlx::query(
            "INSERT INTO users (uuid, username, name, email, password)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (uuid) DO NOTHING",
        )
        .bind(user.uuid)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .execute(self.pool())
        .await?;
        record("save");
        Ok(())
    }

    async fn update(&self, uuid: Uuid, changes: &UserInput) -> Result<()> {
        sqlx::query(
            "UPDATE users SET username = $1, name = $2, email = $3, password = $4
             WHERE uuid = $5",
        )
        .bind(&changes.username)
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(&changes.password)
        .bind(uuid)
        .execute(self.pool())
        .await?;
        record("update");
        Ok(())
    }

    async fn patch(&self, uuid: Uuid, changes: &UserInput) -> Result<()> {
        sqlx::query(
            "UPDATE users SET
                username = COALESCE(NULLIF($1, ''), username),
                name     = COALESCE(NULLIF($2, ''), name),
                email    = COALESCE(NULLIF($3, ''), email),
                password = COALESCE(NULLIF($4, ''), password)
             WHERE uuid = $5",
        )
        .bind(&changes.username)
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(&changes.password)
        .bind(uuid)
        .execute(self.pool())
        .await?;
        record("patch");
        Ok(())
    }

    async fn delete(&self, uuid: Uuid) -> Result<bool> {
        let rows_affected = sqlx::query("DELETE FROM users WHERE uuid = $1")
            .bind(uuid)
            .execute(self.pool())
            .await?
            .rows_affected();
        record("delete");
        Ok(rows_affected == 1)
    }

    async fn exists(&self, username: &str, email: &str) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(self.pool())
        .await?;
        record("exists");
        Ok(row.0)
    }

    async fn exists_uuid(&self, uuid: Uuid) -> Result<bool> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE uuid = $1)")
            .bind(uuid)
            .fetch_one(self.pool())
            .await?;
        record("exists_uuid");
        Ok(row.0)
    }
}

impl Db {
    /// Fetch one account.
    pub async fn get_user(&self, uuid: Uuid) -> Result<User> {
        let user: Option<User> = sqlx::query_as(
            "SELECT uuid, username, name, email, password FROM users WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_optional(self.pool())
        .await?;
        user.ok_or_else(|| crate::error::Error::NotFound(format!("user {uuid}")))
    }
}
