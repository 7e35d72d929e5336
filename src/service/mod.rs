//! User service: request-side validation and task submission.
//!
//! Each mutation is validated synchronously, then split into a store task
//! and an event task that are submitted independently. The call returns
//! once both are queued; what happens to them afterwards is only visible
//! in logs and metrics.

pub mod password;
pub mod runner;
pub mod validate;

pub use runner::UserTaskRunner;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::Cache;
use crate::db::UserRepository;
use crate::error::{Error, Result};
use crate::model::{EventMethod, UserEvent, UserInput, UserSnapshot};
use crate::pipeline::{Submitter, Task};

/// How long a freshly registered account stays cached.
pub const NEW_USER_TTL: Duration = Duration::from_secs(60);
/// How long an account touched by update/patch stays cached.
pub const IDENTITY_TTL: Duration = Duration::from_secs(120);

pub struct UserService {
    repo: Arc<dyn UserRepository>,
    cache: Arc<dyn Cache>,
    submitter: Submitter,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, cache: Arc<dyn Cache>, submitter: Submitter) -> Self {
        Self {
            repo,
            cache,
            submitter,
        }
    }

    /// Register a new account. Returns its id once the save and the
    /// register event are queued.
    pub async fn register(&self, input: UserInput) -> Result<Uuid> {
        validate::require_non_empty(&[
            ("username", &input.username),
            ("password", &input.password),
            ("email", &input.email),
            ("name", &input.name),
        ])?;
        validate::require_email(&input.email)?;

        let exists = self
            .repo
            .exists(&input.username, &input.email)
            .await
            .map_err(|e| {
                warn!(error = %e, "existence check failed");
                Error::Other("failed connect to DB".to_string())
            })?;
        if exists {
            return Err(Error::AlreadyExists("user".to_string()));
        }

        let uuid = Uuid::new_v4();
        let mut user = input.into_user(uuid);
        user.password = password::digest(&uuid, &user.password);
        let event = UserEvent::new(EventMethod::Register, UserSnapshot::from(&user));

        self.submitter.submit(Task::SaveUser(user));
        self.submitter.submit(Task::PublishEvent(event));
        info!(user = %uuid, "registration queued");
        Ok(uuid)
    }

    /// Replace every field of an account.
    pub async fn update(&self, uuid: &str, mut input: UserInput) -> Result<()> {
        validate::require_non_empty(&[
            ("uuid", uuid),
            ("username", &input.username),
            ("password", &input.password),
            ("email", &input.email),
            ("name", &input.name),
        ])?;
        validate::require_email(&input.email)?;
        let uuid = self.resolve(uuid, &input).await?;

        let snapshot = UserSnapshot::from_input(uuid, &input);
        input.password = password::digest(&uuid, &input.password);

        self.submitter.submit(Task::UpdateUser {
            uuid,
            changes: input,
        });
        self.submitter.submit(Task::PublishEvent(UserEvent::new(
            EventMethod::Update,
            snapshot,
        )));
        info!(user = %uuid, "update queued");
        Ok(())
    }

    /// Replace the provided (non-empty) fields of an account.
    pub async fn patch(&self, uuid: &str, mut input: UserInput) -> Result<()> {
        validate::require_non_empty(&[("uuid", uuid)])?;
        if input.is_empty() {
            return Err(Error::Validation(
                "at least one data must be changed".to_string(),
            ));
        }
        if !input.email.is_empty() {
            validate::require_email(&input.email)?;
        }
        let uuid = self.resolve(uuid, &input).await?;

        let snapshot = UserSnapshot::from_input(uuid, &input);
        if !input.password.is_empty() {
            input.password = password::digest(&uuid, &input.password);
        }

        self.submitter.submit(Task::PatchUser {
            uuid,
            changes: input,
        });
        self.submitter.submit(Task::PublishEvent(UserEvent::new(
            EventMethod::Patch,
            snapshot,
        )));
        info!(user = %uuid, "patch queued");
        Ok(())
    }

    /// Remove an account.
    pub async fn delete(&self, uuid: &str) -> Result<()> {
        validate::require_non_empty(&[("uuid", uuid)])?;
        let uuid = self.lookup(uuid).await?.0;

        // A stale entry would let later lookups see a deleted account.
        let evicted = self.cache.delete(&uuid.to_string()).await?;
        debug!(user = %uuid, evicted, "cache entry evicted");

        self.submitter.submit(Task::DeleteUser { uuid });
        self.submitter.submit(Task::PublishEvent(UserEvent::new(
            EventMethod::Delete,
            UserSnapshot::identity(uuid),
        )));
        info!(user = %uuid, "delete queued");
        Ok(())
    }

    /// Look up an existing account and, when the cache missed, cache the
    /// incoming fields (never the password) under its id.
    async fn resolve(&self, raw: &str, input: &UserInput) -> Result<Uuid> {
        let (uuid, cached) = self.lookup(raw).await?;
        if !cached {
            let value = serde_json::to_string(&UserSnapshot::from_input(uuid, input))?;
            match self
                .cache
                .set_if_absent(&uuid.to_string(), &value, IDENTITY_TTL)
                .await
            {
                Ok(written) => debug!(user = %uuid, written, "caching uuid"),
                Err(e) => warn!(user = %uuid, error = %e, "caching uuid failed"),
            }
        }
        Ok(uuid)
    }

    /// Parse `raw` and confirm the account exists: cache first, then the
    /// store. Returns the id and whether the cache answered.
    async fn lookup(&self, raw: &str) -> Result<(Uuid, bool)> {
        let uuid = Uuid::parse_str(raw).map_err(|_| Error::NotFound("uuid".to_string()))?;
        let key = uuid.to_string();

        match self.cache.get(&key).await {
            Ok(Some(value)) if !value.is_empty() => {
                debug!(user = %uuid, "uuid found in cache");
                return Ok((uuid, true));
            }
            Ok(_) => {}
            Err(e) => warn!(user = %uuid, error = %e, "cache lookup failed, asking the store"),
        }

        let exists = self.repo.exists_uuid(uuid).await.map_err(|e| {
            warn!(user = %uuid, error = %e, "uuid lookup failed");
            Error::Other("failed connect to DB".to_string())
        })?;
        if !exists {
            return Err(Error::NotFound("uuid".to_string()));
        }
        Ok((uuid, false))
    }
}
