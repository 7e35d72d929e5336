//! Task execution against the store, cache and broker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::NEW_USER_TTL;
use crate::broker::{EventPublisher, PublishOutcome};
use crate::cache::Cache;
use crate::db::UserRepository;
use crate::model::UserSnapshot;
use crate::pipeline::{Task, TaskError, TaskOutcome, TaskRunner};

/// Runs every [`Task`] variant. Shared by all workers.
pub struct UserTaskRunner {
    repo: Arc<dyn UserRepository>,
    cache: Arc<dyn Cache>,
    publisher: Arc<EventPublisher>,
}

impl UserTaskRunner {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        cache: Arc<dyn Cache>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            repo,
            cache,
            publisher,
        }
    }
}

#[async_trait]
impl TaskRunner for UserTaskRunner {
    async fn run(&self, task: &Task) -> TaskOutcome {
        match task {
            Task::SaveUser(user) => {
                let snapshot = serde_json::to_string(&UserSnapshot::from(user))
                    .map_err(|e| TaskError::Cache(e.into()))?;
                let written = self
                    .cache
                    .set_if_absent(&user.uuid.to_string(), &snapshot, NEW_USER_TTL)
                    .await
                    .map_err(TaskError::Cache)?;
                debug!(user = %user.uuid, written, "caching new user");
                self.repo.save(user).await.map_err(TaskError::Store)
            }
            Task::UpdateUser { uuid, changes } => self
                .repo
                .update(*uuid, changes)
                .await
                .map_err(TaskError::Store),
            Task::PatchUser { uuid, changes } => self
                .repo
                .patch(*uuid, changes)
                .await
                .map_err(TaskError::Store),
            Task::DeleteUser { uuid } => {
                let removed = self.repo.delete(*uuid).await.map_err(TaskError::Store)?;
                if !removed {
                    debug!(user = %uuid, "nothing to delete");
                }
                Ok(())
            }
            Task::PublishEvent(event) => {
                let payload = serde_json::to_string(event)
                    .map_err(|e| TaskError::Other(format!("event encoding failed: {e}")))?;
                info!(
                    topic = %self.publisher.topic(),
                    method = %event.method,
                    user = %event.user.uuid,
                    "sending to broker"
                );
                match self.publisher.publish(Some(event.key()), payload).await? {
                    PublishOutcome::Delivered => Ok(()),
                    outcome => Err(TaskError::Publish(outcome)),
                }
            }
        }
    }
}
