//! Tasks: deferred units of work the pool executes.
//!
//! A task is plain data (kind + payload) so a pending task can be logged
//! or inspected while it sits in the queue or the recovery store. The
//! side effect lives in a [`TaskRunner`], dispatched on the variant.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::broker::PublishOutcome;
use crate::model::{User, UserEvent, UserInput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Task {
    /// Insert a freshly registered account.
    SaveUser(User),
    /// Overwrite every field of an account.
    UpdateUser { uuid: Uuid, changes: UserInput },
    /// Overwrite the non-empty fields of an account.
    PatchUser { uuid: Uuid, changes: UserInput },
    DeleteUser { uuid: Uuid },
    /// Mirror a mutation to the event topic.
    PublishEvent(UserEvent),
}

impl Task {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SaveUser(_) => "save_user",
            Self::UpdateUser { .. } => "update_user",
            Self::PatchUser { .. } => "patch_user",
            Self::DeleteUser { .. } => "delete_user",
            Self::PublishEvent(_) => "publish_event",
        }
    }

    /// The account this task concerns.
    pub fn subject(&self) -> Uuid {
        match self {
            Self::SaveUser(user) => user.uuid,
            Self::UpdateUser { uuid, .. }
            | Self::PatchUser { uuid, .. }
            | Self::DeleteUser { uuid } => *uuid,
            Self::PublishEvent(event) => event.user.uuid,
        }
    }
}

/// Why a task did not take effect. Logged, never returned to the caller
/// that submitted the task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("store mutation failed: {0}")]
    Store(#[source] crate::error::Error),

    #[error("cache write failed: {0}")]
    Cache(#[source] crate::error::Error),

    #[error("event not published: {0}")]
    Publish(PublishOutcome),

    #[error("broker unavailable: {0}")]
    Broker(#[from] crate::broker::BrokerError),

    #[error("{0}")]
    Other(String),
}

/// Outcome of one execution: `Ok` on success, the cause on failure.
pub type TaskOutcome = std::result::Result<(), TaskError>;

/// Executes tasks. One implementation per deployment, shared by every
/// worker.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &Task) -> TaskOutcome;
}
