//! Change events mirrored to the broker topic.
//!
//! One event per accepted mutation: the method that produced it and a
//! snapshot of the resulting entity. Passwords never leave the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::{User, UserInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMethod {
    Register,
    Update,
    Patch,
    Delete,
}

impl std::fmt::Display for EventMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Register => "register",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// Public view of an account. Fields a mutation did not touch are empty
/// and omitted from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

impl UserSnapshot {
    pub fn from_input(uuid: Uuid, input: &UserInput) -> Self {
        Self {
            uuid,
            username: input.username.clone(),
            name: input.name.clone(),
            email: input.email.clone(),
        }
    }

    pub fn identity(uuid: Uuid) -> Self {
        Self {
            uuid,
            username: String::new(),
            name: String::new(),
            email: String::new(),
        }
    }
}

impl From<&User> for UserSnapshot {
    fn from(user: &User) -> Self {
        Self {
            uuid: user.uuid,
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEvent {
    pub method: EventMethod,
    pub user: UserSnapshot,
    pub emitted_at: DateTime<Utc>,
}

impl UserEvent {
    pub fn new(method: EventMethod, user: UserSnapshot) -> Self {
        Self {
            method,
            user,
            emitted_at: Utc::now(),
        }
    }

    /// Message key on the topic. Every event for one account shares it.
    pub fn key(&self) -> String {
        self.user.uuid.to_string()
    }
}
