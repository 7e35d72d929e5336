//! User account types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored user account. `password` always holds the digest, never the
/// plaintext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub uuid: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("uuid", &self.uuid)
            .field("username", &self.username)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<digest>")
            .finish()
    }
}

/// Account fields as they arrive from a caller.
///
/// Empty strings mean "not provided". Register and update require every
/// field; patch applies only the non-empty ones.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInput {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

impl UserInput {
    pub fn new(
        username: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
            && self.name.is_empty()
            && self.email.is_empty()
            && self.password.is_empty()
    }

    /// Promote to a stored account under `uuid`.
    pub fn into_user(self, uuid: Uuid) -> User {
        User {
            uuid,
            username: self.username,
            name: self.name,
            email: self.email,
            password: self.password,
        }
    }
}

impl std::fmt::Debug for UserInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let password = if self.password.is_empty() { "" } else { "<set>" };
        f.debug_struct("UserInput")
            .field("username", &self.username)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &password)
            .finish()
    }
}
