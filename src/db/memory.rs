//! In-memory user store for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::users::UserRepository;
use crate::error::{Error, Result};
use crate::model::{User, UserInput};

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
    failures: AtomicUsize,
    mutations: AtomicUsize,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` mutations fail as if the database were down.
    pub fn fail_next(&self, count: usize) {
        self.failures.fetch_add(count, Ordering::AcqRel);
    }

    /// Mutation calls seen so far, failed ones included.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::Acquire)
    }

    pub fn get(&self, uuid: Uuid) -> Option<User> {
        self.lock().get(&uuid).cloned()
    }

    pub fn insert(&self, user: User) {
        self.lock().insert(user.uuid, user);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, User>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutation(&self) -> Result<()> {
        self.mutations.fetch_add(1, Ordering::AcqRel);
        let failed = self
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::Other("store unavailable".to_string()));
        }
        Ok(())
    }
}

fn apply(target: &mut String, value: &str) {
    if !value.is_empty() {
        *target = value.to_string();
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn save(&self, user: &User) -> Result<()> {
        self.mutation()?;
        self.lock().entry(user.uuid).or_insert_with(|| user.clone());
        Ok(())
    }

    async fn update(&self, uuid: Uuid, changes: &UserInput) -> Result<()> {
        self.mutation()?;
        if let Some(user) = self.lock().get_mut(&uuid) {
            user.username = changes.username.clone();
            user.name = changes.name.clone();
            user.email = changes.email.clone();
            user.password = changes.password.clone();
        }
        Ok(())
    }

    async fn patch(&self, uuid: Uuid, changes: &UserInput) -> Result<()> {
        self.mutation()?;
        if let Some(user) = self.lock().get_mut(&uuid) {
            apply(&mut user.username, &changes.username);
            apply(&mut user.name, &changes.name);
            apply(&mut user.email, &changes.email);
            apply(&mut user.password, &changes.password);
        }
        Ok(())
    }

    async fn delete(&self, uuid: Uuid) -> Result<bool> {
        self.mutation()?;
        Ok(self.lock().remove(&uuid).is_some())
    }

    async fn exists(&self, username: &str, email: &str) -> Result<bool> {
        Ok(self
            .lock()
            .values()
            .any(|u| u.username == username || u.email == email))
    }

    async fn exists_uuid(&self, uuid: Uuid) -> Result<bool> {
        Ok(self.lock().contains_key(&uuid))
    }
}
