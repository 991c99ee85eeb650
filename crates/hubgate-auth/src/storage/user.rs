//! User repository capability.
//!
//! User storage belongs to an external collaborator; the auth service
//! only ever needs two read paths, so that is the entire contract.
//! Production wires a database-backed implementation;
//! [`InMemoryUserRepository`] covers tests and demos.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::AuthResult;
use crate::types::user::User;

/// Read-only lookup into the external user store.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user by login email.
    ///
    /// Returns `None` if no such user exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Finds a user by id.
    ///
    /// Returns `None` if no such user exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>>;
}

/// In-process user repository for tests and single-node demos.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: DashMap<String, User>,
}

impl InMemoryUserRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub fn insert(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.email == email)
            .map(|entry| entry.clone()))
    }

    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.get(id).map(|entry| entry.clone()))
    }
}
