//! Credential store contract consumed by the user flows, plus an in-memory implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::StoreError;

/// Credential record. Only `email` is serialized; `password_hash` is also redacted in Debug.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

pub trait CredentialStore: Send + Sync {
    /// Exact, case-sensitive lookup.
    fn get(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Fails with `StoreError::Duplicate` if the email is taken.
    fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;
}

#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.users.read().len() }

    pub fn is_empty(&self) -> bool { self.users.read().is_empty() }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(email).cloned())
    }

    fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut users = self.users.write();
        if users.contains_key(email) {
            return Err(StoreError::Duplicate);
        }
        let now = Utc::now();
        let user = User {
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        users.insert(email.to_string(), user.clone());
        Ok(user)
    }
}
