//! Signup and login flows over the credential store.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::UserError;
use crate::identity::{CredentialManager, TokenCodec};
use crate::store::{CredentialStore, User};

pub struct UserService {
    store: Arc<dyn CredentialStore>,
    credentials: CredentialManager,
    codec: TokenCodec,
}

impl UserService {
    pub fn new(store: Arc<dyn CredentialStore>, credentials: CredentialManager, codec: TokenCodec) -> Self {
        Self { store, credentials, codec }
    }

    /// Register a new user and return it with a fresh token.
    pub fn create(&self, email: &str, password: &str) -> Result<(User, String), UserError> {
        if self.store.get(email)?.is_some() {
            debug!(target: "users", email, "signup rejected: exists");
            return Err(UserError::AlreadyExists);
        }
        let hash = self.credentials.hash(password)?;
        // Token first: nothing is persisted if signing fails.
        let token = self.codec.issue(email)?;
        let user = self.store.create(email, &hash)?;
        info!(target: "users", email, "user created");
        Ok((user, token))
    }

    /// Unknown email and wrong password are the same `Unauthorized`.
    pub fn login(&self, email: &str, password: &str) -> Result<(User, String), UserError> {
        let Some(user) = self.store.get(email)? else {
            self.credentials.verify_absent(password);
            debug!(target: "users", email, "login rejected");
            return Err(UserError::Unauthorized);
        };
        if !self.credentials.verify(&user.password_hash, password) {
            debug!(target: "users", email, "login rejected");
            return Err(UserError::Unauthorized);
        }
        let token = self.codec.issue(email)?;
        info!(target: "users", email, "login ok");
        Ok((user, token))
    }

    pub fn get(&self, email: &str) -> Result<Option<User>, UserError> {
        Ok(self.store.get(email)?)
    }
}
