//! Process configuration, read once from the environment at startup.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::identity::{load_signing_secret, EnvSecretStore, FileSecretStore, SecretStore, SigningSecret};

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_SECRETS_DIR: &str = "secrets";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretStoreKind {
    File(PathBuf),
    Env,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_port: u16,
    pub jwt_secret_id: String,
    pub jwt_secret_field: String,
    pub secret_store: SecretStoreKind,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`ServerConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self> {
        let http_port = match get("FEEDGATE_HTTP_PORT") {
            Some(p) => p.trim().parse::<u16>().with_context(|| format!("invalid FEEDGATE_HTTP_PORT '{}'", p))?,
            None => DEFAULT_HTTP_PORT,
        };
        let jwt_secret_id = required(&get, "JWT_SECRET_ID")?;
        let jwt_secret_field = required(&get, "JWT_SECRET_FIELD")?;
        let secret_store = match get("FEEDGATE_SECRET_STORE").as_deref().map(str::trim) {
            None | Some("") | Some("file") => {
                let dir = get("FEEDGATE_SECRETS_DIR").unwrap_or_else(|| DEFAULT_SECRETS_DIR.to_string());
                SecretStoreKind::File(PathBuf::from(dir))
            }
            Some("env") => SecretStoreKind::Env,
            Some(other) => return Err(anyhow!("unknown FEEDGATE_SECRET_STORE '{}' (expected file|env)", other)),
        };
        Ok(Self { http_port, jwt_secret_id, jwt_secret_field, secret_store })
    }

    pub fn secret_store(&self) -> Box<dyn SecretStore> {
        match &self.secret_store {
            SecretStoreKind::File(dir) => Box::new(FileSecretStore::new(dir.clone())),
            SecretStoreKind::Env => Box::new(EnvSecretStore),
        }
    }

    pub fn load_secret(&self) -> Result<SigningSecret> {
        let store = self.secret_store();
        let secret = load_signing_secret(store.as_ref(), &self.jwt_secret_id, &self.jwt_secret_field)?;
        Ok(secret)
    }
}

fn required<F: Fn(&str) -> Option<String>>(get: &F, key: &str) -> Result<String> {
    match get(key) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(anyhow!("{} must be set", key)),
    }
}
