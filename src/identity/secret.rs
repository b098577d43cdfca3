//! Token signing secret and its one-time provisioning from an external secret store.
//!
//! The secret is fetched once at process start. Any failure here is fatal: the process
//! must not come up without a usable secret.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::error::FatalError;

/// Opaque, immutable signing secret. Clones share the same bytes.
#[derive(Clone)]
pub struct SigningSecret {
    bytes: Arc<[u8]>,
}

impl SigningSecret {
    /// Rejects an empty secret: an HMAC keyed with nothing authenticates nothing.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, FatalError> {
        let bytes: Vec<u8> = bytes.into();
        if bytes.is_empty() {
            return Err(FatalError::SecretUnavailable("empty signing secret".into()));
        }
        Ok(Self { bytes: Arc::from(bytes) })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecret").field("len", &self.bytes.len()).finish_non_exhaustive()
    }
}

/// External secret store. Returns the raw secret string for an id, or `None` if no such secret.
pub trait SecretStore: Send + Sync {
    fn get_secret_string(&self, secret_id: &str) -> Result<Option<String>, FatalError>;
}

/// Secrets as `<root>/<secret_id>.json` files.
pub struct FileSecretStore {
    pub root: PathBuf,
}

impl FileSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }
}

impl SecretStore for FileSecretStore {
    fn get_secret_string(&self, secret_id: &str) -> Result<Option<String>, FatalError> {
        if secret_id.is_empty() || secret_id.contains(['/', '\\']) || secret_id.starts_with('.') {
            return Err(FatalError::SecretUnavailable(format!("invalid secret id '{}'", secret_id)));
        }
        let path = self.root.join(format!("{}.json", secret_id));
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FatalError::SecretUnavailable(format!("reading {}: {}", path.display(), e))),
        }
    }
}

/// Secrets held in environment variables named by the secret id.
#[derive(Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get_secret_string(&self, secret_id: &str) -> Result<Option<String>, FatalError> {
        match std::env::var(secret_id) {
            Ok(v) => Ok(Some(v)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(FatalError::SecretUnavailable(format!("env {}: {}", secret_id, e))),
        }
    }
}

/// Fetch `secret_id` from the store, parse it as a JSON object of strings and take `field`.
pub fn load_signing_secret(
    store: &dyn SecretStore,
    secret_id: &str,
    field: &str,
) -> Result<SigningSecret, FatalError> {
    let raw = store
        .get_secret_string(secret_id)?
        .ok_or_else(|| FatalError::SecretUnavailable(format!("secret '{}' not found", secret_id)))?;
    let map: HashMap<String, String> = serde_json::from_str(&raw)
        .map_err(|e| FatalError::SecretUnavailable(format!("secret '{}' is not a JSON string map: {}", secret_id, e)))?;
    let value = map
        .get(field)
        .ok_or_else(|| FatalError::SecretUnavailable(format!("field '{}' missing from secret '{}'", field, secret_id)))?;
    let secret = SigningSecret::new(value.as_bytes())?;
    info!(target: "startup", secret_id, field, "signing secret loaded");
    Ok(secret)
}
