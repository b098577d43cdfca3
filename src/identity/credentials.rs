use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

use crate::error::FatalError;

/// One-way password hashing (Argon2id, default parameters) and verification.
pub struct CredentialManager {
    argon2: Argon2<'static>,
    // Verified against when the user does not exist, so that path costs the same as a mismatch.
    dummy_hash: String,
}

impl CredentialManager {
    pub fn new() -> Result<Self, FatalError> {
        let argon2 = Argon2::default();
        let dummy_hash = hash_with(&argon2, "feedgate-absent-user")?;
        Ok(Self { argon2, dummy_hash })
    }

    /// Salted PHC string. An error means the RNG or the hasher is broken; never store a fallback.
    pub fn hash(&self, password: &str) -> Result<String, FatalError> {
        hash_with(&self.argon2, password)
    }

    /// False for a mismatch and for an unparsable stored hash alike.
    pub fn verify(&self, hash: &str, candidate: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2.verify_password(candidate.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// Burn one verification for a credential that has no stored hash. Always false.
    pub fn verify_absent(&self, candidate: &str) -> bool {
        let _ = self.verify(&self.dummy_hash, candidate);
        false
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> Result<String, FatalError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| FatalError::HashingFailure(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| FatalError::HashingFailure(e.to_string()))?;
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| FatalError::HashingFailure(e.to_string()))?
        .to_string();
    Ok(phc)
}
