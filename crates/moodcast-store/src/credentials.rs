//! Credential hashing capability.
//!
//! The synchronizer never sees a hashing algorithm directly; it is handed a
//! `CredentialHasher` at construction. `Argon2Hasher` produces PHC-format
//! strings (`$argon2id$v=19$...`) that are stored as the user's digest.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::backend::{StoreError, StoreResult};

/// Salted one-way hashing of user credentials.
pub trait CredentialHasher: Send + Sync {
    /// Hash a plaintext credential into a storable digest.
    fn hash(&self, plain: &str) -> StoreResult<String>;

    /// Check a plaintext credential against a stored digest.
    ///
    /// A malformed or empty digest never verifies.
    fn verify(&self, plain: &str, digest: &str) -> bool;
}

/// Argon2id with the crate's default parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> StoreResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| StoreError::Credential(format!("Failed to hash credential: {}", e)))
    }

    fn verify(&self, plain: &str, digest: &str) -> bool {
        if digest.is_empty() {
            return false;
        }
        match PasswordHash::new(digest) {
            Ok(parsed) => Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!("Stored credential digest is malformed: {}", e);
                false
            }
        }
    }
}
