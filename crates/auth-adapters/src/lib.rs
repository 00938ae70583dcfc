//! # auth-adapters
//!
//! Argon2-based implementation of `CredentialHasher`.
//! Hashing is CPU-bound, so it runs on the blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use domains::{CredentialHasher, DomainError, DomainResult};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
enum HashError {
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),

    #[error("hashing task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<HashError> for DomainError {
    fn from(err: HashError) -> Self {
        DomainError::Internal(err.to_string())
    }
}

/// Produces PHC strings (`$argon2id$v=19$...`) with a fresh random salt each time.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

impl Argon2Hasher {
    pub fn new() -> Self {
        Self
    }

    fn hash_blocking(password: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(HashError::Hash)
    }

    fn verify_blocking(password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[async_trait]
impl CredentialHasher for Argon2Hasher {
    async fn hash(&self, password: &str) -> DomainResult<String> {
        let password = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || Self::hash_blocking(&password))
            .await
            .map_err(HashError::from)??;
        debug!("credential hashed");
        Ok(hash)
    }

    /// Malformed hashes and panicked tasks both count as a mismatch.
    async fn verify(&self, password: &str, hash: &str) -> bool {
        let (password, hash) = (password.to_owned(), hash.to_owned());
        tokio::task::spawn_blocking(move || Self::verify_blocking(&password, &hash))
            .await
            .unwrap_or(false)
    }
}
