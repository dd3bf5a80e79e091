//! Password hashing capability and the async verifier wrapped around it.
//!
//! The hashing primitive is pluggable through [`PasswordHasher`]; production
//! uses Argon2id in PHC string format. Hashing is CPU bound, so the verifier
//! runs it on the blocking pool.

use anyhow::anyhow;
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use super::error::AuthError;

#[derive(Debug, Error)]
pub enum HashingError {
    #[error("stored password hash is malformed")]
    MalformedHash,
    #[error("password hashing failed: {0}")]
    Failed(String),
}

/// External password hashing primitive.
pub trait PasswordHasher: Send + Sync {
    /// Produce a new self-describing hash for `plaintext`.
    ///
    /// # Errors
    /// Returns an error if the primitive fails.
    fn hash(&self, plaintext: &str) -> Result<String, HashingError>;

    /// Check `plaintext` against a hash previously produced by [`Self::hash`].
    ///
    /// # Errors
    /// Returns an error if the stored hash cannot be parsed or the primitive fails.
    fn verify(&self, stored_hash: &str, plaintext: &str) -> Result<bool, HashingError>;
}

/// Argon2id hasher emitting PHC strings.
#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a hasher with explicit cost parameters.
    ///
    /// # Errors
    /// Returns an error if the parameters are outside Argon2's accepted ranges.
    pub fn with_params(m_cost_kib: u32, t_cost: u32, p_cost: u32) -> anyhow::Result<Self> {
        let params = Params::new(m_cost_kib, t_cost, p_cost, None)
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashingError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| HashingError::Failed(err.to_string()))
    }

    fn verify(&self, stored_hash: &str, plaintext: &str) -> Result<bool, HashingError> {
        let parsed = PasswordHash::new(stored_hash).map_err(|_| HashingError::MalformedHash)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(HashingError::Failed(err.to_string())),
        }
    }
}

/// Async front for a [`PasswordHasher`]; every failure becomes
/// [`AuthError::HashingUnavailable`].
#[derive(Clone)]
pub struct CredentialVerifier {
    hasher: Arc<dyn PasswordHasher>,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { hasher }
    }

    /// # Errors
    /// Returns [`AuthError::HashingUnavailable`] if the hasher fails.
    #[instrument(skip_all)]
    pub async fn verify(
        &self,
        stored_hash: &str,
        candidate: &SecretString,
    ) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let stored_hash = stored_hash.to_string();
        let candidate = candidate.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&stored_hash, candidate.expose_secret()))
            .await
            .map_err(|err| AuthError::HashingUnavailable(anyhow!(err)))?
            .map_err(|err| AuthError::HashingUnavailable(anyhow!(err)))
    }

    /// # Errors
    /// Returns [`AuthError::HashingUnavailable`] if the hasher fails.
    #[instrument(skip_all)]
    pub async fn hash(&self, plaintext: &SecretString) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let plaintext = plaintext.clone();
        tokio::task::spawn_blocking(move || hasher.hash(plaintext.expose_secret()))
            .await
            .map_err(|err| AuthError::HashingUnavailable(anyhow!(err)))?
            .map_err(|err| AuthError::HashingUnavailable(anyhow!(err)))
    }
}
