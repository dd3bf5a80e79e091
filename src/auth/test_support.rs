//! Shared fixtures for unit tests.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use uuid::Uuid;

use super::{
    credentials::{Argon2Hasher, CredentialVerifier, HashingError, PasswordHasher},
    role::Role,
    session::{generate_session_token, hash_session_token, TokenSigner},
    store::SessionStore,
};
use crate::storage::memory::{MemoryStore, NewUser};

pub const TEST_SECRET: &str = "test-secret-with-at-least-32-characters!";

pub fn signer() -> Result<TokenSigner> {
    Ok(TokenSigner::new(SecretString::from(TEST_SECRET.to_string()))?)
}

/// Argon2id with the smallest accepted costs.
pub fn cheap_hasher() -> Result<Argon2Hasher> {
    Argon2Hasher::with_params(1024, 1, 1)
}

pub fn cheap_verifier() -> Result<CredentialVerifier> {
    Ok(CredentialVerifier::new(Arc::new(cheap_hasher()?)))
}

/// Insert a user with a credential account holding `password`.
pub fn seed_user(
    store: &Arc<MemoryStore>,
    role: Role,
    password: &str,
    must_change_password: bool,
) -> Result<Uuid> {
    let hash = cheap_hasher()?.hash(password)?;
    let tag = Uuid::new_v4().simple().to_string();
    Ok(store.add_user(NewUser {
        email: format!("{}.{}@homex.dev", role.as_str().to_lowercase(), &tag[..8]),
        name: format!("{role} {}", &tag[..4]),
        role,
        must_change_password,
        password_hash: Some(hash),
        image: None,
    }))
}

/// Create a session for `user_id` and return the signed cookie value.
pub async fn open_session(store: &Arc<MemoryStore>, user_id: Uuid) -> Result<String> {
    let token = generate_session_token()?;
    store
        .create_session(user_id, &hash_session_token(&token), 3600)
        .await?;
    signer()?.sign(&token)
}

/// Argon2 hasher that counts calls.
pub struct CountingHasher {
    inner: Argon2Hasher,
    hashes: AtomicUsize,
    verifies: AtomicUsize,
}

impl CountingHasher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: cheap_hasher()?,
            hashes: AtomicUsize::new(0),
            verifies: AtomicUsize::new(0),
        })
    }

    pub fn hash_calls(&self) -> usize {
        self.hashes.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verifies.load(Ordering::SeqCst)
    }
}

impl PasswordHasher for CountingHasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashingError> {
        self.hashes.fetch_add(1, Ordering::SeqCst);
        self.inner.hash(plaintext)
    }

    fn verify(&self, stored_hash: &str, plaintext: &str) -> Result<bool, HashingError> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(stored_hash, plaintext)
    }
}
