//! Infrastructure failures raised inside the auth core.
//!
//! Caller-facing results (gate decisions, sign-in and password change outcomes)
//! are tagged enums in their own modules; this type only covers collaborators
//! that failed underneath them. The detail is for server logs only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing is unavailable: {0:#}")]
    HashingUnavailable(anyhow::Error),
    #[error("session store failure: {0:#}")]
    SessionStore(anyhow::Error),
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}
