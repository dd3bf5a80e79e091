//! Collaborator interfaces for session and account persistence.
//!
//! The auth core never talks to a database directly. A backend implements
//! [`SessionStore`] for server-side sessions and [`PersistenceLayer`] for user
//! and credential records, including an explicit transaction handle for
//! multi-record writes.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::role::Role;
use super::session::Session;

/// Account provider kinds; only `credential` accounts carry a password hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Credential,
    External(String),
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Credential => "credential",
            Self::External(provider) => provider,
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Self {
        if value == "credential" {
            Self::Credential
        } else {
            Self::External(value.to_string())
        }
    }
}

/// Account row linked to a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub provider: ProviderKind,
    pub password_hash: Option<String>,
}

/// Minimal fields needed to sign a user in.
#[derive(Clone, Debug)]
pub struct LoginRecord {
    pub user_id: Uuid,
    pub role: Role,
    pub must_change_password: bool,
    pub password_hash: String,
}

/// Columns the password change writes on the user row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserRecordUpdate {
    pub password_hash: Option<String>,
    pub must_change_password: Option<bool>,
}

/// Columns the password change writes on the credential row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecordUpdate {
    pub password_hash: String,
}

/// Server-side session storage keyed by the SHA-256 of the session token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the live session for `token_hash`; expired or revoked sessions
    /// resolve to `None`.
    async fn get_session(&self, token_hash: &[u8]) -> Result<Option<Session>>;

    async fn create_session(&self, user_id: Uuid, token_hash: &[u8], ttl_seconds: i64)
        -> Result<()>;

    async fn delete_session(&self, token_hash: &[u8]) -> Result<()>;
}

/// User and account persistence.
#[async_trait]
pub trait PersistenceLayer: Send + Sync {
    /// Look up the `credential` account for a normalized email.
    async fn find_login_record(&self, email: &str) -> Result<Option<LoginRecord>>;

    async fn find_credential_record(
        &self,
        user_id: Uuid,
        provider: &ProviderKind,
    ) -> Result<Option<CredentialRecord>>;

    /// Open a transaction. Dropping the handle without [`PersistenceTx::commit`]
    /// discards every staged write.
    async fn begin(&self) -> Result<Box<dyn PersistenceTx>>;

    /// Cheap liveness check for `/health`.
    async fn ping(&self) -> Result<()>;
}

/// Writes staged inside one all-or-nothing transaction.
#[async_trait]
pub trait PersistenceTx: Send {
    async fn update_user_record(&mut self, user_id: Uuid, update: &UserRecordUpdate)
        -> Result<()>;

    async fn update_credential_record(
        &mut self,
        credential_id: Uuid,
        update: &CredentialRecordUpdate,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_maps_credential_literal() {
        assert_eq!(ProviderKind::from_db("credential"), ProviderKind::Credential);
        assert_eq!(
            ProviderKind::from_db("google"),
            ProviderKind::External("google".to_string())
        );
        assert_eq!(ProviderKind::Credential.as_str(), "credential");
        assert_eq!(ProviderKind::External("github".to_string()).as_str(), "github");
    }
}
