//! Password change workflow (forced on first login, available afterwards).
//!
//! Steps run in order and stop at the first failure:
//! 1. an authenticated session is required (any role);
//! 2. the submission must satisfy the password policy;
//! 3. the user must own a `credential` account with a stored hash;
//! 4. the current password must match that hash;
//! 5. the new password is hashed;
//! 6. user row (hash mirror + forced-change flag) and credential row are
//!    rewritten in one transaction;
//! 7. the request's memoized session drops the forced-change flag.
//!
//! No failure is terminal: the form can always be submitted again.

use secrecy::SecretString;
use tracing::{error, info, instrument, warn};

use super::{
    credentials::CredentialVerifier,
    error::AuthError,
    gate::{self, Access},
    policy::{self, Field, FieldErrors},
    session::{RequestSession, Session},
    store::{CredentialRecordUpdate, PersistenceLayer, ProviderKind, UserRecordUpdate},
};
use std::sync::Arc;

pub const MSG_CHANGED: &str = "Password changed successfully";
pub const MSG_SIGN_IN: &str = "Please sign in to continue";
pub const MSG_ACCOUNT_MISCONFIGURED: &str = "Account not found or no password set";
pub const MSG_CURRENT_INCORRECT: &str = "Current password is incorrect";
pub const MSG_TRY_LATER: &str = "Unable to change password. Please try again later.";

pub struct ChangePasswordInput {
    pub current_password: SecretString,
    pub new_password: SecretString,
    pub confirm_password: SecretString,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PasswordChangeOutcome {
    Completed { redirect_to: Option<String> },
    Unauthenticated,
    ValidationFailed(FieldErrors),
    AccountMisconfigured,
    CurrentPasswordIncorrect,
    HashingUnavailable,
    PersistenceFailed,
}

impl PasswordChangeOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Messages for the form, field-scoped where a single input is at fault.
    #[must_use]
    pub fn field_errors(&self) -> FieldErrors {
        match self {
            Self::Completed { .. } => FieldErrors::new(),
            Self::ValidationFailed(errors) => errors.clone(),
            Self::CurrentPasswordIncorrect => {
                FieldErrors::single(Field::CurrentPassword, MSG_CURRENT_INCORRECT)
            }
            Self::Unauthenticated => FieldErrors::single(Field::Form, MSG_SIGN_IN),
            Self::AccountMisconfigured => {
                FieldErrors::single(Field::Form, MSG_ACCOUNT_MISCONFIGURED)
            }
            Self::HashingUnavailable | Self::PersistenceFailed => {
                FieldErrors::single(Field::Form, MSG_TRY_LATER)
            }
        }
    }
}

impl From<AuthError> for PasswordChangeOutcome {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::HashingUnavailable(_) => Self::HashingUnavailable,
            AuthError::SessionStore(_) | AuthError::Persistence(_) => Self::PersistenceFailed,
        }
    }
}

pub struct PasswordChangeWorkflow {
    verifier: CredentialVerifier,
    persistence: Arc<dyn PersistenceLayer>,
}

impl PasswordChangeWorkflow {
    #[must_use]
    pub fn new(verifier: CredentialVerifier, persistence: Arc<dyn PersistenceLayer>) -> Self {
        Self {
            verifier,
            persistence,
        }
    }

    #[instrument(skip_all)]
    pub async fn execute(
        &self,
        request: &RequestSession,
        input: ChangePasswordInput,
    ) -> PasswordChangeOutcome {
        match self.run(request, &input).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Password change failed: {err}");
                err.into()
            }
        }
    }

    /// Same as [`Self::execute`], with `redirect_to` attached on completion.
    pub async fn execute_and_redirect(
        &self,
        request: &RequestSession,
        input: ChangePasswordInput,
        redirect_to: &str,
    ) -> PasswordChangeOutcome {
        match self.execute(request, input).await {
            PasswordChangeOutcome::Completed { .. } => PasswordChangeOutcome::Completed {
                redirect_to: Some(redirect_to.to_string()),
            },
            other => other,
        }
    }

    async fn run(
        &self,
        request: &RequestSession,
        input: &ChangePasswordInput,
    ) -> Result<PasswordChangeOutcome, AuthError> {
        let session = match gate::require_authenticated(request.resolve().await?) {
            Access::Allowed(session) => session,
            Access::Unauthenticated | Access::Forbidden(_) => {
                return Ok(PasswordChangeOutcome::Unauthenticated)
            }
        };

        if let Err(errors) = policy::validate(
            &input.current_password,
            &input.new_password,
            &input.confirm_password,
        ) {
            return Ok(PasswordChangeOutcome::ValidationFailed(errors));
        }

        let account = self
            .persistence
            .find_credential_record(session.user_id, &ProviderKind::Credential)
            .await
            .map_err(AuthError::Persistence)?;
        let Some((account_id, stored_hash)) =
            account.and_then(|record| record.password_hash.map(|hash| (record.id, hash)))
        else {
            warn!(user_id = %session.user_id, "credential account missing for authenticated user");
            return Ok(PasswordChangeOutcome::AccountMisconfigured);
        };

        if !self
            .verifier
            .verify(&stored_hash, &input.current_password)
            .await?
        {
            return Ok(PasswordChangeOutcome::CurrentPasswordIncorrect);
        }

        let new_hash = self.verifier.hash(&input.new_password).await?;

        self.persist(&session, account_id, new_hash)
            .await
            .map_err(AuthError::Persistence)?;

        request.mark_password_changed().await;
        info!(user_id = %session.user_id, "password changed");

        Ok(PasswordChangeOutcome::Completed { redirect_to: None })
    }

    async fn persist(
        &self,
        session: &Session,
        account_id: uuid::Uuid,
        new_hash: String,
    ) -> anyhow::Result<()> {
        // Dropping `tx` on any early return rolls back both writes.
        let mut tx = self.persistence.begin().await?;
        tx.update_user_record(
            session.user_id,
            &UserRecordUpdate {
                password_hash: Some(new_hash.clone()),
                must_change_password: Some(false),
            },
        )
        .await?;
        tx.update_credential_record(
            account_id,
            &CredentialRecordUpdate {
                password_hash: new_hash,
            },
        )
        .await?;
        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::role::Role;
    use crate::auth::session::SessionResolver;
    use crate::auth::test_support::{
        cheap_verifier, open_session, seed_user, signer, CountingHasher,
    };
    use crate::storage::memory::MemoryStore;
    use anyhow::Result;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn input(current: &str, new: &str, confirm: &str) -> ChangePasswordInput {
        ChangePasswordInput {
            current_password: secret(current),
            new_password: secret(new),
            confirm_password: secret(confirm),
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        hasher: Arc<CountingHasher>,
        workflow: PasswordChangeWorkflow,
        request: RequestSession,
        user: uuid::Uuid,
    }

    async fn fixture(role: Role) -> Result<Fixture> {
        let store = Arc::new(MemoryStore::new());
        let user = seed_user(&store, role, "Passw0rd!", true)?;
        let cookie = open_session(&store, user).await?;
        let resolver = Arc::new(SessionResolver::new(
            store.clone(),
            signer()?,
            crate::auth::session::SESSION_COOKIE_NAME.to_string(),
        ));
        let hasher = Arc::new(CountingHasher::new()?);
        let workflow = PasswordChangeWorkflow::new(
            CredentialVerifier::new(hasher.clone()),
            store.clone(),
        );
        Ok(Fixture {
            request: RequestSession::new(resolver, Some(cookie)),
            store,
            hasher,
            workflow,
            user,
        })
    }

    #[tokio::test]
    async fn completes_and_rewrites_both_hashes() -> Result<()> {
        let fx = fixture(Role::Operator).await?;
        let outcome = fx
            .workflow
            .execute(&fx.request, input("Passw0rd!", "NewPass1", "NewPass1"))
            .await;
        assert_eq!(outcome, PasswordChangeOutcome::Completed { redirect_to: None });

        let user = fx.store.user(fx.user).ok_or_else(|| anyhow::anyhow!("user"))?;
        let account = fx
            .store
            .credential_for(fx.user)
            .ok_or_else(|| anyhow::anyhow!("account"))?;
        assert!(!user.must_change_password);
        assert_eq!(user.password_hash, account.password_hash);
        let new_hash = account.password_hash.unwrap_or_default();
        assert!(cheap_verifier()?.verify(&new_hash, &secret("NewPass1")).await?);

        // Memo and a fresh lookup both see the cleared flag.
        assert!(fx.request.resolve().await?.is_some_and(|s| !s.must_change_password));
        let fresh = RequestSession::new(
            Arc::new(SessionResolver::new(
                fx.store.clone(),
                signer()?,
                "homex.session_token".to_string(),
            )),
            fx.request.evidence().map(str::to_string),
        );
        assert!(fresh.resolve().await?.is_some_and(|s| !s.must_change_password));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_current_password_mutates_nothing() -> Result<()> {
        let fx = fixture(Role::Admin).await?;
        let before = fx.store.snapshot();
        let outcome = fx
            .workflow
            .execute(&fx.request, input("WrongPass1", "NewPass1", "NewPass1"))
            .await;
        assert_eq!(outcome, PasswordChangeOutcome::CurrentPasswordIncorrect);
        assert_eq!(
            outcome.field_errors().get(Field::CurrentPassword),
            [MSG_CURRENT_INCORRECT]
        );
        assert_eq!(fx.store.snapshot(), before);
        assert_eq!(fx.hasher.hash_calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn policy_failure_skips_lookup_and_verification() -> Result<()> {
        let fx = fixture(Role::Operator).await?;
        let outcome = fx
            .workflow
            .execute(&fx.request, input("Passw0rd!", "short1A", "short1A"))
            .await;
        let PasswordChangeOutcome::ValidationFailed(errors) = outcome else {
            anyhow::bail!("expected validation failure, got {outcome:?}");
        };
        assert_eq!(errors.get(Field::NewPassword), [policy::MSG_TOO_SHORT]);
        assert_eq!(fx.store.credential_lookups(), 0);
        assert_eq!(fx.hasher.verify_calls(), 0);
        assert_eq!(fx.hasher.hash_calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn anonymous_request_is_unauthenticated() -> Result<()> {
        let fx = fixture(Role::Client).await?;
        let anonymous = RequestSession::new(
            Arc::new(SessionResolver::new(
                fx.store.clone(),
                signer()?,
                "homex.session_token".to_string(),
            )),
            None,
        );
        let outcome = fx
            .workflow
            .execute(&anonymous, input("", "x", "y"))
            .await;
        assert_eq!(outcome, PasswordChangeOutcome::Unauthenticated);
        assert_eq!(outcome.field_errors().get(Field::Form), [MSG_SIGN_IN]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_credential_account_is_misconfigured() -> Result<()> {
        let fx = fixture(Role::Operator).await?;
        fx.store.remove_credential(fx.user);
        let outcome = fx
            .workflow
            .execute(&fx.request, input("Passw0rd!", "NewPass1", "NewPass1"))
            .await;
        assert_eq!(outcome, PasswordChangeOutcome::AccountMisconfigured);
        assert_eq!(
            outcome.field_errors().get(Field::Form),
            [MSG_ACCOUNT_MISCONFIGURED]
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_credential_write_rolls_back_user_write() -> Result<()> {
        let fx = fixture(Role::Operator).await?;
        let before = fx.store.snapshot();
        fx.store.fail_credential_updates(true);
        let outcome = fx
            .workflow
            .execute(&fx.request, input("Passw0rd!", "NewPass1", "NewPass1"))
            .await;
        assert_eq!(outcome, PasswordChangeOutcome::PersistenceFailed);
        assert_eq!(outcome.field_errors().get(Field::Form), [MSG_TRY_LATER]);
        assert_eq!(fx.store.snapshot(), before);
        assert!(fx.request.resolve().await?.is_some_and(|s| s.must_change_password));
        Ok(())
    }

    #[tokio::test]
    async fn redirect_variant_attaches_target_on_completion_only() -> Result<()> {
        let fx = fixture(Role::Admin).await?;
        let failed = fx
            .workflow
            .execute_and_redirect(&fx.request, input("WrongPass1", "NewPass1", "NewPass1"), "/admin")
            .await;
        assert_eq!(failed, PasswordChangeOutcome::CurrentPasswordIncorrect);

        let done = fx
            .workflow
            .execute_and_redirect(&fx.request, input("Passw0rd!", "NewPass1", "NewPass1"), "/admin")
            .await;
        assert_eq!(
            done,
            PasswordChangeOutcome::Completed {
                redirect_to: Some("/admin".to_string())
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn workflow_is_re_enterable_after_failure() -> Result<()> {
        let fx = fixture(Role::Operator).await?;
        let first = fx
            .workflow
            .execute(&fx.request, input("Passw0rd!", "nope", "nope"))
            .await;
        assert!(!first.is_completed());
        let second = fx
            .workflow
            .execute(&fx.request, input("Passw0rd!", "NewPass1", "NewPass1"))
            .await;
        assert!(second.is_completed());
        Ok(())
    }
}
