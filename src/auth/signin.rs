//! Email + password sign-in.
//!
//! Every credential failure (unknown email, no password on file, wrong
//! password) collapses into [`SignInOutcome::InvalidCredentials`] so the
//! response never tells which part was wrong.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use super::{
    credentials::CredentialVerifier,
    error::AuthError,
    policy::{Field, FieldErrors},
    role::CHANGE_PASSWORD_PATH,
    session::{generate_session_token, hash_session_token, TokenSigner},
    store::{PersistenceLayer, SessionStore},
};

pub const MSG_EMAIL_REQUIRED: &str = "Email is required";
pub const MSG_EMAIL_INVALID: &str = "Invalid email address";
pub const MSG_PASSWORD_REQUIRED: &str = "Password is required";
pub const MSG_INVALID_CREDENTIALS: &str = "Invalid email or password";

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Only same-origin absolute paths are accepted as post sign-in targets.
#[must_use]
pub fn safe_local_path(candidate: &str) -> Option<&str> {
    let is_local = candidate.starts_with('/')
        && !candidate.starts_with("//")
        && !candidate.contains('\\');
    is_local.then_some(candidate)
}

pub struct SignInInput {
    pub email: String,
    pub password: SecretString,
    pub callback_url: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SignInOutcome {
    SignedIn {
        cookie_value: String,
        redirect_to: String,
    },
    ValidationFailed(FieldErrors),
    InvalidCredentials,
    HashingUnavailable,
    StoreUnavailable,
}

impl From<AuthError> for SignInOutcome {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::HashingUnavailable(_) => Self::HashingUnavailable,
            AuthError::SessionStore(_) | AuthError::Persistence(_) => Self::StoreUnavailable,
        }
    }
}

pub struct SignInWorkflow {
    verifier: CredentialVerifier,
    persistence: Arc<dyn PersistenceLayer>,
    sessions: Arc<dyn SessionStore>,
    signer: TokenSigner,
    session_ttl_seconds: i64,
}

impl SignInWorkflow {
    #[must_use]
    pub fn new(
        verifier: CredentialVerifier,
        persistence: Arc<dyn PersistenceLayer>,
        sessions: Arc<dyn SessionStore>,
        signer: TokenSigner,
        session_ttl_seconds: i64,
    ) -> Self {
        Self {
            verifier,
            persistence,
            sessions,
            signer,
            session_ttl_seconds,
        }
    }

    #[instrument(skip_all)]
    pub async fn execute(&self, input: SignInInput) -> SignInOutcome {
        match self.run(input).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Sign-in failed: {err}");
                err.into()
            }
        }
    }

    async fn run(&self, input: SignInInput) -> Result<SignInOutcome, AuthError> {
        let email = normalize_email(&input.email);
        let mut errors = FieldErrors::new();
        if email.is_empty() {
            errors.push(Field::Email, MSG_EMAIL_REQUIRED);
        } else if !valid_email(&email) {
            errors.push(Field::Email, MSG_EMAIL_INVALID);
        }
        if input.password.expose_secret().is_empty() {
            errors.push(Field::Password, MSG_PASSWORD_REQUIRED);
        }
        if !errors.is_empty() {
            return Ok(SignInOutcome::ValidationFailed(errors));
        }

        let Some(record) = self
            .persistence
            .find_login_record(&email)
            .await
            .map_err(AuthError::Persistence)?
        else {
            debug!("sign-in for unknown email");
            return Ok(SignInOutcome::InvalidCredentials);
        };

        if !self
            .verifier
            .verify(&record.password_hash, &input.password)
            .await?
        {
            debug!(user_id = %record.user_id, "sign-in password mismatch");
            return Ok(SignInOutcome::InvalidCredentials);
        }

        let token = generate_session_token().map_err(AuthError::SessionStore)?;
        self.sessions
            .create_session(
                record.user_id,
                &hash_session_token(&token),
                self.session_ttl_seconds,
            )
            .await
            .map_err(AuthError::SessionStore)?;
        let cookie_value = self.signer.sign(&token).map_err(AuthError::SessionStore)?;

        let redirect_to = if record.must_change_password {
            CHANGE_PASSWORD_PATH.to_string()
        } else {
            input
                .callback_url
                .as_deref()
                .and_then(safe_local_path)
                .unwrap_or(record.role.home_path())
                .to_string()
        };

        info!(user_id = %record.user_id, role = %record.role, "signed in");
        Ok(SignInOutcome::SignedIn {
            cookie_value,
            redirect_to,
        })
    }
}
