//! Session tokens, cookie evidence, and per-request session resolution.
//!
//! Flow Overview: the cookie value is `token.signature`. The signature is
//! checked first (HMAC-SHA256 over the raw token); only then is the SHA-256 of
//! the token looked up in the [`SessionStore`]. Raw tokens are never stored.
//!
//! [`RequestSession`] memoizes the lookup for one request: every call site in
//! the request observes one store round trip and the same `Arc<Session>`.

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{Request, State},
    http::{header::COOKIE, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{error::AuthError, role::Role, store::SessionStore};

pub const SESSION_COOKIE_NAME: &str = "homex.session_token";
pub const MIN_SECRET_LENGTH: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Server-attested identity for the current actor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub must_change_password: bool,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

/// Signs and verifies session cookie values.
#[derive(Clone)]
pub struct TokenSigner {
    secret: SecretString,
}

#[derive(Debug, thiserror::Error)]
#[error("auth secret must be at least {MIN_SECRET_LENGTH} characters")]
pub struct SecretTooShort;

impl TokenSigner {
    /// # Errors
    /// Returns [`SecretTooShort`] when the secret has fewer than 32 characters.
    pub fn new(secret: SecretString) -> Result<Self, SecretTooShort> {
        if secret.expose_secret().chars().count() < MIN_SECRET_LENGTH {
            return Err(SecretTooShort);
        }
        Ok(Self { secret })
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|err| anyhow!("invalid hmac key: {err}"))
    }

    /// Build the cookie value for a raw token.
    ///
    /// # Errors
    /// Returns an error if the MAC cannot be initialized.
    pub fn sign(&self, token: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(token.as_bytes());
        let signature = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
        Ok(format!("{token}.{signature}"))
    }

    /// Return the raw token when the signature matches.
    #[must_use]
    pub fn verify<'a>(&self, cookie_value: &'a str) -> Option<&'a str> {
        let (token, signature) = cookie_value.rsplit_once('.')?;
        if token.is_empty() {
            return None;
        }
        let signature = Base64UrlUnpadded::decode_vec(signature).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(token)
    }
}

/// Create a new random session token.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a session token so raw values never touch the store.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Read a non-empty cookie value from the request headers.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

/// Resolves cookie evidence into a [`Session`] through the session store.
pub struct SessionResolver {
    store: Arc<dyn SessionStore>,
    signer: TokenSigner,
    cookie_name: String,
}

impl SessionResolver {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, signer: TokenSigner, cookie_name: String) -> Self {
        Self {
            store,
            signer,
            cookie_name,
        }
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Store key for a signed cookie value, if the signature holds.
    #[must_use]
    pub fn token_hash(&self, evidence: &str) -> Option<Vec<u8>> {
        self.signer.verify(evidence).map(hash_session_token)
    }

    /// # Errors
    /// Returns [`AuthError::SessionStore`] if the store lookup fails.
    #[instrument(skip_all)]
    pub async fn resolve(&self, evidence: Option<&str>) -> Result<Option<Session>, AuthError> {
        let Some(evidence) = evidence else {
            return Ok(None);
        };
        let Some(token_hash) = self.token_hash(evidence) else {
            debug!("session cookie failed signature check");
            return Ok(None);
        };
        self.store
            .get_session(&token_hash)
            .await
            .map_err(AuthError::SessionStore)
    }
}

enum Slot {
    Pending,
    Resolved(Option<Arc<Session>>),
}

struct RequestSessionInner {
    resolver: Arc<SessionResolver>,
    evidence: Option<String>,
    slot: Mutex<Slot>,
}

/// Session memo scoped to a single request.
///
/// Cloning shares the memo; a new request always starts with a fresh one.
#[derive(Clone)]
pub struct RequestSession {
    inner: Arc<RequestSessionInner>,
}

impl RequestSession {
    #[must_use]
    pub fn new(resolver: Arc<SessionResolver>, evidence: Option<String>) -> Self {
        Self {
            inner: Arc::new(RequestSessionInner {
                resolver,
                evidence,
                slot: Mutex::new(Slot::Pending),
            }),
        }
    }

    /// Raw cookie value presented with the request.
    #[must_use]
    pub fn evidence(&self) -> Option<&str> {
        self.inner.evidence.as_deref()
    }

    #[must_use]
    pub fn resolver(&self) -> &SessionResolver {
        &self.inner.resolver
    }

    /// Resolve once per request; later calls return the memoized value.
    ///
    /// Store failures are not memoized.
    ///
    /// # Errors
    /// Returns [`AuthError::SessionStore`] if the store lookup fails.
    pub async fn resolve(&self) -> Result<Option<Arc<Session>>, AuthError> {
        let mut slot = self.inner.slot.lock().await;
        if let Slot::Resolved(session) = &*slot {
            return Ok(session.clone());
        }
        let session = self
            .inner
            .resolver
            .resolve(self.evidence())
            .await?
            .map(Arc::new);
        *slot = Slot::Resolved(session.clone());
        Ok(session)
    }

    /// Clear the forced-change flag on the memoized session after a completed
    /// password change, so the rest of the request does not loop back.
    pub async fn mark_password_changed(&self) {
        let mut slot = self.inner.slot.lock().await;
        if let Slot::Resolved(Some(session)) = &*slot {
            let mut refreshed = Session::clone(session);
            refreshed.must_change_password = false;
            *slot = Slot::Resolved(Some(Arc::new(refreshed)));
        }
    }
}

/// Middleware: attach a fresh [`RequestSession`] to every request.
pub async fn attach(
    State(resolver): State<Arc<SessionResolver>>,
    mut request: Request,
    next: Next,
) -> Response {
    let evidence = read_cookie(request.headers(), resolver.cookie_name());
    request
        .extensions_mut()
        .insert(RequestSession::new(resolver, evidence));
    next.run(request).await
}
