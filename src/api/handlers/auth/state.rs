//! Shared auth state handed to every handler through an `Extension`.

use std::sync::Arc;

use crate::auth::{
    config::AuthConfig,
    credentials::{CredentialVerifier, PasswordHasher},
    edge::EdgeFilter,
    password_change::PasswordChangeWorkflow,
    session::{SessionResolver, TokenSigner},
    signin::SignInWorkflow,
    store::{PersistenceLayer, SessionStore},
};

pub struct AuthState {
    config: AuthConfig,
    resolver: Arc<SessionResolver>,
    edge: Arc<EdgeFilter>,
    sessions: Arc<dyn SessionStore>,
    persistence: Arc<dyn PersistenceLayer>,
    signin: SignInWorkflow,
    password_change: PasswordChangeWorkflow,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        signer: TokenSigner,
        hasher: Arc<dyn PasswordHasher>,
        sessions: Arc<dyn SessionStore>,
        persistence: Arc<dyn PersistenceLayer>,
    ) -> Self {
        let verifier = CredentialVerifier::new(hasher);
        let resolver = Arc::new(SessionResolver::new(
            Arc::clone(&sessions),
            signer.clone(),
            config.cookie_name().to_string(),
        ));
        let edge = Arc::new(EdgeFilter::new(
            config.protected_prefixes().to_vec(),
            config.cookie_name().to_string(),
        ));
        let signin = SignInWorkflow::new(
            verifier.clone(),
            Arc::clone(&persistence),
            Arc::clone(&sessions),
            signer,
            config.session_ttl_seconds(),
        );
        let password_change = PasswordChangeWorkflow::new(verifier, Arc::clone(&persistence));
        Self {
            config,
            resolver,
            edge,
            sessions,
            persistence,
            signin,
            password_change,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> Arc<SessionResolver> {
        Arc::clone(&self.resolver)
    }

    #[must_use]
    pub fn edge(&self) -> Arc<EdgeFilter> {
        Arc::clone(&self.edge)
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn persistence(&self) -> &dyn PersistenceLayer {
        self.persistence.as_ref()
    }

    #[must_use]
    pub fn signin(&self) -> &SignInWorkflow {
        &self.signin
    }

    #[must_use]
    pub fn password_change(&self) -> &PasswordChangeWorkflow {
        &self.password_change
    }
}
