use crate::{
    api,
    auth::{config::AuthConfig, session::TokenSigner},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub auth_secret: SecretString,
    pub base_url: String,
    pub session_ttl_seconds: i64,
    pub protected_prefixes: Vec<String>,
}

impl Args {
    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.base_url.clone())
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_protected_prefixes(self.protected_prefixes.clone())
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the auth secret is too short or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let signer = TokenSigner::new(args.auth_secret.clone()).context("Invalid --auth-secret")?;
    let config = args.auth_config();

    debug!("Auth config: {:?}", config);

    let result = api::new(args.port, args.dsn, config, signer).await;

    crate::cli::telemetry::shutdown_tracer();

    result
}
