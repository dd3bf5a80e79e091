//! Runtime settings shared by the auth workflows and the HTTP layer.

use super::{edge::DEFAULT_PROTECTED_PREFIXES, session::SESSION_COOKIE_NAME};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    session_ttl_seconds: i64,
    cookie_name: String,
    protected_prefixes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL.to_string())
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_name: SESSION_COOKIE_NAME.to_string(),
            protected_prefixes: DEFAULT_PROTECTED_PREFIXES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: String) -> Self {
        self.cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_protected_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.protected_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn protected_prefixes(&self) -> &[String] {
        &self.protected_prefixes
    }

    /// Only mark cookies secure when the site is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}
