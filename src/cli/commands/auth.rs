use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::config::{DEFAULT_BASE_URL, DEFAULT_SESSION_TTL_SECONDS};

pub const ARG_AUTH_SECRET: &str = "auth-secret";
pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_PROTECTED_PREFIXES: &str = "protected-prefixes";

#[derive(Debug)]
pub struct Options {
    pub auth_secret: SecretString,
    pub base_url: String,
    pub session_ttl_seconds: i64,
    pub protected_prefixes: Vec<String>,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let auth_secret = matches
            .get_one::<String>(ARG_AUTH_SECRET)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_AUTH_SECRET}"))?;

        let protected_prefixes: Vec<String> = matches
            .get_many::<String>(ARG_PROTECTED_PREFIXES)
            .map(|values| {
                values
                    .map(|v| v.trim().trim_end_matches('/').to_string())
                    .filter(|v| v.starts_with('/'))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            auth_secret: SecretString::from(auth_secret),
            base_url: matches
                .get_one::<String>(ARG_BASE_URL)
                .cloned()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_SESSION_TTL_SECONDS),
            protected_prefixes,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUTH_SECRET)
                .long(ARG_AUTH_SECRET)
                .help("Secret used to sign session cookies (at least 32 characters)")
                .env("HOMEX_AUTH_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_BASE_URL)
                .long(ARG_BASE_URL)
                .help("Public base URL; https enables Secure cookies")
                .env("HOMEX_BASE_URL")
                .default_value(DEFAULT_BASE_URL),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("HOMEX_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_PROTECTED_PREFIXES)
                .long(ARG_PROTECTED_PREFIXES)
                .help("Comma separated path prefixes that require a session cookie")
                .env("HOMEX_PROTECTED_PREFIXES")
                .value_delimiter(',')
                .default_value("/admin,/operator"),
        )
}
