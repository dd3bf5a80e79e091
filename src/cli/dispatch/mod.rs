//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, ARG_DSN, ARG_PORT};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        auth_secret: auth_opts.auth_secret,
        base_url: auth_opts.base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        protected_prefixes: auth_opts.protected_prefixes,
    }))
}
