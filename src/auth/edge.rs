//! Cookie-only request gate that runs before any page handler.
//!
//! The check is optimistic: a present cookie is necessary but not sufficient.
//! A forged or stale cookie passes here and is rejected later when the session
//! is resolved. The filter never touches the session store or the database.

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::debug;
use url::form_urlencoded;

use super::role::SIGNIN_PATH;
use super::session::read_cookie;

/// Header carrying the original request path to downstream layouts.
pub const PATHNAME_HEADER: HeaderName = HeaderName::from_static("x-pathname");

pub const DEFAULT_PROTECTED_PREFIXES: [&str; 2] = ["/admin", "/operator"];

const SKIPPED_PREFIXES: [&str; 4] = ["/api", "/static", "/favicon.ico", "/logo-"];
const SKIPPED_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".svg"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeDecision {
    /// Let the request through, annotated with its path.
    Continue { pathname: String },
    /// Send the visitor to sign in, remembering where they were going.
    Redirect { location: String },
}

#[derive(Clone, Debug)]
pub struct EdgeFilter {
    protected_prefixes: Vec<String>,
    cookie_name: String,
}

impl EdgeFilter {
    #[must_use]
    pub fn new(protected_prefixes: Vec<String>, cookie_name: String) -> Self {
        Self {
            protected_prefixes,
            cookie_name,
        }
    }

    /// Paths the filter runs on. API routes and static assets are skipped.
    #[must_use]
    pub fn applies_to(&self, path: &str) -> bool {
        !(SKIPPED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
            || SKIPPED_EXTENSIONS.iter().any(|ext| path.ends_with(ext)))
    }

    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    #[must_use]
    pub fn filter(&self, path: &str, has_session_cookie: bool) -> EdgeDecision {
        if !has_session_cookie && self.is_protected(path) {
            return EdgeDecision::Redirect {
                location: signin_url(path),
            };
        }
        EdgeDecision::Continue {
            pathname: path.to_string(),
        }
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}

/// `/signin?callbackUrl=<path>` with the path form-encoded.
#[must_use]
pub fn signin_url(callback: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("callbackUrl", callback)
        .finish();
    format!("{SIGNIN_PATH}?{query}")
}

/// Middleware wrapping [`EdgeFilter::filter`].
pub async fn gate(State(edge): State<Arc<EdgeFilter>>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !edge.applies_to(&path) {
        return next.run(request).await;
    }

    let has_cookie = read_cookie(request.headers(), edge.cookie_name()).is_some();
    match edge.filter(&path, has_cookie) {
        EdgeDecision::Redirect { location } => {
            debug!("edge redirect for protected path {path}");
            Redirect::temporary(&location).into_response()
        }
        EdgeDecision::Continue { pathname } => {
            match HeaderValue::from_str(&pathname) {
                Ok(value) => {
                    request.headers_mut().insert(PATHNAME_HEADER, value);
                }
                Err(err) => debug!("skipping pathname header: {err}"),
            }
            next.run(request).await
        }
    }
}
