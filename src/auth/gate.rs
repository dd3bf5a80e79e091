//! Role-based authorization decisions.
//!
//! The gate is pure: it never redirects or logs. Callers map each [`Access`]
//! variant to their own response, e.g. the admin layout sends `Forbidden` to
//! the operator home rather than to an error page.

use std::sync::Arc;

use super::role::{Role, RoleSet};
use super::session::Session;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Allowed(Arc<Session>),
    Unauthenticated,
    Forbidden(String),
}

impl Access {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

#[must_use]
pub fn require(session: Option<Arc<Session>>, allowed: RoleSet) -> Access {
    let Some(session) = session else {
        return Access::Unauthenticated;
    };
    if allowed.contains(session.role) {
        Access::Allowed(session)
    } else {
        Access::Forbidden(format!("role {} is not permitted", session.role))
    }
}

/// Any authenticated identity.
#[must_use]
pub fn require_authenticated(session: Option<Arc<Session>>) -> Access {
    require(session, RoleSet::all())
}

#[must_use]
pub fn require_admin(session: Option<Arc<Session>>) -> Access {
    require(session, RoleSet::only(Role::Admin))
}

#[must_use]
pub fn require_operator(session: Option<Arc<Session>>) -> Access {
    require(session, RoleSet::only(Role::Operator))
}

#[must_use]
pub fn require_admin_or_operator(session: Option<Arc<Session>>) -> Access {
    require(session, RoleSet::only(Role::Admin).with(Role::Operator))
}
