//! # `HomeX` (CRM session and access control)
//!
//! `homex` is the authentication and authorization boundary of the `HomeX` CRM.
//! It resolves session cookies, gates the role-specific dashboards, and runs the
//! forced password change that every provisioned account goes through on its
//! first sign-in.
//!
//! ## Roles
//!
//! Every user holds exactly one role: `ADMIN`, `OPERATOR` or `CLIENT`. Each role
//! has a home page (`/admin`, `/operator`, `/`) and all post-auth redirects are
//! derived from that single table.
//!
//! ## Request Flow
//!
//! 1. **Edge filter:** a cookie-presence check in front of every page. Requests
//!    for `/admin` or `/operator` without a session cookie are redirected to
//!    `/signin?callbackUrl=<path>`. No store access happens here.
//! 2. **Session resolution:** the signed cookie is verified and resolved against
//!    the server-side session store, at most once per request.
//! 3. **Authorization gate:** each layout checks the resolved role and answers
//!    `Allowed`, `Unauthenticated` or `Forbidden`.
//! 4. **Forced password change:** sessions flagged with `mustChangePassword` are
//!    sent to `/change-password` before any role home is reachable.
//!
//! ## Password Storage
//!
//! Password hashes are stored twice (on the user row and on its `credential`
//! account row). Both copies are always rewritten inside one transaction.

pub mod api;
pub mod auth;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
