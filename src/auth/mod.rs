//! Authentication and authorization core.
//!
//! Nothing in here depends on a concrete database: workflows talk to the
//! [`store::SessionStore`] and [`store::PersistenceLayer`] traits, and the
//! HTTP layer maps their outcomes to responses.

pub mod config;
pub mod credentials;
pub mod edge;
pub mod error;
pub mod gate;
pub mod password_change;
pub mod policy;
pub mod role;
pub mod session;
pub mod signin;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AuthConfig;
pub use error::AuthError;
pub use role::{Role, RoleSet};
pub use session::{RequestSession, Session, SessionResolver};
