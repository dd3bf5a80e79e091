//! User roles and the role → home page table.
//!
//! Every post-auth redirect (sign-in, password change, layout mismatches) goes
//! through [`Role::home_path`] so the mapping stays identical everywhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

pub const ADMIN_HOME: &str = "/admin";
pub const OPERATOR_HOME: &str = "/operator";
pub const DEFAULT_HOME: &str = "/";
pub const SIGNIN_PATH: &str = "/signin";
pub const CHANGE_PASSWORD_PATH: &str = "/change-password";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Operator,
    Client,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Admin, Self::Operator, Self::Client];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Operator => "OPERATOR",
            Self::Client => "CLIENT",
        }
    }

    /// Landing page for this role after authentication.
    #[must_use]
    pub const fn home_path(self) -> &'static str {
        match self {
            Self::Admin => ADMIN_HOME,
            Self::Operator => OPERATOR_HOME,
            Self::Client => DEFAULT_HOME,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Admin => 0b001,
            Self::Operator => 0b010,
            Self::Client => 0b100,
        }
    }
}

/// Home page for an optional role; unknown roles land on the public home.
#[must_use]
pub fn home_for(role: Option<Role>) -> &'static str {
    role.map_or(DEFAULT_HOME, Role::home_path)
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ADMIN" => Ok(Self::Admin),
            "OPERATOR" => Ok(Self::Operator),
            "CLIENT" => Ok(Self::Client),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Set of roles accepted by an authorization check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoleSet(u8);

impl RoleSet {
    /// Accepts nobody; every session is forbidden.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Accepts any authenticated identity.
    #[must_use]
    pub const fn all() -> Self {
        Self(0b111)
    }

    #[must_use]
    pub const fn only(role: Role) -> Self {
        Self(role.bit())
    }

    #[must_use]
    pub const fn with(self, role: Role) -> Self {
        Self(self.0 | role.bit())
    }

    #[must_use]
    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}
