//! Tagged subject and domain types.
//!
//! Grant subjects and domains travel as prefixed strings on the wire
//! (`role:<code>`, `user:<id>`, `dept:<id>`, `*`). Inside the engine they are
//! tagged unions, so a prefix typo is a parse error at the boundary instead
//! of a silently unmatched rule.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use sentra_core::{DepartmentId, UserId};

use crate::error::AuthzError;

/// Stable role slug used as the matcher subject for a role.
///
/// Generated once from the role name at creation time (see
/// `sentra-directory`); opaque at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCode(String);

impl RoleCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The grantee of a rule: a role (by code) or a specific user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Role(RoleCode),
    User(UserId),
}

impl Subject {
    pub fn role(code: impl Into<String>) -> Self {
        Self::Role(RoleCode::new(code))
    }

    pub fn user(id: UserId) -> Self {
        Self::User(id)
    }

    pub fn is_role(&self) -> bool {
        matches!(self, Self::Role(_))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role(code) => write!(f, "role:{code}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

impl FromStr for Subject {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(code) = s.strip_prefix("role:") {
            if code.is_empty() {
                return Err(AuthzError::malformed("subject", s));
            }
            return Ok(Self::Role(RoleCode::new(code)));
        }
        if let Some(id) = s.strip_prefix("user:") {
            let user = id
                .parse::<UserId>()
                .map_err(|_| AuthzError::malformed("subject", s))?;
            return Ok(Self::User(user));
        }
        Err(AuthzError::malformed("subject", s))
    }
}

/// The scoping unit a grant applies within: one department, or every domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Matches any concrete department (wire form `*`).
    Wildcard,
    Department(DepartmentId),
}

impl Domain {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }

    /// Whether a grouping edge scoped to `self` is usable when resolving a
    /// query in `requested`: the edge domain must equal the requested domain
    /// or be the wildcard.
    pub fn covers(&self, requested: &Domain) -> bool {
        self.is_wildcard() || self == requested
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Department(id) => write!(f, "dept:{id}"),
        }
    }
}

impl FromStr for Domain {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Self::Wildcard);
        }
        if let Some(id) = s.strip_prefix("dept:") {
            let dept = id
                .parse::<DepartmentId>()
                .map_err(|_| AuthzError::malformed("domain", s))?;
            return Ok(Self::Department(dept));
        }
        Err(AuthzError::malformed("domain", s))
    }
}

macro_rules! impl_wire_serde {
    ($t:ty) => {
        impl Serialize for $t {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_wire_serde!(Subject);
impl_wire_serde!(Domain);
