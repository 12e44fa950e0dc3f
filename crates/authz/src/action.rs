//! Closed action set for grant rules.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AuthzError;

/// Operation requested on (or granted for) a resource.
///
/// `Any` is the wildcard: on the grant side it matches every requested
/// action; as a requested action it only matches wildcard grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Write,
    Manage,
    Any,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Manage => "manage",
            Self::Any => "*",
        }
    }

    /// Whether a grant carrying `self` satisfies a request for `requested`.
    pub fn grants(&self, requested: Action) -> bool {
        *self == Action::Any || *self == requested
    }

    /// Map an HTTP method to the action space used by request middleware.
    ///
    /// GET/HEAD/OPTIONS read, POST/PUT/PATCH write, DELETE manage; anything
    /// unrecognized falls back to read.
    pub fn from_http_method(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" | "OPTIONS" => Self::Read,
            "POST" | "PUT" | "PATCH" => Self::Write,
            "DELETE" => Self::Manage,
            _ => Self::Read,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "manage" => Ok(Self::Manage),
            "*" => Ok(Self::Any),
            other => Err(AuthzError::malformed("action", other)),
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
