//! Data-scope and permission-level enums with max-merge semantics.
//!
//! Both orders are total, and both merges are commutative, associative and
//! idempotent, so they are safe to fold over an arbitrary list of grants.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AuthzError;

/// How much data a granted action may see, ordered narrow to broad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataScope {
    /// Only records owned by the principal (wire form `self`).
    SelfOnly,
    /// Records of the principal's department (wire form `dept`).
    Department,
    /// Records of the whole organization (wire form `org`).
    Organization,
}

impl DataScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfOnly => "self",
            Self::Department => "dept",
            Self::Organization => "org",
        }
    }

    /// Broadest of the two scopes.
    pub fn merge(a: DataScope, b: DataScope) -> DataScope {
        a.max(b)
    }

    /// Merge where either side may be absent; absent counts as lowest.
    pub fn merge_opt(a: Option<DataScope>, b: Option<DataScope>) -> Option<DataScope> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(s), None) | (None, Some(s)) => Some(s),
            (None, None) => None,
        }
    }

    /// Numeric storage form (1/2/3).
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::SelfOnly => 1,
            Self::Department => 2,
            Self::Organization => 3,
        }
    }

    pub fn from_i16(raw: i16) -> Option<Self> {
        match raw {
            1 => Some(Self::SelfOnly),
            2 => Some(Self::Department),
            3 => Some(Self::Organization),
            _ => None,
        }
    }
}

impl fmt::Display for DataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataScope {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self" => Ok(Self::SelfOnly),
            "dept" => Ok(Self::Department),
            "org" => Ok(Self::Organization),
            other => Err(AuthzError::malformed("data scope", other)),
        }
    }
}

/// Permission level authored on a role-menu grant, ordered weakest to
/// strongest. Mapped onto the action space at sync time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PermissionLevel {
    None,
    View,
    Edit,
    Manage,
    Full,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::View => "view",
            Self::Edit => "edit",
            Self::Manage => "manage",
            Self::Full => "full",
        }
    }

    /// Coarser level string exposed to front-end clients
    /// (`none`/`read`/`write`/`full`).
    pub fn frontend_level(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::View => "read",
            Self::Edit | Self::Manage => "write",
            Self::Full => "full",
        }
    }

    /// Grant-rule action this level translates to at sync time.
    /// `None` levels produce no rule at all.
    pub fn to_action(&self) -> Option<crate::Action> {
        match self {
            Self::None => None,
            Self::View => Some(crate::Action::Read),
            Self::Edit | Self::Manage => Some(crate::Action::Write),
            Self::Full => Some(crate::Action::Any),
        }
    }

    /// Strongest of the two levels.
    pub fn merge(a: PermissionLevel, b: PermissionLevel) -> PermissionLevel {
        a.max(b)
    }

    /// Numeric storage form (0..=4).
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::None => 0,
            Self::View => 1,
            Self::Edit => 2,
            Self::Manage => 3,
            Self::Full => 4,
        }
    }

    pub fn from_i16(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::View),
            2 => Some(Self::Edit),
            3 => Some(Self::Manage),
            4 => Some(Self::Full),
            _ => None,
        }
    }

    /// Lenient parse accepting both internal names and the front-end
    /// vocabulary (`read`/`write`). Unknown strings degrade to `None`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "view" | "read" => Self::View,
            "edit" | "write" => Self::Edit,
            "manage" => Self::Manage,
            "full" => Self::Full,
            _ => Self::None,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! impl_name_serde {
    ($t:ty) => {
        impl Serialize for $t {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
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

impl FromStr for PermissionLevel {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "manage" => Ok(Self::Manage),
            "full" => Ok(Self::Full),
            other => Err(AuthzError::malformed("permission level", other)),
        }
    }
}

impl_name_serde!(DataScope);
impl_name_serde!(PermissionLevel);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_scope() -> impl Strategy<Value = DataScope> {
        prop_oneof![
            Just(DataScope::SelfOnly),
            Just(DataScope::Department),
            Just(DataScope::Organization),
        ]
    }

    fn any_level() -> impl Strategy<Value = PermissionLevel> {
        prop_oneof![
            Just(PermissionLevel::None),
            Just(PermissionLevel::View),
            Just(PermissionLevel::Edit),
            Just(PermissionLevel::Manage),
            Just(PermissionLevel::Full),
        ]
    }

    #[test]
    fn scope_total_order() {
        assert!(DataScope::SelfOnly < DataScope::Department);
        assert!(DataScope::Department < DataScope::Organization);
    }

    #[test]
    fn merge_opt_treats_absent_as_lowest() {
        assert_eq!(
            DataScope::merge_opt(None, Some(DataScope::SelfOnly)),
            Some(DataScope::SelfOnly)
        );
        assert_eq!(DataScope::merge_opt(None, None), None);
        assert_eq!(
            DataScope::merge_opt(Some(DataScope::Organization), Some(DataScope::Department)),
            Some(DataScope::Organization)
        );
    }

    #[test]
    fn level_action_mapping() {
        assert_eq!(PermissionLevel::None.to_action(), None);
        assert_eq!(PermissionLevel::View.to_action(), Some(crate::Action::Read));
        assert_eq!(PermissionLevel::Edit.to_action(), Some(crate::Action::Write));
        assert_eq!(
            PermissionLevel::Manage.to_action(),
            Some(crate::Action::Write)
        );
        assert_eq!(PermissionLevel::Full.to_action(), Some(crate::Action::Any));
    }

    #[test]
    fn frontend_levels() {
        assert_eq!(PermissionLevel::View.frontend_level(), "read");
        assert_eq!(PermissionLevel::Manage.frontend_level(), "write");
        assert_eq!(PermissionLevel::parse_lenient("write"), PermissionLevel::Edit);
        assert_eq!(PermissionLevel::parse_lenient("bogus"), PermissionLevel::None);
    }

    proptest! {
        #[test]
        fn scope_merge_commutative(a in any_scope(), b in any_scope()) {
            prop_assert_eq!(DataScope::merge(a, b), DataScope::merge(b, a));
        }

        #[test]
        fn scope_merge_idempotent(a in any_scope()) {
            prop_assert_eq!(DataScope::merge(a, a), a);
        }

        #[test]
        fn scope_merge_is_upper_bound(a in any_scope(), b in any_scope()) {
            let m = DataScope::merge(a, b);
            prop_assert!(m >= a && m >= b);
        }

        #[test]
        fn scope_merge_associative(a in any_scope(), b in any_scope(), c in any_scope()) {
            prop_assert_eq!(
                DataScope::merge(DataScope::merge(a, b), c),
                DataScope::merge(a, DataScope::merge(b, c))
            );
        }

        #[test]
        fn level_merge_commutative(a in any_level(), b in any_level()) {
            prop_assert_eq!(PermissionLevel::merge(a, b), PermissionLevel::merge(b, a));
        }

        #[test]
        fn level_merge_idempotent(a in any_level()) {
            prop_assert_eq!(PermissionLevel::merge(a, a), a);
        }

        #[test]
        fn numeric_forms_round_trip(a in any_level(), s in any_scope()) {
            prop_assert_eq!(PermissionLevel::from_i16(a.as_i16()), Some(a));
            prop_assert_eq!(DataScope::from_i16(s.as_i16()), Some(s));
        }
    }
}
