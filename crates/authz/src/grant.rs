//! Rule and grouping-edge records held by the rule store.

use serde::{Deserialize, Serialize};

use sentra_core::UserId;

use crate::action::Action;
use crate::scope::DataScope;
use crate::subject::{Domain, RoleCode, Subject};

/// One allow rule: subject may perform `action` on objects matching
/// `object` within `domain`, seeing data up to `data_scope`.
///
/// `object` is an exact resource identifier (e.g. `menu:reports`) or a
/// pattern with a trailing `*` wildcard (e.g. `menu:*`, `/api/v1/users/*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantRule {
    pub subject: Subject,
    pub domain: Domain,
    pub object: String,
    pub action: Action,
    pub data_scope: DataScope,
}

impl GrantRule {
    pub fn new(
        subject: Subject,
        domain: Domain,
        object: impl Into<String>,
        action: Action,
        data_scope: DataScope,
    ) -> Self {
        Self {
            subject,
            domain,
            object: object.into(),
            action,
            data_scope,
        }
    }
}

/// Membership grouping edge: user holds role within a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipEdge {
    pub user: UserId,
    pub role: RoleCode,
    pub domain: Domain,
}

impl MembershipEdge {
    pub fn new(user: UserId, role: RoleCode, domain: Domain) -> Self {
        Self { user, role, domain }
    }
}

/// Inheritance grouping edge: child role inherits every grant of the parent.
/// Domain-independent; the edge set must stay acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InheritanceEdge {
    pub child: RoleCode,
    pub parent: RoleCode,
}

impl InheritanceEdge {
    pub fn new(child: RoleCode, parent: RoleCode) -> Self {
        Self { child, parent }
    }
}
