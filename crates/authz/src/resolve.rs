//! Request-time permission resolution.
//!
//! Computes the union of matching grants across every role×domain and
//! user×domain combination a principal can claim: a principal is allowed if
//! any applicable rule matches, and the reported data scope is the broadest
//! among all matching rules. A non-granting role can never suppress a
//! granting one.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use sentra_core::{DepartmentId, UserId};

use crate::action::Action;
use crate::scope::DataScope;
use crate::store::RuleStore;
use crate::subject::{Domain, RoleCode, Subject};

/// Outcome of one permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckDecision {
    pub allowed: bool,
    /// Broadest data scope among matching grants; `None` when denied.
    pub data_scope: Option<DataScope>,
}

impl CheckDecision {
    pub fn deny() -> Self {
        Self {
            allowed: false,
            data_scope: None,
        }
    }

    /// Wire form of the scope: the scope name, or the empty string when
    /// denied (or when running with enforcement disabled).
    pub fn scope_str(&self) -> &'static str {
        self.data_scope.map(|s| s.as_str()).unwrap_or("")
    }
}

/// Resolve one request against the rule store.
///
/// For each held role: the global domain first, then each department the
/// principal belongs to. Direct user grants are checked per department
/// afterwards. Scopes merge to the maximum across everything that matched.
pub fn check_permission(
    store: &RuleStore,
    user: UserId,
    roles: &[RoleCode],
    departments: &[DepartmentId],
    resource: &str,
    action: Action,
) -> CheckDecision {
    let mut max_scope: Option<DataScope> = None;

    for role in roles {
        let subject = Subject::Role(role.clone());

        let scope = store.evaluate_scope(&subject, &Domain::Wildcard, resource, action);
        max_scope = DataScope::merge_opt(max_scope, scope);

        for dept in departments {
            let domain = Domain::Department(*dept);
            let scope = store.evaluate_scope(&subject, &domain, resource, action);
            max_scope = DataScope::merge_opt(max_scope, scope);
        }
    }

    let subject = Subject::User(user);
    for dept in departments {
        let domain = Domain::Department(*dept);
        let scope = store.evaluate_scope(&subject, &domain, resource, action);
        max_scope = DataScope::merge_opt(max_scope, scope);
    }

    let decision = CheckDecision {
        allowed: max_scope.is_some(),
        data_scope: max_scope,
    };

    debug!(
        user_id = %user,
        role_count = roles.len(),
        resource,
        action = %action,
        allowed = decision.allowed,
        data_scope = decision.scope_str(),
        "permission check result"
    );

    decision
}

/// Request-facing entry point that also carries the enabled/disabled switch:
/// with enforcement disabled, every check allows with no data scope.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    store: Arc<RuleStore>,
    enabled: bool,
}

impl PermissionGate {
    pub fn new(store: Arc<RuleStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn check(
        &self,
        user: UserId,
        roles: &[RoleCode],
        departments: &[DepartmentId],
        resource: &str,
        action: Action,
    ) -> CheckDecision {
        if !self.enabled {
            return CheckDecision {
                allowed: true,
                data_scope: None,
            };
        }
        check_permission(&self.store, user, roles, departments, resource, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::GrantRule;
    use crate::subject::Subject;

    fn store_with(grants: Vec<GrantRule>) -> RuleStore {
        let store = RuleStore::new();
        for g in grants {
            store.add_grant(g);
        }
        store
    }

    #[test]
    fn multi_role_union_takes_broadest_scope() {
        // R1 grants dept-scoped read in D1; R2 grants org-scoped read
        // globally. Holder of both must get allow with org scope.
        let d1 = DepartmentId::new();
        let store = store_with(vec![
            GrantRule::new(
                Subject::role("r1"),
                Domain::Department(d1),
                "menu:reports",
                Action::Read,
                DataScope::Department,
            ),
            GrantRule::new(
                Subject::role("r2"),
                Domain::Wildcard,
                "menu:reports",
                Action::Read,
                DataScope::Organization,
            ),
        ]);

        let decision = check_permission(
            &store,
            UserId::new(),
            &[RoleCode::new("r1"), RoleCode::new("r2")],
            &[d1],
            "menu:reports",
            Action::Read,
        );
        assert!(decision.allowed);
        assert_eq!(decision.data_scope, Some(DataScope::Organization));
        assert_eq!(decision.scope_str(), "org");
    }

    #[test]
    fn non_granting_role_never_suppresses_granting_role() {
        let store = store_with(vec![GrantRule::new(
            Subject::role("r2"),
            Domain::Wildcard,
            "menu:x",
            Action::Read,
            DataScope::SelfOnly,
        )]);

        let decision = check_permission(
            &store,
            UserId::new(),
            &[RoleCode::new("r1"), RoleCode::new("r2")],
            &[],
            "menu:x",
            Action::Read,
        );
        assert!(decision.allowed);
        assert_eq!(decision.data_scope, Some(DataScope::SelfOnly));
    }

    #[test]
    fn no_matching_grant_denies_with_empty_scope() {
        let store = store_with(vec![]);
        let decision = check_permission(
            &store,
            UserId::new(),
            &[RoleCode::new("r3")],
            &[DepartmentId::new()],
            "menu:y",
            Action::Read,
        );
        assert!(!decision.allowed);
        assert_eq!(decision.data_scope, None);
        assert_eq!(decision.scope_str(), "");
    }

    #[test]
    fn direct_user_grant_applies_per_department() {
        let user = UserId::new();
        let dept = DepartmentId::new();
        let store = store_with(vec![GrantRule::new(
            Subject::user(user),
            Domain::Department(dept),
            "menu:own",
            Action::Write,
            DataScope::SelfOnly,
        )]);

        let allowed = check_permission(&store, user, &[], &[dept], "menu:own", Action::Write);
        assert!(allowed.allowed);

        // Without the department in the principal's list the grant is unreachable.
        let denied = check_permission(&store, user, &[], &[], "menu:own", Action::Write);
        assert!(!denied.allowed);
    }

    #[test]
    fn disabled_gate_allows_everything_with_no_scope() {
        let gate = PermissionGate::new(Arc::new(RuleStore::new()), false);
        let decision = gate.check(UserId::new(), &[], &[], "menu:anything", Action::Manage);
        assert!(decision.allowed);
        assert_eq!(decision.data_scope, None);
    }

    #[test]
    fn enabled_gate_enforces_rules() {
        let store = Arc::new(RuleStore::new());
        let gate = PermissionGate::new(store, true);
        let decision = gate.check(UserId::new(), &[RoleCode::new("r")], &[], "menu:z", Action::Read);
        assert!(!decision.allowed);
    }
}
