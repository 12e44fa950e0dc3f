//! Rule matching: the fixed grammar evaluated for every authorization query.
//!
//! A query `(subject, domain, object, action)` is allowed iff some grant
//! matches on all four positions:
//!
//! - subject: equal, or a membership/inheritance path connects the query
//!   subject to the grant's role (membership edges are usable within the
//!   query domain or the wildcard domain; inheritance is domain-independent);
//! - domain: equal, or the grant domain is the wildcard;
//! - object: exact, or prefix match for a trailing-`*` pattern;
//! - action: equal, or the grant action is the wildcard.
//!
//! Effects combine by OR: the first matching grant allows, and there is no
//! deny rule type.

use std::collections::{HashSet, VecDeque};

use crate::action::Action;
use crate::grant::{GrantRule, InheritanceEdge, MembershipEdge};
use crate::scope::DataScope;
use crate::subject::{Domain, RoleCode, Subject};

/// Object/pattern match: exact, full wildcard, or trailing-`*` prefix.
pub fn object_matches(pattern: &str, object: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return object.starts_with(prefix);
    }
    pattern == object
}

/// The raw rule set. Interior type of `RuleStore`; all methods assume the
/// caller holds the appropriate lock.
#[derive(Debug, Default, Clone)]
pub(crate) struct RuleSet {
    pub(crate) grants: Vec<GrantRule>,
    pub(crate) memberships: Vec<MembershipEdge>,
    pub(crate) inheritance: Vec<InheritanceEdge>,
}

impl RuleSet {
    /// Roles the query subject resolves to in `domain`: membership edges
    /// first (domain-scoped), then the transitive closure over inheritance.
    ///
    /// A visited set guards the walk, so a cycle that slipped into the edge
    /// list terminates instead of looping.
    pub(crate) fn reachable_roles(&self, subject: &Subject, domain: &Domain) -> HashSet<RoleCode> {
        let mut seen: HashSet<RoleCode> = HashSet::new();
        let mut queue: VecDeque<RoleCode> = VecDeque::new();

        match subject {
            Subject::User(user) => {
                for edge in &self.memberships {
                    if edge.user == *user
                        && edge.domain.covers(domain)
                        && seen.insert(edge.role.clone())
                    {
                        queue.push_back(edge.role.clone());
                    }
                }
            }
            Subject::Role(code) => {
                seen.insert(code.clone());
                queue.push_back(code.clone());
            }
        }

        while let Some(role) = queue.pop_front() {
            for edge in &self.inheritance {
                if edge.child == role && seen.insert(edge.parent.clone()) {
                    queue.push_back(edge.parent.clone());
                }
            }
        }

        seen
    }

    fn grant_matches(
        &self,
        grant: &GrantRule,
        subject: &Subject,
        reachable: &HashSet<RoleCode>,
        domain: &Domain,
        object: &str,
        action: Action,
    ) -> bool {
        if !(grant.domain.is_wildcard() || grant.domain == *domain) {
            return false;
        }
        if !grant.action.grants(action) {
            return false;
        }
        if !object_matches(&grant.object, object) {
            return false;
        }
        if grant.subject == *subject {
            return true;
        }
        match &grant.subject {
            Subject::Role(code) => reachable.contains(code),
            Subject::User(_) => false,
        }
    }

    pub(crate) fn evaluate(
        &self,
        subject: &Subject,
        domain: &Domain,
        object: &str,
        action: Action,
    ) -> bool {
        let reachable = self.reachable_roles(subject, domain);
        self.grants
            .iter()
            .any(|g| self.grant_matches(g, subject, &reachable, domain, object, action))
    }

    /// Broadest data scope across every matching grant, `None` when nothing
    /// matches. Full matching semantics, wildcards and inheritance included.
    pub(crate) fn max_scope(
        &self,
        subject: &Subject,
        domain: &Domain,
        object: &str,
        action: Action,
    ) -> Option<DataScope> {
        let reachable = self.reachable_roles(subject, domain);
        let mut scope: Option<DataScope> = None;
        for grant in &self.grants {
            if self.grant_matches(grant, subject, &reachable, domain, object, action) {
                scope = DataScope::merge_opt(scope, Some(grant.data_scope));
            }
        }
        scope
    }

    /// Exact-field filter over the grant list (no pattern or grouping
    /// expansion); `None` means "any value" for that position.
    pub(crate) fn filtered_grants(
        &self,
        subject: Option<&Subject>,
        domain: Option<&Domain>,
        object: Option<&str>,
        action: Option<Action>,
    ) -> Vec<GrantRule> {
        self.grants
            .iter()
            .filter(|g| subject.is_none_or(|s| g.subject == *s))
            .filter(|g| domain.is_none_or(|d| g.domain == *d))
            .filter(|g| object.is_none_or(|o| g.object == o))
            .filter(|g| action.is_none_or(|a| g.action == a))
            .cloned()
            .collect()
    }

    /// Roles directly held by `user` that are usable in `domain`.
    /// Does not expand inheritance.
    pub(crate) fn roles_of(&self, user: sentra_core::UserId, domain: &Domain) -> Vec<RoleCode> {
        let mut out: Vec<RoleCode> = Vec::new();
        for edge in &self.memberships {
            if edge.user == user && edge.domain.covers(domain) && !out.contains(&edge.role) {
                out.push(edge.role.clone());
            }
        }
        out
    }

    /// Whether inserting `child -> parent` would close a cycle, i.e. `child`
    /// is already an ancestor of `parent` (or the edge is a self-loop).
    pub(crate) fn would_create_cycle(&self, child: &RoleCode, parent: &RoleCode) -> bool {
        if child == parent {
            return true;
        }
        let mut seen: HashSet<&RoleCode> = HashSet::new();
        let mut queue: VecDeque<&RoleCode> = VecDeque::new();
        queue.push_back(parent);
        while let Some(role) = queue.pop_front() {
            for edge in &self.inheritance {
                if edge.child == *role {
                    if edge.parent == *child {
                        return true;
                    }
                    if seen.insert(&edge.parent) {
                        queue.push_back(&edge.parent);
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_pattern_matching() {
        assert!(object_matches("menu:reports", "menu:reports"));
        assert!(!object_matches("menu:reports", "menu:reports2"));
        assert!(object_matches("menu:*", "menu:users"));
        assert!(object_matches("*", "anything"));
        assert!(object_matches("/api/v1/users/*", "/api/v1/users/123"));
        assert!(!object_matches("/api/v1/users/*", "/api/v1/orders/123"));
    }

    #[test]
    fn cycle_detection_sees_transitive_paths() {
        let a = RoleCode::new("a");
        let b = RoleCode::new("b");
        let c = RoleCode::new("c");
        let set = RuleSet {
            inheritance: vec![
                InheritanceEdge::new(a.clone(), b.clone()),
                InheritanceEdge::new(b.clone(), c.clone()),
            ],
            ..Default::default()
        };
        // c -> a would close a, b, c back on itself.
        assert!(set.would_create_cycle(&c, &a));
        assert!(set.would_create_cycle(&a, &a));
        assert!(set.would_create_cycle(&c, &b));
        assert!(!set.would_create_cycle(&a, &RoleCode::new("unrelated")));
    }
}
