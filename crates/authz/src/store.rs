//! Shared in-memory rule store.
//!
//! One instance backs the authoritative side (rebuilt from relational
//! storage by the policy synchronizer) and another backs each edge copy
//! (replaced wholesale by the propagation service). The reader/writer lock
//! is an implementation detail: readers never observe a partially-updated
//! rule set, and every mutation either fully applies or fully replaces
//! state before the lock is released.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sentra_core::UserId;

use crate::action::Action;
use crate::error::AuthzError;
use crate::grant::{GrantRule, InheritanceEdge, MembershipEdge};
use crate::matcher::RuleSet;
use crate::scope::DataScope;
use crate::subject::{Domain, RoleCode, Subject};

/// Full contents of a rule store, in wire form. Used for out-of-band policy
/// transfer and for idempotence checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub grants: Vec<GrantRule>,
    pub memberships: Vec<MembershipEdge>,
    pub inheritance: Vec<InheritanceEdge>,
}

/// Aggregate sizes of the three rule sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub grants: usize,
    pub memberships: usize,
    pub inheritance: usize,
}

/// Concurrent-read, exclusive-write rule store.
#[derive(Debug, Default)]
pub struct RuleStore {
    inner: RwLock<RuleSet>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Lock poisoning only happens if a panic escaped mid-mutation; the data
    // is still structurally sound (mutations apply whole sections), so
    // recover the guard rather than surfacing lock errors to callers.
    fn read(&self) -> RwLockReadGuard<'_, RuleSet> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RuleSet> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Evaluate one authorization query. Boolean-OR over matching grants.
    pub fn evaluate(&self, subject: &Subject, domain: &Domain, object: &str, action: Action) -> bool {
        self.read().evaluate(subject, domain, object, action)
    }

    /// Evaluate and report the broadest data scope among matching grants.
    /// `None` means no grant matched (deny).
    pub fn evaluate_scope(
        &self,
        subject: &Subject,
        domain: &Domain,
        object: &str,
        action: Action,
    ) -> Option<DataScope> {
        self.read().max_scope(subject, domain, object, action)
    }

    /// Exact-field grant filter (`None` = any value for that position).
    pub fn filtered_grants(
        &self,
        subject: Option<&Subject>,
        domain: Option<&Domain>,
        object: Option<&str>,
        action: Option<Action>,
    ) -> Vec<GrantRule> {
        self.read().filtered_grants(subject, domain, object, action)
    }

    /// Roles directly held by `user` that apply in `domain`.
    pub fn roles_of(&self, user: UserId, domain: &Domain) -> Vec<RoleCode> {
        self.read().roles_of(user, domain)
    }

    /// Add one grant. Returns false if an identical grant already exists.
    pub fn add_grant(&self, grant: GrantRule) -> bool {
        let mut set = self.write();
        if set.grants.contains(&grant) {
            return false;
        }
        set.grants.push(grant);
        true
    }

    /// Remove one grant. Returns whether it was present.
    pub fn remove_grant(&self, grant: &GrantRule) -> bool {
        let mut set = self.write();
        let before = set.grants.len();
        set.grants.retain(|g| g != grant);
        set.grants.len() != before
    }

    /// Replace every grant for one (subject, domain, object) with the given
    /// rule, all under one write lock: a concurrent `evaluate` sees either
    /// the old rules or the new one, never a window with the object
    /// ungranted. `None` removes without replacement. Returns the number of
    /// rules removed.
    pub fn replace_object_grant(
        &self,
        subject: &Subject,
        domain: &Domain,
        object: &str,
        replacement: Option<GrantRule>,
    ) -> usize {
        let mut set = self.write();
        let before = set.grants.len();
        set.grants
            .retain(|g| !(g.subject == *subject && g.domain == *domain && g.object == object));
        let removed = before - set.grants.len();
        if let Some(rule) = replacement {
            if !set.grants.contains(&rule) {
                set.grants.push(rule);
            }
        }
        removed
    }

    pub fn add_membership(&self, edge: MembershipEdge) -> bool {
        let mut set = self.write();
        if set.memberships.contains(&edge) {
            return false;
        }
        set.memberships.push(edge);
        true
    }

    pub fn remove_membership(&self, edge: &MembershipEdge) -> bool {
        let mut set = self.write();
        let before = set.memberships.len();
        set.memberships.retain(|m| m != edge);
        set.memberships.len() != before
    }

    /// Add an inheritance edge, rejecting any edge that would create a cycle
    /// in the role graph. Returns false for a duplicate edge.
    pub fn add_inheritance(&self, edge: InheritanceEdge) -> Result<bool, AuthzError> {
        let mut set = self.write();
        if set.inheritance.contains(&edge) {
            return Ok(false);
        }
        if set.would_create_cycle(&edge.child, &edge.parent) {
            return Err(AuthzError::InheritanceCycle {
                child: edge.child.to_string(),
                parent: edge.parent.to_string(),
            });
        }
        set.inheritance.push(edge);
        Ok(true)
    }

    pub fn remove_inheritance(&self, edge: &InheritanceEdge) -> bool {
        let mut set = self.write();
        let before = set.inheritance.len();
        set.inheritance.retain(|e| e != edge);
        set.inheritance.len() != before
    }

    /// Drop every grant and grouping edge.
    pub fn clear_all(&self) {
        let mut set = self.write();
        *set = RuleSet::default();
        info!("rule store cleared");
    }

    /// Replace the grant section wholesale (duplicates dropped).
    pub fn replace_grants(&self, grants: Vec<GrantRule>) -> usize {
        let deduped = dedup(grants);
        let count = deduped.len();
        self.write().grants = deduped;
        debug!(count, "grant rules replaced");
        count
    }

    /// Replace the membership section wholesale (duplicates dropped).
    pub fn replace_memberships(&self, edges: Vec<MembershipEdge>) -> usize {
        let deduped = dedup(edges);
        let count = deduped.len();
        self.write().memberships = deduped;
        debug!(count, "membership edges replaced");
        count
    }

    /// Replace the inheritance section wholesale. Cycle-creating edges are
    /// skipped with a warning rather than aborting the batch; returns the
    /// number of edges applied.
    pub fn replace_inheritance(&self, edges: Vec<InheritanceEdge>) -> usize {
        let mut set = self.write();
        set.inheritance.clear();
        for edge in dedup(edges) {
            if set.would_create_cycle(&edge.child, &edge.parent) {
                warn!(
                    child = %edge.child,
                    parent = %edge.parent,
                    "skipping cycle-creating inheritance edge"
                );
                continue;
            }
            set.inheritance.push(edge);
        }
        let count = set.inheritance.len();
        debug!(count, "inheritance edges replaced");
        count
    }

    /// Atomically replace the whole store from a snapshot (single write
    /// lock: readers see either the old rule set or the new one, never a
    /// mix). Cycle-creating inheritance edges are skipped with a warning.
    pub fn load_snapshot(&self, snapshot: PolicySnapshot) -> StoreCounts {
        let mut set = self.write();
        set.grants = dedup(snapshot.grants);
        set.memberships = dedup(snapshot.memberships);
        set.inheritance.clear();
        for edge in dedup(snapshot.inheritance) {
            if set.would_create_cycle(&edge.child, &edge.parent) {
                warn!(
                    child = %edge.child,
                    parent = %edge.parent,
                    "skipping cycle-creating inheritance edge"
                );
                continue;
            }
            set.inheritance.push(edge);
        }
        StoreCounts {
            grants: set.grants.len(),
            memberships: set.memberships.len(),
            inheritance: set.inheritance.len(),
        }
    }

    /// Copy of the full rule set in wire form.
    pub fn snapshot(&self) -> PolicySnapshot {
        let set = self.read();
        PolicySnapshot {
            grants: set.grants.clone(),
            memberships: set.memberships.clone(),
            inheritance: set.inheritance.clone(),
        }
    }

    pub fn counts(&self) -> StoreCounts {
        let set = self.read();
        StoreCounts {
            grants: set.grants.len(),
            memberships: set.memberships.len(),
            inheritance: set.inheritance.len(),
        }
    }
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
