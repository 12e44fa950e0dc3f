//! Policy synchronizer: compiles relational rows into rule-store form.
//!
//! The relational tables are the source of truth; the rule store is a
//! derived artifact. `sync_all` rebuilds all three sections so any drift
//! (missed incremental update, manual DB edit) heals on the next pass.
//! Orphaned rows referencing a deleted role are skipped with a warning
//! instead of failing the whole rebuild.
//!
//! Incremental operations persist first and only touch the rule store once
//! storage has accepted the change, so a storage failure leaves the store
//! consistent with what is actually on disk.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use sentra_authz::{
    check_permission, Action, AuthzError, CheckDecision, DataScope, GrantRule, InheritanceEdge,
    MembershipEdge, PermissionLevel, RoleCode, RuleStore,
};
use sentra_core::{DepartmentId, RoleId, UserId};
use sentra_directory::{RoleDefinition, RoleMenuGrant, UserRoleAssignment};

use crate::policy_repo::{PolicyRepoError, PolicyRepository};

/// Synchronization failure.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Repository(#[from] PolicyRepoError),

    #[error(transparent)]
    Store(#[from] AuthzError),

    #[error("role {0} not found")]
    RoleNotFound(RoleId),
}

/// Counts applied by one full synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub grants: usize,
    pub memberships: usize,
    pub inheritance: usize,
}

/// Rebuilds and incrementally maintains a rule store from a policy
/// repository.
pub struct PolicySynchronizer {
    repo: Arc<dyn PolicyRepository>,
    store: Arc<RuleStore>,
}

impl PolicySynchronizer {
    pub fn new(repo: Arc<dyn PolicyRepository>, store: Arc<RuleStore>) -> Self {
        Self { repo, store }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Rebuild all three rule sections from storage.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<SyncSummary, SyncError> {
        let roles = self.repo.list_roles().await?;
        let by_id: HashMap<RoleId, &RoleDefinition> = roles.iter().map(|r| (r.id, r)).collect();

        let grants = self.compile_grants(&by_id).await?;
        let memberships = self.compile_memberships(&by_id).await?;
        let inheritance = compile_inheritance(&roles, &by_id);

        let summary = SyncSummary {
            grants: self.store.replace_grants(grants),
            memberships: self.store.replace_memberships(memberships),
            inheritance: self.store.replace_inheritance(inheritance),
        };
        info!(
            grants = summary.grants,
            memberships = summary.memberships,
            inheritance = summary.inheritance,
            "policy synchronization complete"
        );
        Ok(summary)
    }

    /// Rebuild only the grant section.
    #[instrument(skip(self))]
    pub async fn sync_role_grants(&self) -> Result<usize, SyncError> {
        let roles = self.repo.list_roles().await?;
        let by_id: HashMap<RoleId, &RoleDefinition> = roles.iter().map(|r| (r.id, r)).collect();
        let grants = self.compile_grants(&by_id).await?;
        Ok(self.store.replace_grants(grants))
    }

    /// Rebuild only the membership section.
    #[instrument(skip(self))]
    pub async fn sync_memberships(&self) -> Result<usize, SyncError> {
        let roles = self.repo.list_roles().await?;
        let by_id: HashMap<RoleId, &RoleDefinition> = roles.iter().map(|r| (r.id, r)).collect();
        let memberships = self.compile_memberships(&by_id).await?;
        Ok(self.store.replace_memberships(memberships))
    }

    /// Rebuild only the inheritance section.
    #[instrument(skip(self))]
    pub async fn sync_inheritance(&self) -> Result<usize, SyncError> {
        let roles = self.repo.list_roles().await?;
        let by_id: HashMap<RoleId, &RoleDefinition> = roles.iter().map(|r| (r.id, r)).collect();
        let inheritance = compile_inheritance(&roles, &by_id);
        Ok(self.store.replace_inheritance(inheritance))
    }

    async fn compile_grants(
        &self,
        roles: &HashMap<RoleId, &RoleDefinition>,
    ) -> Result<Vec<GrantRule>, SyncError> {
        let rows = self.repo.list_role_grants().await?;
        let mut grants = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(role) = roles.get(&row.role_id) else {
                warn!(role_id = %row.role_id, menu_id = %row.menu_id, "skipping grant for missing role");
                continue;
            };
            if let Some(rule) = compile_grant(role, &row) {
                grants.push(rule);
            }
        }
        Ok(grants)
    }

    async fn compile_memberships(
        &self,
        roles: &HashMap<RoleId, &RoleDefinition>,
    ) -> Result<Vec<MembershipEdge>, SyncError> {
        let rows = self.repo.list_assignments().await?;
        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(role) = roles.get(&row.role_id) else {
                warn!(user_id = %row.user_id, role_id = %row.role_id, "skipping assignment for missing role");
                continue;
            };
            edges.push(compile_membership(role, &row));
        }
        Ok(edges)
    }

    /// Set a role's menu grant: persist, then swap the role's rule for that
    /// menu in the store under one write lock, so an upgrade never opens a
    /// window where the menu is ungranted.
    #[instrument(skip(self), fields(role_id = %role_id, menu_id))]
    pub async fn grant_menu(
        &self,
        role_id: RoleId,
        menu_id: &str,
        level: PermissionLevel,
        data_scope: DataScope,
    ) -> Result<(), SyncError> {
        let role = self
            .repo
            .find_role(role_id)
            .await?
            .ok_or(SyncError::RoleNotFound(role_id))?;

        let row = RoleMenuGrant::new(role_id, menu_id, level, data_scope);
        self.repo.upsert_role_grant(row.clone()).await?;

        self.store.replace_object_grant(
            &role.policy_subject(),
            &role.policy_domain(),
            &menu_object(menu_id),
            compile_grant(&role, &row),
        );
        Ok(())
    }

    /// Revoke a role's menu grant: persist the delete, then drop the
    /// matching rules from the store.
    #[instrument(skip(self), fields(role_id = %role_id, menu_id))]
    pub async fn revoke_menu(&self, role_id: RoleId, menu_id: &str) -> Result<(), SyncError> {
        let role = self
            .repo
            .find_role(role_id)
            .await?
            .ok_or(SyncError::RoleNotFound(role_id))?;

        self.repo.delete_role_grant(role_id, menu_id).await?;
        self.store.replace_object_grant(
            &role.policy_subject(),
            &role.policy_domain(),
            &menu_object(menu_id),
            None,
        );
        Ok(())
    }

    /// Assign a role to a user: persist, then add the membership edge.
    #[instrument(skip(self), fields(user_id = %user, role_id = %role_id))]
    pub async fn assign_role(&self, user: UserId, role_id: RoleId) -> Result<(), SyncError> {
        let role = self
            .repo
            .find_role(role_id)
            .await?
            .ok_or(SyncError::RoleNotFound(role_id))?;

        self.repo
            .insert_assignment(UserRoleAssignment::new(user, role_id))
            .await?;
        self.store
            .add_membership(compile_membership(&role, &UserRoleAssignment::new(user, role_id)));
        Ok(())
    }

    /// Remove a user's role: persist the delete, then drop the edge.
    #[instrument(skip(self), fields(user_id = %user, role_id = %role_id))]
    pub async fn unassign_role(&self, user: UserId, role_id: RoleId) -> Result<(), SyncError> {
        let role = self
            .repo
            .find_role(role_id)
            .await?
            .ok_or(SyncError::RoleNotFound(role_id))?;

        self.repo.delete_assignment(user, role_id).await?;
        self.store.remove_membership(&MembershipEdge::new(
            user,
            role.role_code.clone(),
            role.policy_domain(),
        ));
        Ok(())
    }

    /// Re-parent a role in the inheritance graph. The store's cycle check
    /// runs before anything is persisted, so a cycle-creating request
    /// changes neither the store nor the database.
    #[instrument(skip(self), fields(role_id = %child_id))]
    pub async fn set_role_inheritance(
        &self,
        child_id: RoleId,
        parent_id: Option<RoleId>,
    ) -> Result<(), SyncError> {
        let child = self
            .repo
            .find_role(child_id)
            .await?
            .ok_or(SyncError::RoleNotFound(child_id))?;

        let new_edge = match parent_id {
            Some(parent_id) => {
                let parent = self
                    .repo
                    .find_role(parent_id)
                    .await?
                    .ok_or(SyncError::RoleNotFound(parent_id))?;
                Some(InheritanceEdge::new(
                    child.role_code.clone(),
                    parent.role_code.clone(),
                ))
            }
            None => None,
        };

        // Cycle check against the store before touching anything.
        if let Some(edge) = &new_edge {
            let probe = RuleStore::new();
            probe.load_snapshot(self.store.snapshot());
            remove_child_edges(&probe, &child.role_code);
            probe.add_inheritance(edge.clone())?;
        }

        self.repo.set_role_parent(child_id, parent_id).await?;

        remove_child_edges(&self.store, &child.role_code);
        if let Some(edge) = new_edge {
            self.store.add_inheritance(edge)?;
        }
        Ok(())
    }

    /// Resolve one permission check for a user, deriving their roles and
    /// departments from storage.
    #[instrument(skip(self), fields(user_id = %user, resource))]
    pub async fn check_permission(
        &self,
        user: UserId,
        resource: &str,
        action: Action,
    ) -> Result<CheckDecision, SyncError> {
        let roles = self.repo.roles_of_user(user).await?;
        let codes: Vec<RoleCode> = roles.iter().map(|r| r.role_code.clone()).collect();
        let departments: Vec<DepartmentId> =
            roles.iter().filter_map(|r| r.department_id).collect();
        Ok(check_permission(
            &self.store,
            user,
            &codes,
            &departments,
            resource,
            action,
        ))
    }
}

/// A grant row becomes one rule, unless its level grants nothing.
fn compile_grant(role: &RoleDefinition, row: &RoleMenuGrant) -> Option<GrantRule> {
    let action = row.level.to_action()?;
    Some(GrantRule::new(
        role.policy_subject(),
        role.policy_domain(),
        menu_object(&row.menu_id),
        action,
        row.data_scope,
    ))
}

fn compile_membership(role: &RoleDefinition, row: &UserRoleAssignment) -> MembershipEdge {
    MembershipEdge::new(row.user_id, role.role_code.clone(), role.policy_domain())
}

fn compile_inheritance(
    roles: &[RoleDefinition],
    by_id: &HashMap<RoleId, &RoleDefinition>,
) -> Vec<InheritanceEdge> {
    let mut edges = Vec::new();
    for role in roles {
        let Some(parent_id) = role.parent_role_id else {
            continue;
        };
        let Some(parent) = by_id.get(&parent_id) else {
            warn!(role_id = %role.id, parent_id = %parent_id, "skipping inheritance edge to missing role");
            continue;
        };
        edges.push(InheritanceEdge::new(
            role.role_code.clone(),
            parent.role_code.clone(),
        ));
    }
    edges
}

fn menu_object(menu_id: &str) -> String {
    format!("menu:{menu_id}")
}

fn remove_child_edges(store: &RuleStore, child: &RoleCode) {
    for edge in store.snapshot().inheritance {
        if &edge.child == child {
            store.remove_inheritance(&edge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy_repo::InMemoryPolicyRepository;
    use sentra_authz::{Domain, Subject};

    fn synchronizer() -> (Arc<InMemoryPolicyRepository>, PolicySynchronizer) {
        let repo = Arc::new(InMemoryPolicyRepository::new());
        let store = Arc::new(RuleStore::new());
        let sync = PolicySynchronizer::new(repo.clone(), store);
        (repo, sync)
    }

    #[tokio::test]
    async fn sync_all_compiles_every_section() {
        let (repo, sync) = synchronizer();

        let dept = DepartmentId::new();
        let parent = RoleDefinition::new("Manager", "", None).unwrap();
        let child = RoleDefinition::new("Team Lead", "", Some(dept))
            .unwrap()
            .with_parent(parent.id);
        repo.insert_role(parent.clone()).await.unwrap();
        repo.insert_role(child.clone()).await.unwrap();
        repo.upsert_role_grant(RoleMenuGrant::new(
            parent.id,
            "approvals",
            PermissionLevel::Edit,
            DataScope::Organization,
        ))
        .await
        .unwrap();
        let user = UserId::new();
        repo.insert_assignment(UserRoleAssignment::new(user, child.id))
            .await
            .unwrap();

        let summary = sync.sync_all().await.unwrap();
        assert_eq!(
            summary,
            SyncSummary {
                grants: 1,
                memberships: 1,
                inheritance: 1,
            }
        );

        // The user reaches the parent's grant through membership plus
        // inheritance, scoped to their department.
        assert!(sync.store().evaluate(
            &Subject::user(user),
            &Domain::Department(dept),
            "menu:approvals",
            Action::Write,
        ));
    }

    #[tokio::test]
    async fn orphan_rows_are_skipped_not_fatal() {
        let (repo, sync) = synchronizer();

        let role = RoleDefinition::new("Nurse", "", None).unwrap();
        repo.insert_role(role.clone()).await.unwrap();
        repo.upsert_role_grant(RoleMenuGrant::new(
            role.id,
            "patients",
            PermissionLevel::View,
            DataScope::SelfOnly,
        ))
        .await
        .unwrap();
        // Rows referencing a role that no longer exists.
        repo.upsert_role_grant(RoleMenuGrant::new(
            RoleId::new(),
            "ghost",
            PermissionLevel::View,
            DataScope::SelfOnly,
        ))
        .await
        .unwrap();
        repo.insert_assignment(UserRoleAssignment::new(UserId::new(), RoleId::new()))
            .await
            .unwrap();

        let summary = sync.sync_all().await.unwrap();
        assert_eq!(summary.grants, 1);
        assert_eq!(summary.memberships, 0);
    }

    #[tokio::test]
    async fn none_level_rows_produce_no_rules() {
        let (repo, sync) = synchronizer();
        let role = RoleDefinition::new("Viewer", "", None).unwrap();
        repo.insert_role(role.clone()).await.unwrap();
        repo.upsert_role_grant(RoleMenuGrant::new(
            role.id,
            "hidden",
            PermissionLevel::None,
            DataScope::SelfOnly,
        ))
        .await
        .unwrap();

        assert_eq!(sync.sync_all().await.unwrap().grants, 0);
    }

    #[tokio::test]
    async fn grant_menu_upgrades_in_place() {
        let (repo, sync) = synchronizer();
        let role = RoleDefinition::new("Clerk", "", None).unwrap();
        repo.insert_role(role.clone()).await.unwrap();

        sync.grant_menu(role.id, "billing", PermissionLevel::View, DataScope::SelfOnly)
            .await
            .unwrap();
        sync.grant_menu(
            role.id,
            "billing",
            PermissionLevel::Edit,
            DataScope::Department,
        )
        .await
        .unwrap();

        // One rule, at the upgraded level.
        let subject = role.policy_subject();
        let grants =
            sync.store()
                .filtered_grants(Some(&subject), None, Some("menu:billing"), None);
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].action, Action::Write);
        assert_eq!(grants[0].data_scope, DataScope::Department);
    }

    #[tokio::test]
    async fn revoke_menu_drops_rule_and_row() {
        let (repo, sync) = synchronizer();
        let role = RoleDefinition::new("Clerk", "", None).unwrap();
        repo.insert_role(role.clone()).await.unwrap();
        sync.grant_menu(role.id, "billing", PermissionLevel::View, DataScope::SelfOnly)
            .await
            .unwrap();

        sync.revoke_menu(role.id, "billing").await.unwrap();
        assert_eq!(sync.store().counts().grants, 0);
        assert!(repo.list_role_grants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn grant_for_missing_role_fails_without_store_change() {
        let (_repo, sync) = synchronizer();
        let err = sync
            .grant_menu(
                RoleId::new(),
                "billing",
                PermissionLevel::View,
                DataScope::SelfOnly,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RoleNotFound(_)));
        assert_eq!(sync.store().counts().grants, 0);
    }

    #[tokio::test]
    async fn cycle_creating_reparent_changes_nothing() {
        let (repo, sync) = synchronizer();
        let a = RoleDefinition::new("Role A", "", None).unwrap();
        let b = RoleDefinition::new("Role B", "", None).unwrap();
        repo.insert_role(a.clone()).await.unwrap();
        repo.insert_role(b.clone()).await.unwrap();

        sync.set_role_inheritance(a.id, Some(b.id)).await.unwrap();
        let err = sync.set_role_inheritance(b.id, Some(a.id)).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(AuthzError::InheritanceCycle { .. })));

        // Neither side changed.
        assert!(repo.find_role(b.id).await.unwrap().unwrap().parent_role_id.is_none());
        assert_eq!(sync.store().counts().inheritance, 1);
    }

    #[tokio::test]
    async fn reparent_replaces_previous_edge() {
        let (repo, sync) = synchronizer();
        let child = RoleDefinition::new("Child", "", None).unwrap();
        let p1 = RoleDefinition::new("Parent One", "", None).unwrap();
        let p2 = RoleDefinition::new("Parent Two", "", None).unwrap();
        for r in [&child, &p1, &p2] {
            repo.insert_role(r.clone()).await.unwrap();
        }

        sync.set_role_inheritance(child.id, Some(p1.id)).await.unwrap();
        sync.set_role_inheritance(child.id, Some(p2.id)).await.unwrap();

        let edges = sync.store().snapshot().inheritance;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].parent, p2.role_code);

        sync.set_role_inheritance(child.id, None).await.unwrap();
        assert_eq!(sync.store().counts().inheritance, 0);
    }

    #[tokio::test]
    async fn check_permission_derives_roles_and_departments() {
        let (repo, sync) = synchronizer();
        let dept = DepartmentId::new();
        let role = RoleDefinition::new("Nurse", "", Some(dept)).unwrap();
        repo.insert_role(role.clone()).await.unwrap();
        repo.upsert_role_grant(RoleMenuGrant::new(
            role.id,
            "patients",
            PermissionLevel::View,
            DataScope::Department,
        ))
        .await
        .unwrap();
        let user = UserId::new();
        repo.insert_assignment(UserRoleAssignment::new(user, role.id))
            .await
            .unwrap();
        sync.sync_all().await.unwrap();

        let decision = sync
            .check_permission(user, "menu:patients", Action::Read)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.data_scope, Some(DataScope::Department));

        let denied = sync
            .check_permission(user, "menu:patients", Action::Manage)
            .await
            .unwrap();
        assert!(!denied.allowed);
    }
}
