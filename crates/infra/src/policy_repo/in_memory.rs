//! In-memory policy repository.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use sentra_core::{RoleId, UserId};
use sentra_directory::{RoleDefinition, RoleMenuGrant, UserRoleAssignment};

use super::r#trait::{PolicyRepoError, PolicyRepository};

#[derive(Debug, Default)]
struct Tables {
    roles: HashMap<RoleId, RoleDefinition>,
    // keyed by (role, menu semantic id)
    grants: HashMap<(RoleId, String), RoleMenuGrant>,
    assignments: HashMap<(UserId, RoleId), UserRoleAssignment>,
}

#[derive(Debug, Default)]
pub struct InMemoryPolicyRepository {
    tables: RwLock<Tables>,
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, PolicyRepoError> {
        Ok(self.read().roles.values().cloned().collect())
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<RoleDefinition>, PolicyRepoError> {
        Ok(self.read().roles.get(&id).cloned())
    }

    async fn insert_role(&self, role: RoleDefinition) -> Result<(), PolicyRepoError> {
        let mut tables = self.write();
        if tables.roles.contains_key(&role.id) {
            return Err(PolicyRepoError::Duplicate(format!("role {}", role.id)));
        }
        tables.roles.insert(role.id, role);
        Ok(())
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), PolicyRepoError> {
        let mut tables = self.write();
        if tables.roles.remove(&id).is_none() {
            return Err(PolicyRepoError::NotFound(format!("role {id}")));
        }
        tables.grants.retain(|(role, _), _| *role != id);
        tables.assignments.retain(|(_, role), _| *role != id);
        Ok(())
    }

    async fn set_role_parent(
        &self,
        child: RoleId,
        parent: Option<RoleId>,
    ) -> Result<(), PolicyRepoError> {
        let mut tables = self.write();
        let role = tables
            .roles
            .get_mut(&child)
            .ok_or_else(|| PolicyRepoError::NotFound(format!("role {child}")))?;
        role.parent_role_id = parent;
        Ok(())
    }

    async fn list_role_grants(&self) -> Result<Vec<RoleMenuGrant>, PolicyRepoError> {
        Ok(self.read().grants.values().cloned().collect())
    }

    async fn upsert_role_grant(&self, grant: RoleMenuGrant) -> Result<(), PolicyRepoError> {
        let key = (grant.role_id, grant.menu_id.clone());
        self.write().grants.insert(key, grant);
        Ok(())
    }

    async fn delete_role_grant(&self, role: RoleId, menu_id: &str) -> Result<(), PolicyRepoError> {
        let key = (role, menu_id.to_string());
        if self.write().grants.remove(&key).is_none() {
            return Err(PolicyRepoError::NotFound(format!(
                "grant {role}/{menu_id}"
            )));
        }
        Ok(())
    }

    async fn replace_role_grants(
        &self,
        role: RoleId,
        grants: Vec<RoleMenuGrant>,
    ) -> Result<(), PolicyRepoError> {
        let mut tables = self.write();
        tables.grants.retain(|(r, _), _| *r != role);
        for grant in grants {
            let key = (grant.role_id, grant.menu_id.clone());
            tables.grants.insert(key, grant);
        }
        Ok(())
    }

    async fn list_assignments(&self) -> Result<Vec<UserRoleAssignment>, PolicyRepoError> {
        Ok(self.read().assignments.values().cloned().collect())
    }

    async fn insert_assignment(
        &self,
        assignment: UserRoleAssignment,
    ) -> Result<(), PolicyRepoError> {
        let mut tables = self.write();
        let key = (assignment.user_id, assignment.role_id);
        if tables.assignments.contains_key(&key) {
            return Err(PolicyRepoError::Duplicate(format!(
                "assignment {}/{}",
                assignment.user_id, assignment.role_id
            )));
        }
        tables.assignments.insert(key, assignment);
        Ok(())
    }

    async fn delete_assignment(&self, user: UserId, role: RoleId) -> Result<(), PolicyRepoError> {
        if self.write().assignments.remove(&(user, role)).is_none() {
            return Err(PolicyRepoError::NotFound(format!(
                "assignment {user}/{role}"
            )));
        }
        Ok(())
    }

    async fn roles_of_user(&self, user: UserId) -> Result<Vec<RoleDefinition>, PolicyRepoError> {
        let tables = self.read();
        Ok(tables
            .assignments
            .keys()
            .filter(|(u, _)| *u == user)
            .filter_map(|(_, role)| tables.roles.get(role).cloned())
            .collect())
    }
}
