//! Repository abstraction over the policy tables.
//!
//! Three tables back the rule store: role definitions, role-menu grants and
//! user-role assignments. The synchronizer only ever reads whole tables; the
//! write operations exist for the admin surface and keep the incremental
//! sync paths honest.

use async_trait::async_trait;
use thiserror::Error;

use sentra_core::{RoleId, UserId};
use sentra_directory::{RoleDefinition, RoleMenuGrant, UserRoleAssignment};

/// Policy storage operation error.
#[derive(Debug, Error)]
pub enum PolicyRepoError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("duplicate row: {0}")]
    Duplicate(String),
}

/// Persistence seam for role definitions, grants and assignments.
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// All role definitions, regardless of status.
    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, PolicyRepoError>;

    async fn find_role(&self, id: RoleId) -> Result<Option<RoleDefinition>, PolicyRepoError>;

    async fn insert_role(&self, role: RoleDefinition) -> Result<(), PolicyRepoError>;

    async fn delete_role(&self, id: RoleId) -> Result<(), PolicyRepoError>;

    /// Record (or clear) a role's parent in the inheritance graph.
    async fn set_role_parent(
        &self,
        child: RoleId,
        parent: Option<RoleId>,
    ) -> Result<(), PolicyRepoError>;

    /// All authored role-menu grants.
    async fn list_role_grants(&self) -> Result<Vec<RoleMenuGrant>, PolicyRepoError>;

    /// Insert or update the grant identified by (role, menu).
    async fn upsert_role_grant(&self, grant: RoleMenuGrant) -> Result<(), PolicyRepoError>;

    async fn delete_role_grant(&self, role: RoleId, menu_id: &str) -> Result<(), PolicyRepoError>;

    /// Replace every grant of one role in a single transaction, so readers
    /// never observe a half-written permission set.
    async fn replace_role_grants(
        &self,
        role: RoleId,
        grants: Vec<RoleMenuGrant>,
    ) -> Result<(), PolicyRepoError>;

    /// All user-role assignments.
    async fn list_assignments(&self) -> Result<Vec<UserRoleAssignment>, PolicyRepoError>;

    async fn insert_assignment(
        &self,
        assignment: UserRoleAssignment,
    ) -> Result<(), PolicyRepoError>;

    async fn delete_assignment(&self, user: UserId, role: RoleId) -> Result<(), PolicyRepoError>;

    /// Roles currently assigned to one user.
    async fn roles_of_user(&self, user: UserId) -> Result<Vec<RoleDefinition>, PolicyRepoError>;
}
