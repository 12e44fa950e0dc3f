//! Postgres-backed policy repository.
//!
//! Three tables: `role_definitions`, `role_menu_grants` and
//! `user_role_assignments`. Enums travel as their numeric storage forms
//! (`default_scope`, `level`, `data_scope` are smallints; `status` is text).
//!
//! `replace_role_grants` runs delete-then-insert inside one transaction so
//! a concurrent synchronizer pass reads either the old permission set or
//! the new one, never a partial mix.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use async_trait::async_trait;

use sentra_authz::{DataScope, PermissionLevel, RoleCode};
use sentra_core::{DepartmentId, RoleId, UserId};
use sentra_directory::{RoleDefinition, RoleMenuGrant, RoleStatus, UserRoleAssignment};

use super::r#trait::{PolicyRepoError, PolicyRepository};

#[derive(Debug, Clone)]
pub struct PostgresPolicyRepository {
    pool: Arc<PgPool>,
}

impl PostgresPolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl PolicyRepository for PostgresPolicyRepository {
    #[instrument(skip(self), err)]
    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, PolicyRepoError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, name, description, status, role_code,
                parent_role_id, department_id, default_scope, is_system_role,
                created_by, updated_by, created_at, updated_at
            FROM role_definitions
            ORDER BY created_at
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("list_roles", e))?;

        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn find_role(&self, id: RoleId) -> Result<Option<RoleDefinition>, PolicyRepoError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, name, description, status, role_code,
                parent_role_id, department_id, default_scope, is_system_role,
                created_by, updated_by, created_at, updated_at
            FROM role_definitions
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("find_role", e))?;

        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn insert_role(&self, role: RoleDefinition) -> Result<(), PolicyRepoError> {
        sqlx::query(
            r#"
            INSERT INTO role_definitions (
                id, name, description, status, role_code,
                parent_role_id, department_id, default_scope, is_system_role,
                created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(status_str(role.status))
        .bind(role.role_code.as_str())
        .bind(role.parent_role_id.map(|p| *p.as_uuid()))
        .bind(role.department_id.map(|d| *d.as_uuid()))
        .bind(role.default_scope.as_i16())
        .bind(role.is_system_role)
        .bind(role.created_by.map(|u| *u.as_uuid()))
        .bind(role.updated_by.map(|u| *u.as_uuid()))
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete_role(&self, id: RoleId) -> Result<(), PolicyRepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        sqlx::query("DELETE FROM role_menu_grants WHERE role_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        sqlx::query("DELETE FROM user_role_assignments WHERE role_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        let result = sqlx::query("DELETE FROM role_definitions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        if result.rows_affected() == 0 {
            return Err(PolicyRepoError::NotFound(format!("role {id}")));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(role_id = %child), err)]
    async fn set_role_parent(
        &self,
        child: RoleId,
        parent: Option<RoleId>,
    ) -> Result<(), PolicyRepoError> {
        let result = sqlx::query(
            "UPDATE role_definitions SET parent_role_id = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(child.as_uuid())
        .bind(parent.map(|p| *p.as_uuid()))
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("set_role_parent", e))?;

        if result.rows_affected() == 0 {
            return Err(PolicyRepoError::NotFound(format!("role {child}")));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_role_grants(&self) -> Result<Vec<RoleMenuGrant>, PolicyRepoError> {
        let rows = sqlx::query(
            r#"
            SELECT role_id, menu_id, level, data_scope, created_by, created_at, updated_at
            FROM role_menu_grants
            ORDER BY role_id, menu_id
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("list_role_grants", e))?;

        rows.iter().map(grant_from_row).collect()
    }

    #[instrument(skip(self, grant), fields(role_id = %grant.role_id, menu_id = %grant.menu_id), err)]
    async fn upsert_role_grant(&self, grant: RoleMenuGrant) -> Result<(), PolicyRepoError> {
        sqlx::query(
            r#"
            INSERT INTO role_menu_grants (
                role_id, menu_id, level, data_scope, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (role_id, menu_id)
            DO UPDATE SET level = $3, data_scope = $4, updated_at = $7
            "#,
        )
        .bind(grant.role_id.as_uuid())
        .bind(&grant.menu_id)
        .bind(grant.level.as_i16())
        .bind(grant.data_scope.as_i16())
        .bind(grant.created_by.map(|u| *u.as_uuid()))
        .bind(grant.created_at)
        .bind(grant.updated_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("upsert_role_grant", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(role_id = %role, menu_id), err)]
    async fn delete_role_grant(&self, role: RoleId, menu_id: &str) -> Result<(), PolicyRepoError> {
        let result =
            sqlx::query("DELETE FROM role_menu_grants WHERE role_id = $1 AND menu_id = $2")
                .bind(role.as_uuid())
                .bind(menu_id)
                .execute(self.pool.as_ref())
                .await
                .map_err(|e| map_sqlx_error("delete_role_grant", e))?;

        if result.rows_affected() == 0 {
            return Err(PolicyRepoError::NotFound(format!(
                "grant {role}/{menu_id}"
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, grants), fields(role_id = %role, count = grants.len()), err)]
    async fn replace_role_grants(
        &self,
        role: RoleId,
        grants: Vec<RoleMenuGrant>,
    ) -> Result<(), PolicyRepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("replace_role_grants", e))?;

        sqlx::query("DELETE FROM role_menu_grants WHERE role_id = $1")
            .bind(role.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_role_grants", e))?;

        for grant in grants {
            sqlx::query(
                r#"
                INSERT INTO role_menu_grants (
                    role_id, menu_id, level, data_scope, created_by, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(grant.role_id.as_uuid())
            .bind(&grant.menu_id)
            .bind(grant.level.as_i16())
            .bind(grant.data_scope.as_i16())
            .bind(grant.created_by.map(|u| *u.as_uuid()))
            .bind(grant.created_at)
            .bind(grant.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_role_grants", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("replace_role_grants", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_assignments(&self) -> Result<Vec<UserRoleAssignment>, PolicyRepoError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, role_id, assigned_at, assigned_by
            FROM user_role_assignments
            ORDER BY assigned_at
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("list_assignments", e))?;

        rows.iter().map(assignment_from_row).collect()
    }

    #[instrument(skip(self, assignment), fields(user_id = %assignment.user_id, role_id = %assignment.role_id), err)]
    async fn insert_assignment(
        &self,
        assignment: UserRoleAssignment,
    ) -> Result<(), PolicyRepoError> {
        sqlx::query(
            r#"
            INSERT INTO user_role_assignments (user_id, role_id, assigned_at, assigned_by)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(assignment.user_id.as_uuid())
        .bind(assignment.role_id.as_uuid())
        .bind(assignment.assigned_at)
        .bind(assignment.assigned_by.map(|u| *u.as_uuid()))
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("insert_assignment", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user, role_id = %role), err)]
    async fn delete_assignment(&self, user: UserId, role: RoleId) -> Result<(), PolicyRepoError> {
        let result =
            sqlx::query("DELETE FROM user_role_assignments WHERE user_id = $1 AND role_id = $2")
                .bind(user.as_uuid())
                .bind(role.as_uuid())
                .execute(self.pool.as_ref())
                .await
                .map_err(|e| map_sqlx_error("delete_assignment", e))?;

        if result.rows_affected() == 0 {
            return Err(PolicyRepoError::NotFound(format!(
                "assignment {user}/{role}"
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user), err)]
    async fn roles_of_user(&self, user: UserId) -> Result<Vec<RoleDefinition>, PolicyRepoError> {
        let rows = sqlx::query(
            r#"
            SELECT
                r.id, r.name, r.description, r.status, r.role_code,
                r.parent_role_id, r.department_id, r.default_scope, r.is_system_role,
                r.created_by, r.updated_by, r.created_at, r.updated_at
            FROM role_definitions r
            JOIN user_role_assignments a ON a.role_id = r.id
            WHERE a.user_id = $1
            ORDER BY a.assigned_at
            "#,
        )
        .bind(user.as_uuid())
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("roles_of_user", e))?;

        rows.iter().map(role_from_row).collect()
    }
}

fn role_from_row(row: &PgRow) -> Result<RoleDefinition, PolicyRepoError> {
    let status_raw: String = try_get(row, "status")?;
    let scope_raw: i16 = try_get(row, "default_scope")?;

    Ok(RoleDefinition {
        id: RoleId::from_uuid(try_get(row, "id")?),
        name: try_get(row, "name")?,
        description: try_get(row, "description")?,
        status: status_from_str(&status_raw)?,
        role_code: RoleCode::new(try_get::<String>(row, "role_code")?),
        parent_role_id: try_get::<Option<Uuid>>(row, "parent_role_id")?.map(RoleId::from_uuid),
        department_id: try_get::<Option<Uuid>>(row, "department_id")?.map(DepartmentId::from_uuid),
        default_scope: DataScope::from_i16(scope_raw).ok_or_else(|| {
            PolicyRepoError::Storage(format!("invalid default_scope value {scope_raw}"))
        })?,
        is_system_role: try_get(row, "is_system_role")?,
        created_by: try_get::<Option<Uuid>>(row, "created_by")?.map(UserId::from_uuid),
        updated_by: try_get::<Option<Uuid>>(row, "updated_by")?.map(UserId::from_uuid),
        created_at: try_get::<DateTime<Utc>>(row, "created_at")?,
        updated_at: try_get::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn grant_from_row(row: &PgRow) -> Result<RoleMenuGrant, PolicyRepoError> {
    let level_raw: i16 = try_get(row, "level")?;
    let scope_raw: i16 = try_get(row, "data_scope")?;

    Ok(RoleMenuGrant {
        role_id: RoleId::from_uuid(try_get(row, "role_id")?),
        menu_id: try_get(row, "menu_id")?,
        level: PermissionLevel::from_i16(level_raw)
            .ok_or_else(|| PolicyRepoError::Storage(format!("invalid level value {level_raw}")))?,
        data_scope: DataScope::from_i16(scope_raw).ok_or_else(|| {
            PolicyRepoError::Storage(format!("invalid data_scope value {scope_raw}"))
        })?,
        created_by: try_get::<Option<Uuid>>(row, "created_by")?.map(UserId::from_uuid),
        created_at: try_get::<DateTime<Utc>>(row, "created_at")?,
        updated_at: try_get::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<UserRoleAssignment, PolicyRepoError> {
    Ok(UserRoleAssignment {
        user_id: UserId::from_uuid(try_get(row, "user_id")?),
        role_id: RoleId::from_uuid(try_get(row, "role_id")?),
        assigned_at: try_get::<DateTime<Utc>>(row, "assigned_at")?,
        assigned_by: try_get::<Option<Uuid>>(row, "assigned_by")?.map(UserId::from_uuid),
    })
}

fn try_get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, PolicyRepoError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| PolicyRepoError::Storage(format!("column {column}: {e}")))
}

fn status_str(status: RoleStatus) -> &'static str {
    match status {
        RoleStatus::Active => "active",
        RoleStatus::Inactive => "inactive",
        RoleStatus::Deprecated => "deprecated",
    }
}

fn status_from_str(raw: &str) -> Result<RoleStatus, PolicyRepoError> {
    match raw {
        "active" => Ok(RoleStatus::Active),
        "inactive" => Ok(RoleStatus::Inactive),
        "deprecated" => Ok(RoleStatus::Deprecated),
        other => Err(PolicyRepoError::Storage(format!(
            "invalid role status {other:?}"
        ))),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PolicyRepoError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => PolicyRepoError::Duplicate(msg),
                _ => PolicyRepoError::Storage(msg),
            }
        }
        sqlx::Error::RowNotFound => {
            PolicyRepoError::NotFound(format!("row not found in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            PolicyRepoError::Storage(format!("connection pool closed in {operation}"))
        }
        _ => PolicyRepoError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}
