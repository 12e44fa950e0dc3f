//! User-role assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentra_core::{RoleId, UserId};

/// Membership of a user in a role. The grant domain comes from the role's
/// owning department at sync time, not from the assignment itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRoleAssignment {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Option<UserId>,
}

impl UserRoleAssignment {
    pub fn new(user_id: UserId, role_id: RoleId) -> Self {
        Self {
            user_id,
            role_id,
            assigned_at: Utc::now(),
            assigned_by: None,
        }
    }

    pub fn assigned_by(mut self, admin: UserId) -> Self {
        self.assigned_by = Some(admin);
        self
    }
}
