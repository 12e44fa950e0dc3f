//! Role-menu permission grants and the per-user merged permission view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sentra_authz::{DataScope, PermissionLevel};
use sentra_core::{RoleId, UserId};

/// One authored grant: a role's permission level on a menu entry.
///
/// Grants reference menus by *semantic* identifier, never the storage key,
/// so they survive menu tree re-imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleMenuGrant {
    pub role_id: RoleId,
    pub menu_id: String,
    pub level: PermissionLevel,
    pub data_scope: DataScope,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleMenuGrant {
    pub fn new(
        role_id: RoleId,
        menu_id: impl Into<String>,
        level: PermissionLevel,
        data_scope: DataScope,
    ) -> Self {
        let now = Utc::now();
        Self {
            role_id,
            menu_id: menu_id.into(),
            level,
            data_scope,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user's effective permission on a single menu entry, after merging the
/// grants of all their roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuPermission {
    pub menu_id: String,
    pub level: PermissionLevel,
    pub data_scope: DataScope,
}

impl MenuPermission {
    pub fn new(menu_id: impl Into<String>, level: PermissionLevel, data_scope: DataScope) -> Self {
        Self {
            menu_id: menu_id.into(),
            level,
            data_scope,
        }
    }

    /// Coarse level string front-end clients consume.
    pub fn frontend_level(&self) -> &'static str {
        self.level.frontend_level()
    }
}

/// Merge per-role permission lists into one list per menu, keeping the
/// strongest level and broadest scope seen for each entry. A user holding
/// `view`/`self` from one role and `edit`/`dept` from another ends up with
/// `edit`/`dept`. Output is sorted by menu identifier for stable responses.
pub fn merge_menu_permissions<I>(lists: I) -> Vec<MenuPermission>
where
    I: IntoIterator<Item = Vec<MenuPermission>>,
{
    let mut merged: BTreeMap<String, (PermissionLevel, DataScope)> = BTreeMap::new();
    for list in lists {
        for perm in list {
            merged
                .entry(perm.menu_id)
                .and_modify(|(level, scope)| {
                    *level = PermissionLevel::merge(*level, perm.level);
                    *scope = DataScope::merge(*scope, perm.data_scope);
                })
                .or_insert((perm.level, perm.data_scope));
        }
    }
    merged
        .into_iter()
        .map(|(menu_id, (level, data_scope))| MenuPermission {
            menu_id,
            level,
            data_scope,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_strongest_level_and_broadest_scope() {
        let nurse = vec![
            MenuPermission::new("patients", PermissionLevel::View, DataScope::SelfOnly),
            MenuPermission::new("schedule", PermissionLevel::Edit, DataScope::Department),
        ];
        let lead = vec![
            MenuPermission::new("patients", PermissionLevel::Edit, DataScope::Department),
            MenuPermission::new("reports", PermissionLevel::View, DataScope::Organization),
        ];

        let merged = merge_menu_permissions([nurse, lead]);
        assert_eq!(
            merged,
            vec![
                MenuPermission::new("patients", PermissionLevel::Edit, DataScope::Department),
                MenuPermission::new("reports", PermissionLevel::View, DataScope::Organization),
                MenuPermission::new("schedule", PermissionLevel::Edit, DataScope::Department),
            ]
        );
    }

    #[test]
    fn merge_is_order_independent() {
        let a = vec![MenuPermission::new(
            "patients",
            PermissionLevel::Full,
            DataScope::SelfOnly,
        )];
        let b = vec![MenuPermission::new(
            "patients",
            PermissionLevel::View,
            DataScope::Organization,
        )];

        let forward = merge_menu_permissions([a.clone(), b.clone()]);
        let reverse = merge_menu_permissions([b, a]);
        assert_eq!(forward, reverse);
        assert_eq!(forward[0].level, PermissionLevel::Full);
        assert_eq!(forward[0].data_scope, DataScope::Organization);
    }

    #[test]
    fn merge_of_empty_input_is_empty() {
        assert!(merge_menu_permissions(Vec::<Vec<MenuPermission>>::new()).is_empty());
    }

    #[test]
    fn frontend_level_is_coarse() {
        let perm = MenuPermission::new("patients", PermissionLevel::Manage, DataScope::Department);
        assert_eq!(perm.frontend_level(), "write");
    }
}
