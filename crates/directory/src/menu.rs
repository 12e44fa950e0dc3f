//! Menu items.
//!
//! A menu item's *semantic identifier* is stable across tree regenerations;
//! the numeric storage key changes with every re-import and is never exposed
//! to the permission matcher. Versions increase monotonically per product
//! line, and the content hash lets importers skip identical snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentra_core::{DomainError, DomainResult, MenuId, UserId};

/// One node of a product line's menu tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuId,
    /// Product line the tree belongs to (multi-product isolation).
    pub product_line: String,
    /// Stable identifier, unique per (product line, version).
    pub semantic_id: String,
    /// Monotonically increasing per product line.
    pub version: u32,
    /// Hash of the source tree content, for deduplicating identical imports.
    pub content_hash: String,
    pub name: String,
    pub path: String,
    pub component: Option<String>,
    pub icon: Option<String>,
    pub parent_id: Option<MenuId>,
    pub sort: i32,
    /// Explicit permission object override (e.g. `patient:read`); when
    /// absent the object derives from the semantic identifier.
    pub perm_code: Option<String>,
    /// Backend API path guarded alongside the menu entry, if any.
    pub api_path: Option<String>,
    /// Button-level permission entries are not rendered as menu nodes.
    pub is_button: bool,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MenuItem {
    pub fn new(
        product_line: impl Into<String>,
        semantic_id: impl Into<String>,
        version: u32,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> DomainResult<Self> {
        let semantic_id = semantic_id.into();
        if semantic_id.is_empty() {
            return Err(DomainError::validation("menu semantic id must not be empty"));
        }
        if version == 0 {
            return Err(DomainError::validation("menu version starts at 1"));
        }
        let now = Utc::now();
        Ok(Self {
            id: MenuId::new(),
            product_line: product_line.into(),
            semantic_id,
            version,
            content_hash: String::new(),
            name: name.into(),
            path: path.into(),
            component: None,
            icon: None,
            parent_id: None,
            sort: 0,
            perm_code: None,
            api_path: None,
            is_button: false,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_perm_code(mut self, code: impl Into<String>) -> Self {
        self.perm_code = Some(code.into());
        self
    }

    pub fn with_api_path(mut self, path: impl Into<String>) -> Self {
        self.api_path = Some(path.into());
        self
    }

    pub fn as_button(mut self) -> Self {
        self.is_button = true;
        self
    }

    /// Matcher object for grants against this menu entry: the explicit
    /// override when set, otherwise `menu:<semantic-id>`. The storage key is
    /// the last resort and only reachable for legacy rows with no semantic
    /// identifier.
    pub fn permission_object(&self) -> String {
        if let Some(code) = &self.perm_code {
            if !code.is_empty() {
                return code.clone();
            }
        }
        if !self.semantic_id.is_empty() {
            return format!("menu:{}", self.semantic_id);
        }
        format!("menu:{}", self.id)
    }

    /// Matcher object for API-path pattern matching, if one is attached.
    pub fn api_object(&self) -> Option<&str> {
        self.api_path.as_deref().filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_object_prefers_override() {
        let item = MenuItem::new("emr", "patients", 1, "Patients", "/patients")
            .unwrap()
            .with_perm_code("patient:read");
        assert_eq!(item.permission_object(), "patient:read");
    }

    #[test]
    fn permission_object_derives_from_semantic_id() {
        let item = MenuItem::new("emr", "patients", 3, "Patients", "/patients").unwrap();
        assert_eq!(item.permission_object(), "menu:patients");
    }

    #[test]
    fn object_is_stable_across_versions() {
        let v1 = MenuItem::new("emr", "reports", 1, "Reports", "/reports").unwrap();
        let v2 = MenuItem::new("emr", "reports", 2, "Reports", "/reports").unwrap();
        assert_ne!(v1.id, v2.id);
        assert_eq!(v1.permission_object(), v2.permission_object());
    }

    #[test]
    fn rejects_empty_semantic_id_and_zero_version() {
        assert!(MenuItem::new("emr", "", 1, "X", "/x").is_err());
        assert!(MenuItem::new("emr", "x", 0, "X", "/x").is_err());
    }

    #[test]
    fn api_object_filters_empty() {
        let item = MenuItem::new("emr", "users", 1, "Users", "/users")
            .unwrap()
            .with_api_path("/api/v1/users/*");
        assert_eq!(item.api_object(), Some("/api/v1/users/*"));

        let bare = MenuItem::new("emr", "users", 1, "Users", "/users").unwrap();
        assert_eq!(bare.api_object(), None);
    }
}
