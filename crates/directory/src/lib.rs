//! Relational-side domain model for the policy source of truth: role
//! definitions, menu items, role-menu permission grants and user-role
//! assignments.
//!
//! These records are what the policy synchronizer reads to rebuild the
//! authoritative rule store. Persistence lives in `sentra-infra`.

pub mod assignment;
pub mod grant;
pub mod menu;
pub mod role;

pub use assignment::UserRoleAssignment;
pub use grant::{merge_menu_permissions, MenuPermission, RoleMenuGrant};
pub use menu::MenuItem;
pub use role::{generate_role_code, RoleDefinition, RoleStatus};
