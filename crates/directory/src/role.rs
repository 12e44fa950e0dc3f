//! Role definitions.
//!
//! A role's *code* is a stable slug generated once from its name at creation
//! time; it is the matcher subject, so it must never change even if the role
//! is renamed. The optional owning department becomes the grant domain
//! (wildcard when absent: an organization-wide role).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sentra_authz::{DataScope, Domain, RoleCode, Subject};
use sentra_core::{DepartmentId, DomainError, DomainResult, RoleId, UserId};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    Active,
    Inactive,
    Deprecated,
}

/// A role as authored by administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    pub status: RoleStatus,
    /// Stable matcher subject slug; generated from `name` if not supplied.
    pub role_code: RoleCode,
    /// Parent in the inheritance DAG, if any.
    pub parent_role_id: Option<RoleId>,
    /// Owning department; `None` means organization-wide (wildcard domain).
    pub department_id: Option<DepartmentId>,
    pub default_scope: DataScope,
    /// Protected built-in roles cannot be deleted.
    pub is_system_role: bool,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleDefinition {
    /// Create a role, generating the role code from the name when no
    /// explicit code is given.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        department_id: Option<DepartmentId>,
    ) -> DomainResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        let now = Utc::now();
        Ok(Self {
            id: RoleId::new(),
            role_code: generate_role_code(&name),
            name,
            description: description.into(),
            status: RoleStatus::Inactive,
            parent_role_id: None,
            department_id,
            default_scope: DataScope::SelfOnly,
            is_system_role: false,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_role_code(mut self, code: impl Into<String>) -> Self {
        self.role_code = RoleCode::new(code);
        self
    }

    pub fn with_parent(mut self, parent: RoleId) -> Self {
        self.parent_role_id = Some(parent);
        self
    }

    pub fn with_default_scope(mut self, scope: DataScope) -> Self {
        self.default_scope = scope;
        self
    }

    pub fn as_system_role(mut self) -> Self {
        self.is_system_role = true;
        self
    }

    /// Rename the role. Empty input means "unchanged"; anything else is
    /// re-validated. The role code deliberately stays untouched so existing
    /// grants keep matching.
    pub fn rename(&mut self, name: impl Into<String>) -> DomainResult<()> {
        let name = name.into();
        if name.is_empty() {
            return Ok(());
        }
        validate_name(&name)?;
        self.name = name;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Deletion guard: protected system roles must survive admin cleanups.
    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.is_system_role {
            return Err(DomainError::Protected);
        }
        Ok(())
    }

    /// Matcher subject for grants authored against this role.
    pub fn policy_subject(&self) -> Subject {
        Subject::Role(self.role_code.clone())
    }

    /// Matcher domain: the owning department, or wildcard for
    /// organization-wide roles.
    pub fn policy_domain(&self) -> Domain {
        match self.department_id {
            Some(dept) => Domain::Department(dept),
            None => Domain::Wildcard,
        }
    }
}

fn validate_name(name: &str) -> DomainResult<()> {
    let len = name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(DomainError::validation(format!(
            "role name length must be between {NAME_MIN} and {NAME_MAX} characters"
        )));
    }
    Ok(())
}

/// Derive a stable slug from a role name: lowercase ASCII alphanumerics,
/// everything else collapsed to single underscores. Names with nothing
/// usable (e.g. fully non-Latin) fall back to a random 8-hex-char code.
pub fn generate_role_code(name: &str) -> RoleCode {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for ch in name.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            slug.push(lower);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    let slug = slug.trim_matches('_').to_string();

    if slug.is_empty() {
        let fallback = Uuid::now_v7().simple().to_string();
        return RoleCode::new(&fallback[..8]);
    }
    RoleCode::new(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_snake_case_codes() {
        assert_eq!(generate_role_code("Head Nurse").as_str(), "head_nurse");
        assert_eq!(generate_role_code("Admin").as_str(), "admin");
        assert_eq!(generate_role_code("A&B -- Ops!").as_str(), "a_b_ops");
        assert_eq!(generate_role_code("  spaced  out  ").as_str(), "spaced_out");
    }

    #[test]
    fn non_ascii_names_fall_back_to_random_code() {
        let code = generate_role_code("主任医师");
        assert_eq!(code.as_str().len(), 8);
        assert!(code.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn name_length_is_validated() {
        assert!(RoleDefinition::new("a", "", None).is_err());
        assert!(RoleDefinition::new("x".repeat(51), "", None).is_err());
        assert!(RoleDefinition::new("ok", "", None).is_ok());
    }

    #[test]
    fn rename_revalidates_and_treats_empty_as_unchanged() {
        let mut role = RoleDefinition::new("Head Nurse", "", None).unwrap();

        role.rename("").unwrap();
        assert_eq!(role.name, "Head Nurse");

        assert!(role.rename("x").is_err());
        assert!(role.rename("y".repeat(51)).is_err());
        assert_eq!(role.name, "Head Nurse");
    }

    #[test]
    fn rename_keeps_role_code() {
        let mut role = RoleDefinition::new("Head Nurse", "", None).unwrap();
        let code = role.role_code.clone();
        role.rename("Senior Head Nurse").unwrap();
        assert_eq!(role.role_code, code);
        assert_eq!(role.name, "Senior Head Nurse");
    }

    #[test]
    fn system_roles_are_protected() {
        let role = RoleDefinition::new("Administrator", "", None)
            .unwrap()
            .as_system_role();
        assert_eq!(role.ensure_deletable(), Err(DomainError::Protected));

        let custom = RoleDefinition::new("Analyst", "", None).unwrap();
        assert!(custom.ensure_deletable().is_ok());
    }

    #[test]
    fn policy_domain_defaults_to_wildcard() {
        let global = RoleDefinition::new("Auditor", "", None).unwrap();
        assert_eq!(global.policy_domain(), Domain::Wildcard);

        let dept = DepartmentId::new();
        let scoped = RoleDefinition::new("Clerk", "", Some(dept)).unwrap();
        assert_eq!(scoped.policy_domain(), Domain::Department(dept));
    }
}
