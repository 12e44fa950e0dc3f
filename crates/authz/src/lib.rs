//! Pure permission decision engine (no IO).
//!
//! Holds the in-memory rule set, the matcher that evaluates authorization
//! queries against it, and the request-time permission resolution algorithm.
//! Policy loading and persistence are `sentra-infra`'s job; this crate is
//! intentionally decoupled from storage and transport.

pub mod action;
pub mod error;
pub mod grant;
pub mod matcher;
pub mod model;
pub mod resolve;
pub mod scope;
pub mod store;
pub mod subject;

pub use action::Action;
pub use error::AuthzError;
pub use grant::{GrantRule, InheritanceEdge, MembershipEdge};
pub use model::{ModelError, PolicyModel, DEFAULT_MODEL};
pub use resolve::{check_permission, CheckDecision, PermissionGate};
pub use scope::{DataScope, PermissionLevel};
pub use store::{PolicySnapshot, RuleStore, StoreCounts};
pub use subject::{Domain, RoleCode, Subject};
