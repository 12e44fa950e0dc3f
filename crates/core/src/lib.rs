//! Shared kernel for the access-control platform.
//!
//! Strongly-typed identifiers and the domain error model. Everything here is
//! deterministic and free of IO; infrastructure concerns live in `sentra-infra`.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{DepartmentId, MenuId, RoleId, UserId};
