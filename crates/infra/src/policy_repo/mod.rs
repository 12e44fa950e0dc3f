//! Relational storage for the policy source of truth.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryPolicyRepository;
pub use postgres::PostgresPolicyRepository;
pub use r#trait::{PolicyRepoError, PolicyRepository};
