//! Infrastructure layer: policy persistence, synchronization and
//! propagation.
//!
//! The relational side (`policy_repo`) is the source of truth. The
//! synchronizer compiles its rows into rule-store form, the feed exposes the
//! compiled rules to downstream consumers, and the propagation service keeps
//! an edge rule store converged on a timer.

pub mod config;
pub mod feed;
pub mod policy_repo;
pub mod propagation;
pub mod synchronizer;

pub use config::PolicyConfig;
pub use feed::{FeedError, PolicyFeedClient, PolicySyncResponse, SynchronizerFeed};
pub use policy_repo::{InMemoryPolicyRepository, PolicyRepoError, PolicyRepository, PostgresPolicyRepository};
pub use propagation::{PolicyPropagationService, PropagationStats};
pub use synchronizer::{PolicySynchronizer, SyncError, SyncSummary};
