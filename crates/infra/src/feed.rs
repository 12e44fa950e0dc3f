//! Policy feed boundary.
//!
//! Edge nodes pull compiled policy from an upstream authority. The wire
//! response is lenient: every field is optional and absent counts default
//! (missing counts are zero, missing `success` means success), so older
//! authorities that omit newer fields keep working.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use sentra_authz::PolicySnapshot;

use crate::synchronizer::{PolicySynchronizer, SyncError};

/// Feed fetch failure.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The authority could not be reached or the response was unreadable.
    #[error("policy feed transport error: {0}")]
    Transport(String),

    /// The authority answered but reported failure.
    #[error("policy feed remote error: {0}")]
    Remote(String),
}

/// Wire form of one policy pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySyncResponse {
    pub success: Option<bool>,
    pub role_policy_count: Option<i64>,
    pub user_role_binding_count: Option<i64>,
    pub role_inheritance_count: Option<i64>,
    pub message: Option<String>,
    /// Full rule contents; authorities that only report counts omit this.
    pub snapshot: Option<PolicySnapshot>,
}

impl PolicySyncResponse {
    pub fn succeeded(&self) -> bool {
        self.success.unwrap_or(true)
    }
}

/// Client seam for pulling policy from an authority.
#[async_trait]
pub trait PolicyFeedClient: Send + Sync {
    async fn fetch_policies(&self) -> Result<PolicySyncResponse, FeedError>;
}

/// In-process feed: the authority is a local synchronizer. Each pull runs a
/// full sync against storage and returns the resulting snapshot.
pub struct SynchronizerFeed {
    synchronizer: Arc<PolicySynchronizer>,
}

impl SynchronizerFeed {
    pub fn new(synchronizer: Arc<PolicySynchronizer>) -> Self {
        Self { synchronizer }
    }
}

#[async_trait]
impl PolicyFeedClient for SynchronizerFeed {
    async fn fetch_policies(&self) -> Result<PolicySyncResponse, FeedError> {
        let summary = self
            .synchronizer
            .sync_all()
            .await
            .map_err(|e: SyncError| FeedError::Transport(e.to_string()))?;

        Ok(PolicySyncResponse {
            success: Some(true),
            role_policy_count: Some(summary.grants as i64),
            user_role_binding_count: Some(summary.memberships as i64),
            role_inheritance_count: Some(summary.inheritance as i64),
            message: None,
            snapshot: Some(self.synchronizer.store().snapshot()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_default_leniently() {
        let response: PolicySyncResponse = serde_json::from_str("{}").unwrap();
        assert!(response.succeeded());
        assert_eq!(response.role_policy_count, None);
        assert!(response.snapshot.is_none());

        let response: PolicySyncResponse =
            serde_json::from_str(r#"{"success": false, "message": "unavailable"}"#).unwrap();
        assert!(!response.succeeded());
        assert_eq!(response.message.as_deref(), Some("unavailable"));
    }

    #[test]
    fn counts_only_response_parses() {
        let raw = r#"{"success": true, "role_policy_count": 12, "user_role_binding_count": 7}"#;
        let response: PolicySyncResponse = serde_json::from_str(raw).unwrap();
        assert!(response.succeeded());
        assert_eq!(response.role_policy_count, Some(12));
        assert_eq!(response.role_inheritance_count, None);
        assert!(response.snapshot.is_none());
    }
}
