//! Policy propagation service.
//!
//! Keeps an edge rule store converged on the upstream authority: one pull at
//! startup, then one per interval tick. A failed pull leaves the edge store
//! exactly as it was, so requests keep resolving against the last good rule
//! set until the authority is reachable again.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};

use sentra_authz::{PolicySnapshot, RuleStore, StoreCounts};

use crate::config::PolicyConfig;
use crate::feed::{FeedError, PolicyFeedClient};

/// Observed propagation state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PropagationStats {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_count: u64,
    /// Rule counts from the most recent successful pull: the loaded counts
    /// for a snapshot response, the authority's reported counters for a
    /// counts-only one.
    pub last_reported: StoreCounts,
}

/// Pulls policy from a feed into a local rule store on a timer.
pub struct PolicyPropagationService {
    feed: Arc<dyn PolicyFeedClient>,
    store: Arc<RuleStore>,
    enabled: bool,
    interval: Duration,
    // One pull at a time: a slow timer tick and a concurrent force_sync
    // must not interleave their store updates.
    sync_lock: Mutex<()>,
    stats: StdMutex<PropagationStats>,
    stop: StdMutex<Option<watch::Sender<bool>>>,
}

impl PolicyPropagationService {
    pub fn new(feed: Arc<dyn PolicyFeedClient>, store: Arc<RuleStore>, config: &PolicyConfig) -> Self {
        Self {
            feed,
            store,
            enabled: config.enabled,
            interval: config.sync_interval(),
            sync_lock: Mutex::new(()),
            stats: StdMutex::new(PropagationStats::default()),
            stop: StdMutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn stats(&self) -> PropagationStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the initial pull and spawn the periodic loop. A failing initial
    /// pull is logged but never blocks startup; the loop will retry on the
    /// next tick.
    pub async fn start(self: Arc<Self>) {
        if !self.enabled {
            info!("policy propagation disabled, skipping start");
            return;
        }

        if let Err(err) = self.sync_policies().await {
            warn!(error = %err, "initial policy sync failed, continuing with empty rule set");
        }

        let (tx, mut rx) = watch::channel(false);
        *self.stop.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);

        let service = Arc::clone(&self);
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick duplicates the startup sync.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = rx.changed() => {
                        info!("policy propagation loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = service.sync_policies().await {
                            warn!(error = %err, "periodic policy sync failed");
                        }
                    }
                }
            }
        });
        info!(interval_secs = interval.as_secs(), "policy propagation started");
    }

    /// Request the periodic loop to stop. Idempotent.
    pub fn stop(&self) {
        if let Some(tx) = self.stop.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(true);
        }
    }

    /// One pull from the feed into the store.
    ///
    /// On any failure the store is left untouched. A successful response
    /// carrying a snapshot replaces the store atomically; a counts-only
    /// response clears it and leaves loading to a later full response.
    #[instrument(skip(self))]
    pub async fn sync_policies(&self) -> Result<StoreCounts, FeedError> {
        let _guard = self.sync_lock.lock().await;

        let response = self.feed.fetch_policies().await?;
        if !response.succeeded() {
            let message = response
                .message
                .unwrap_or_else(|| "authority reported failure".to_string());
            return Err(FeedError::Remote(message));
        }

        let reported = StoreCounts {
            grants: count_field(response.role_policy_count),
            memberships: count_field(response.user_role_binding_count),
            inheritance: count_field(response.role_inheritance_count),
        };

        let (counts, last_reported) = match response.snapshot {
            Some(snapshot) => {
                let counts = self.store.load_snapshot(snapshot);
                (counts, counts)
            }
            None => {
                self.store.clear_all();
                info!(
                    role_policy_count = reported.grants,
                    user_role_binding_count = reported.memberships,
                    role_inheritance_count = reported.inheritance,
                    "authority reported counts without rule bodies"
                );
                (StoreCounts::default(), reported)
            }
        };

        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.last_sync_at = Some(Utc::now());
            stats.sync_count += 1;
            stats.last_reported = last_reported;
        }
        info!(
            grants = counts.grants,
            memberships = counts.memberships,
            inheritance = counts.inheritance,
            "policy propagated"
        );
        Ok(counts)
    }

    /// Out-of-band pull, for admin endpoints and tests.
    pub async fn force_sync(&self) -> Result<StoreCounts, FeedError> {
        self.sync_policies().await
    }

    /// Load a snapshot obtained out of band (file import, push payload).
    pub fn load_policies_from_data(&self, snapshot: PolicySnapshot) -> StoreCounts {
        self.store.load_snapshot(snapshot)
    }
}

// Wire counters are lenient i64s; absent or negative means zero.
fn count_field(raw: Option<i64>) -> usize {
    raw.unwrap_or(0).max(0) as usize
}
