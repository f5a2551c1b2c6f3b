//! Single-slot queue for contextual actions raised while no chat surface is
//! open.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use services::browser::KeyValueStore;
use shared::action::PendingAction;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PENDING_KEY: &str = "pendingRequest";
pub const LAST_CONTEXT_KEY: &str = "lastContextTarget";

/// One slot, last write wins. Entries older than the TTL read as absent and
/// are purged on read.
pub struct PendingActionQueue {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl PendingActionQueue {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Replace whatever is pending with `action`.
    pub async fn store(&self, action: &PendingAction) -> Result<()> {
        self.store.set(PENDING_KEY, serde_json::to_value(action)?).await?;
        info!(kind = action.kind.as_str(), "pending action stored");
        Ok(())
    }

    pub async fn peek(&self) -> Result<Option<PendingAction>> {
        self.peek_at(Utc::now()).await
    }

    pub async fn peek_at(&self, now: DateTime<Utc>) -> Result<Option<PendingAction>> {
        let Some(value) = self.store.get(PENDING_KEY).await? else {
            return Ok(None);
        };
        let action: PendingAction = match serde_json::from_value(value) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "discarding unreadable pending action");
                self.clear().await?;
                return Ok(None);
            }
        };
        if action.is_stale(now, self.ttl) {
            debug!(
                kind = action.kind.as_str(),
                age_secs = action.age(now).num_seconds(),
                "discarding stale pending action"
            );
            self.clear().await?;
            return Ok(None);
        }
        Ok(Some(action))
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(PENDING_KEY).await
    }

    /// Read-and-clear, done once when the chat surface activates.
    pub async fn take(&self) -> Result<Option<PendingAction>> {
        let action = self.peek().await?;
        if let Some(action) = &action {
            self.clear().await?;
            info!(kind = action.kind.as_str(), "pending action consumed");
        }
        Ok(action)
    }

    /// Debug record of the last right-clicked context.
    pub async fn record_context_target(&self, target: Value) -> Result<()> {
        self.store
            .set(
                LAST_CONTEXT_KEY,
                json!({ "target": target, "recordedAt": Utc::now().timestamp_millis() }),
            )
            .await
    }
}
