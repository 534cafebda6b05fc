//! Collapses rapid-fire messages from one user into a single turn.
//!
//! Every inbound request enqueues itself, sleeps for the batch window, then
//! re-reads the queue. Only the request holding the newest entry proceeds;
//! the others defer and leave their text for the winner to pick up. The
//! winner claims exactly the rows it read, so each message lands in one batch.

use crate::state::{PendingMessage, StateStore};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Separator between consecutive messages in a combined batch.
pub const BATCH_SEPARATOR: &str = "\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub text: String,
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// This request won the batch and should run the turn.
    Ready(Batch),
    /// A newer message exists; a later request will run the turn.
    Deferred,
}

pub struct MessageBatcher {
    store: Arc<dyn StateStore>,
    window: Duration,
}

impl MessageBatcher {
    pub fn new(store: Arc<dyn StateStore>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Enqueue `text`, wait out the window, and decide whether this request
    /// runs the combined turn.
    pub async fn submit(&self, user_key: &str, text: &str, message_id: &str) -> Result<BatchOutcome> {
        self.store.enqueue_pending(user_key, text, message_id).await?;

        if !self.window.is_zero() {
            tokio::time::sleep(self.window).await;
        }

        let pending = self.store.list_pending(user_key).await?;
        let Some(own) = pending.iter().find(|p| p.message_id == message_id) else {
            // Already claimed by another winner, or expired while sleeping.
            debug!(user = %user_key, message_id, "own pending entry gone, deferring");
            return Ok(BatchOutcome::Deferred);
        };

        if self.store.has_newer(user_key, own.received_at).await? || loses_tie(own, &pending) {
            debug!(user = %user_key, message_id, "newer message pending, deferring");
            return Ok(BatchOutcome::Deferred);
        }

        // Claim exactly what was read; later arrivals start a fresh batch.
        let ids: Vec<String> = pending.into_iter().map(|p| p.message_id).collect();
        let claimed = self.store.claim_pending(user_key, &ids).await?;
        if claimed.is_empty() {
            debug!(user = %user_key, message_id, "batch claimed elsewhere, deferring");
            return Ok(BatchOutcome::Deferred);
        }

        let text = claimed
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(BATCH_SEPARATOR);
        let message_ids = claimed.into_iter().map(|p| p.message_id).collect();
        Ok(BatchOutcome::Ready(Batch { text, message_ids }))
    }
}

/// Entries with an identical `received_at` are ordered by message id; the
/// greatest id wins.
fn loses_tie(own: &PendingMessage, pending: &[PendingMessage]) -> bool {
    pending
        .iter()
        .any(|p| p.received_at == own.received_at && p.message_id > own.message_id)
}
