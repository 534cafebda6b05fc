//! Conversation state: idempotency records, the pending-message batch queue,
//! and the per-user clarification context.
//!
//! All three namespaces carry their own `expire_at`. Expiry is checked in
//! application code against the store's clock; an expired row is treated
//! exactly like a missing one.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::nlp::Intent;

pub use sqlite::SqliteStateStore;

/// Lifetimes for the three namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTtls {
    pub idempotency: Duration,
    pub pending: Duration,
    pub context: Duration,
}

impl Default for StateTtls {
    fn default() -> Self {
        Self {
            idempotency: Duration::hours(1),
            pending: Duration::minutes(10),
            context: Duration::minutes(10),
        }
    }
}

/// A message or update id that has already been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMessageRecord {
    pub message_id: String,
    pub processed_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl ProcessedMessageRecord {
    /// Active records block reprocessing. A record expiring exactly at `now`
    /// is already inactive.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at > now
    }
}

/// One raw inbound message waiting to be folded into a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub user_key: String,
    pub text: String,
    pub message_id: String,
    pub received_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl PendingMessage {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at > now
    }
}

/// An unresolved clarification or confirmation awaiting the user's next message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_key: String,
    pub pending_intent: Intent,
    pub original_message: String,
    pub candidates: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at > now
    }
}

/// The caller-supplied part of a context; timestamps are set by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDraft {
    pub pending_intent: Intent,
    pub original_message: String,
    pub candidates: Vec<String>,
}

/// TTL-scoped key/value semantics over the three state namespaces.
///
/// Every call is keyed by one user or one message id, so implementations
/// never need cross-user coordination.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// True iff an unexpired record exists for `message_id`.
    async fn is_processed(&self, message_id: &str) -> Result<bool>;

    /// Record `message_id` as handled. Calling twice simply refreshes it.
    async fn mark_processed(&self, message_id: &str) -> Result<()>;

    async fn enqueue_pending(&self, user_key: &str, text: &str, message_id: &str) -> Result<()>;

    /// Unexpired pending messages, oldest first. Ties on `received_at` are
    /// ordered by message id.
    async fn list_pending(&self, user_key: &str) -> Result<Vec<PendingMessage>>;

    /// True iff an unexpired pending message was received strictly after `since`.
    async fn has_newer(&self, user_key: &str, since: DateTime<Utc>) -> Result<bool>;

    /// Atomically remove the named pending messages and return the ones that
    /// were still there, oldest first. A row another request already claimed
    /// is simply missing from the result, so each message is handed out once.
    async fn claim_pending(
        &self,
        user_key: &str,
        message_ids: &[String],
    ) -> Result<Vec<PendingMessage>>;

    /// Drop every pending message for the user. Nothing to drop is not an error.
    async fn clear_pending(&self, user_key: &str) -> Result<()>;

    async fn get_context(&self, user_key: &str) -> Result<Option<ConversationContext>>;

    /// Replace the user's context, stamping fresh `created_at`/`expire_at`.
    async fn store_context(&self, user_key: &str, draft: ContextDraft) -> Result<()>;

    async fn clear_context(&self, user_key: &str) -> Result<()>;
}
