use super::{ContextDraft, ConversationContext, PendingMessage, StateStore, StateTtls};
use crate::nlp::Intent;
use crate::utils::Clock;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// SQLite-backed [`StateStore`]. Timestamps are stored as Unix milliseconds.
pub struct SqliteStateStore {
    conn: std::sync::Mutex<Connection>,
    clock: Arc<dyn Clock>,
    ttls: StateTtls,
}

impl SqliteStateStore {
    pub fn open(db_path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            crate::utils::ensure_dir(parent)?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;",
        )?;
        Self::from_connection(conn, clock)
            .with_context(|| format!("Failed to initialize state schema at: {}", db_path.display()))
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, clock)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS processed_messages (
                message_id TEXT PRIMARY KEY,
                processed_at INTEGER NOT NULL,
                expire_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pending_messages (
                user_key TEXT NOT NULL,
                message_id TEXT NOT NULL,
                text TEXT NOT NULL,
                received_at INTEGER NOT NULL,
                expire_at INTEGER NOT NULL,
                PRIMARY KEY (user_key, message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_pending_user_received
                ON pending_messages(user_key, received_at);
            CREATE TABLE IF NOT EXISTS conversation_context (
                user_key TEXT PRIMARY KEY,
                pending_intent TEXT NOT NULL,
                original_message TEXT NOT NULL,
                candidates TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expire_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
            clock,
            ttls: StateTtls::default(),
        })
    }

    #[must_use]
    pub fn with_ttls(mut self, ttls: StateTtls) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn ttls(&self) -> StateTtls {
        self.ttls
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }

    /// Delete every expired row across all namespaces. Reads already ignore
    /// expired rows, so this only reclaims space.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.lock()?;
        let mut removed = conn.execute(
            "DELETE FROM processed_messages WHERE expire_at <= ?1",
            params![now],
        )?;
        removed += conn.execute(
            "DELETE FROM pending_messages WHERE expire_at <= ?1",
            params![now],
        )?;
        removed += conn.execute(
            "DELETE FROM conversation_context WHERE expire_at <= ?1",
            params![now],
        )?;
        if removed > 0 {
            debug!("purged {} expired state rows", removed);
        }
        Ok(removed)
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("timestamp out of range: {ms}"))
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn is_processed(&self, message_id: &str) -> Result<bool> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT expire_at FROM processed_messages
                 WHERE message_id = ?1 AND expire_at > ?2",
                params![message_id, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn mark_processed(&self, message_id: &str) -> Result<()> {
        let now = self.clock.now();
        let expire_at = now + self.ttls.idempotency;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO processed_messages (message_id, processed_at, expire_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(message_id) DO UPDATE SET
                processed_at = excluded.processed_at,
                expire_at = excluded.expire_at",
            params![
                message_id,
                now.timestamp_millis(),
                expire_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    async fn enqueue_pending(&self, user_key: &str, text: &str, message_id: &str) -> Result<()> {
        let now = self.clock.now();
        let expire_at = now + self.ttls.pending;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pending_messages (user_key, message_id, text, received_at, expire_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_key, message_id) DO UPDATE SET
                text = excluded.text,
                received_at = excluded.received_at,
                expire_at = excluded.expire_at",
            params![
                user_key,
                message_id,
                text,
                now.timestamp_millis(),
                expire_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    async fn list_pending(&self, user_key: &str) -> Result<Vec<PendingMessage>> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, text, received_at, expire_at FROM pending_messages
             WHERE user_key = ?1 AND expire_at > ?2
             ORDER BY received_at ASC, message_id ASC",
        )?;
        let rows = stmt.query_map(params![user_key, now], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut pending = Vec::new();
        for row in rows {
            let (message_id, text, received_at, expire_at) = row?;
            pending.push(PendingMessage {
                user_key: user_key.to_string(),
                text,
                message_id,
                received_at: from_millis(received_at)?,
                expire_at: from_millis(expire_at)?,
            });
        }
        Ok(pending)
    }

    async fn has_newer(&self, user_key: &str, since: DateTime<Utc>) -> Result<bool> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_messages
             WHERE user_key = ?1 AND received_at > ?2 AND expire_at > ?3",
            params![user_key, since.timestamp_millis(), now],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn claim_pending(
        &self,
        user_key: &str,
        message_ids: &[String],
    ) -> Result<Vec<PendingMessage>> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut claimed = Vec::with_capacity(message_ids.len());
        {
            let mut stmt = tx.prepare(
                "DELETE FROM pending_messages
                 WHERE user_key = ?1 AND message_id = ?2 AND expire_at > ?3
                 RETURNING text, received_at, expire_at",
            )?;
            for message_id in message_ids {
                let row = stmt
                    .query_row(params![user_key, message_id, now], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })
                    .optional()?;
                if let Some((text, received_at, expire_at)) = row {
                    claimed.push(PendingMessage {
                        user_key: user_key.to_string(),
                        text,
                        message_id: message_id.clone(),
                        received_at: from_millis(received_at)?,
                        expire_at: from_millis(expire_at)?,
                    });
                }
            }
        }
        tx.commit()?;
        claimed.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        Ok(claimed)
    }

    async fn clear_pending(&self, user_key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM pending_messages WHERE user_key = ?1",
            params![user_key],
        )?;
        Ok(())
    }

    async fn get_context(&self, user_key: &str) -> Result<Option<ConversationContext>> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT pending_intent, original_message, candidates, created_at, expire_at
                 FROM conversation_context
                 WHERE user_key = ?1 AND expire_at > ?2",
                params![user_key, now],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((intent, original_message, candidates, created_at, expire_at)) = row else {
            return Ok(None);
        };
        let candidates: Vec<String> = serde_json::from_str(&candidates)
            .with_context(|| format!("corrupt candidate list for {user_key}"))?;
        Ok(Some(ConversationContext {
            user_key: user_key.to_string(),
            pending_intent: Intent::from_label(&intent),
            original_message,
            candidates,
            created_at: from_millis(created_at)?,
            expire_at: from_millis(expire_at)?,
        }))
    }

    async fn store_context(&self, user_key: &str, draft: ContextDraft) -> Result<()> {
        let now = self.clock.now();
        let expire_at = now + self.ttls.context;
        let candidates = serde_json::to_string(&draft.candidates)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO conversation_context
                (user_key, pending_intent, original_message, candidates, created_at, expire_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_key) DO UPDATE SET
                pending_intent = excluded.pending_intent,
                original_message = excluded.original_message,
                candidates = excluded.candidates,
                created_at = excluded.created_at,
                expire_at = excluded.expire_at",
            params![
                user_key,
                draft.pending_intent.as_str(),
                draft.original_message,
                candidates,
                now.timestamp_millis(),
                expire_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    async fn clear_context(&self, user_key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM conversation_context WHERE user_key = ?1",
            params![user_key],
        )?;
        Ok(())
    }
}
