use super::{
    Channel, Contact, ContactLedger, ContactStatus, ContactUpdate, Directory, LedgerLookup,
    LogEntry, NewUser, Settings, UserRecord,
};
use crate::nlp::Intent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use tracing::{debug, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Users, contacts, settings and logs in one SQLite file. Every ledger row is
/// partitioned by the owning user's scope key.
pub struct SqliteLedger {
    conn: std::sync::Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
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
        Self::from_connection(conn)
            .with_context(|| format!("Failed to initialize ledger schema at: {}", db_path.display()))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                phone TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                telegram_chat_id TEXT UNIQUE,
                scope_key TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS contacts (
                scope_key TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                last_contact_date TEXT,
                last_interaction_message TEXT,
                reminder_date TEXT,
                PRIMARY KEY (scope_key, name)
            );
            CREATE TABLE IF NOT EXISTS settings (
                scope_key TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope_key, key)
            );
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scope_key TEXT NOT NULL,
                date TEXT NOT NULL,
                contact_name TEXT NOT NULL,
                intent TEXT NOT NULL,
                raw_message TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_logs_scope ON logs(scope_key, id);",
        )?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }

    /// Register (or re-register) a user. The phone number doubles as scope key.
    pub fn add_user(&self, user: &NewUser) -> Result<UserRecord> {
        let phone = user.phone.trim();
        if phone.is_empty() {
            anyhow::bail!("phone number is required");
        }
        let chat_id = user
            .telegram_chat_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (phone, name, telegram_chat_id, scope_key, created_at)
             VALUES (?1, ?2, ?3, ?1, ?4)
             ON CONFLICT(phone) DO UPDATE SET
                name = excluded.name,
                telegram_chat_id = excluded.telegram_chat_id",
            params![phone, user.name, chat_id, Utc::now().to_rfc3339()],
        )?;
        if let Some(tz) = &user.timezone {
            put_setting(&conn, phone, "timezone", tz)?;
        }
        if let Some(days) = user.default_reminder_days {
            put_setting(&conn, phone, "default_reminder_days", &days.to_string())?;
        }
        debug!("registered user {}", phone);
        Ok(UserRecord {
            phone: phone.to_string(),
            name: user.name.clone(),
            telegram_chat_id: chat_id.map(ToString::to_string),
            scope_key: phone.to_string(),
        })
    }

    pub fn set_setting(&self, scope: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        put_setting(&conn, scope, key, value)
    }

    /// Look a contact up by exact name regardless of status.
    pub fn find_contact(&self, scope: &str, name: &str) -> Result<Option<Contact>> {
        let conn = self.lock()?;
        contact_by_name(&conn, scope, name)
    }
}

fn put_setting(conn: &Connection, scope: &str, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (scope_key, key, value) VALUES (?1, ?2, ?3)
         ON CONFLICT(scope_key, key) DO UPDATE SET value = excluded.value",
        params![scope, key, value],
    )?;
    Ok(())
}

fn parse_date(value: Option<String>) -> Option<NaiveDate> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

const CONTACT_COLUMNS: &str =
    "name, status, last_contact_date, last_interaction_message, reminder_date";

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    let status: String = row.get(1)?;
    Ok(Contact {
        name: row.get(0)?,
        status: if status == ContactStatus::Archived.as_str() {
            ContactStatus::Archived
        } else {
            ContactStatus::Active
        },
        last_contact_date: parse_date(row.get(2)?),
        last_interaction_message: row
            .get::<_, Option<String>>(3)?
            .filter(|m| !m.is_empty()),
        reminder_date: parse_date(row.get(4)?),
    })
}

fn contact_by_name(conn: &Connection, scope: &str, name: &str) -> Result<Option<Contact>> {
    let contact = conn
        .query_row(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE scope_key = ?1 AND name = ?2"),
            params![scope, name],
            contact_from_row,
        )
        .optional()?;
    Ok(contact)
}

fn lookup_after(conn: &Connection, changed: usize, scope: &str, name: &str) -> Result<LedgerLookup> {
    if changed == 0 {
        return Ok(LedgerLookup::NotFound);
    }
    Ok(match contact_by_name(conn, scope, name)? {
        Some(contact) => LedgerLookup::Found(contact),
        None => LedgerLookup::NotFound,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        phone: row.get(0)?,
        name: row.get(1)?,
        telegram_chat_id: row.get(2)?,
        scope_key: row.get(3)?,
    })
}

#[async_trait]
impl Directory for SqliteLedger {
    async fn get_user_by_identifier(
        &self,
        channel: Channel,
        identifier: &str,
    ) -> Result<Option<UserRecord>> {
        let column = match channel {
            Channel::Sms => "phone",
            Channel::Telegram => "telegram_chat_id",
        };
        let conn = self.lock()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT phone, name, telegram_chat_id, scope_key FROM users WHERE {column} = ?1"
                ),
                params![identifier.trim()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT phone, name, telegram_chat_id, scope_key FROM users ORDER BY created_at, phone",
        )?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }
}

#[async_trait]
impl ContactLedger for SqliteLedger {
    async fn list_active_contacts(&self, scope: &str) -> Result<Vec<Contact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE scope_key = ?1 AND status = 'active'
             ORDER BY name"
        ))?;
        let contacts = stmt
            .query_map(params![scope], contact_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contacts)
    }

    async fn get_settings(&self, scope: &str) -> Result<Settings> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key, value FROM settings WHERE scope_key = ?1")?;
        let rows = stmt.query_map(params![scope], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut settings = Settings::default();
        for row in rows {
            let (key, value) = row?;
            match key.as_str() {
                "timezone" if !value.trim().is_empty() => {
                    settings.timezone = value.trim().to_string();
                }
                "default_reminder_days" => match value.trim().parse::<i64>() {
                    Ok(days) => settings.default_reminder_days = days,
                    Err(_) => warn!(
                        "ignoring non-numeric default_reminder_days '{}' for {}",
                        value, scope
                    ),
                },
                _ => {}
            }
        }
        Ok(settings)
    }

    async fn update_contact(
        &self,
        scope: &str,
        name: &str,
        update: &ContactUpdate,
    ) -> Result<LedgerLookup> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE contacts SET
                last_contact_date = COALESCE(?3, last_contact_date),
                last_interaction_message = COALESCE(?4, last_interaction_message),
                reminder_date = COALESCE(?5, reminder_date)
             WHERE scope_key = ?1 AND name = ?2",
            params![
                scope,
                name,
                format_date(update.last_contact_date),
                update.last_interaction_message,
                format_date(update.reminder_date)
            ],
        )?;
        lookup_after(&conn, changed, scope, name)
    }

    async fn add_contact(&self, scope: &str, contact: &Contact) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO contacts
                (scope_key, name, status, last_contact_date, last_interaction_message, reminder_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(scope_key, name) DO UPDATE SET
                status = excluded.status,
                last_contact_date = excluded.last_contact_date,
                last_interaction_message = excluded.last_interaction_message,
                reminder_date = excluded.reminder_date",
            params![
                scope,
                contact.name,
                contact.status.as_str(),
                format_date(contact.last_contact_date),
                contact.last_interaction_message,
                format_date(contact.reminder_date)
            ],
        )?;
        Ok(())
    }

    async fn rename_contact(
        &self,
        scope: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<LedgerLookup> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE contacts SET name = ?3 WHERE scope_key = ?1 AND name = ?2",
                params![scope, old_name, new_name],
            )
            .with_context(|| format!("Failed to rename '{old_name}' to '{new_name}'"))?;
        lookup_after(&conn, changed, scope, new_name)
    }

    async fn archive_contact(&self, scope: &str, name: &str) -> Result<LedgerLookup> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE contacts SET status = 'archived' WHERE scope_key = ?1 AND name = ?2",
            params![scope, name],
        )?;
        lookup_after(&conn, changed, scope, name)
    }

    async fn append_log_entry(&self, scope: &str, entry: &LogEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO logs (scope_key, date, contact_name, intent, raw_message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                scope,
                entry.date.format(DATE_FORMAT).to_string(),
                entry.contact_name,
                entry.intent.as_str(),
                entry.raw_message
            ],
        )?;
        Ok(())
    }

    async fn get_recent_logs(&self, scope: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date, contact_name, intent, raw_message FROM logs
             WHERE scope_key = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![scope, i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (date, contact_name, intent, raw_message) = row?;
            let Some(date) = parse_date(Some(date)) else {
                warn!("skipping log row with bad date for {}", scope);
                continue;
            };
            entries.push(LogEntry {
                date,
                contact_name,
                intent: Intent::from_label(&intent),
                raw_message,
            });
        }
        Ok(entries)
    }
}
