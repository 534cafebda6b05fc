//! Registered users and their per-user contact ledgers.
//!
//! The orchestrator and the sweep only ever talk to the [`Directory`] and
//! [`ContactLedger`] traits; [`SqliteLedger`] is the shipped implementation.

pub mod sqlite;

use crate::nlp::Intent;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use sqlite::SqliteLedger;

pub const DEFAULT_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_REMINDER_DAYS: i64 = 14;

/// Inbound transport a user can be reached on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Telegram,
    Sms,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub phone: String,
    pub name: String,
    pub telegram_chat_id: Option<String>,
    /// Partition key for this user's contacts, settings and logs.
    pub scope_key: String,
}

impl UserRecord {
    /// The address this user is reached at on `channel`, if any.
    pub fn address(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Sms => Some(self.phone.as_str()),
            Channel::Telegram => self.telegram_chat_id.as_deref(),
        }
    }
}

/// Fields supplied when registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: String,
    pub name: String,
    pub telegram_chat_id: Option<String>,
    pub timezone: Option<String>,
    pub default_reminder_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Active,
    Archived,
}

impl ContactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub name: String,
    pub status: ContactStatus,
    pub last_contact_date: Option<NaiveDate>,
    pub last_interaction_message: Option<String>,
    pub reminder_date: Option<NaiveDate>,
}

impl Contact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ContactStatus::Active,
            last_contact_date: None,
            last_interaction_message: None,
            reminder_date: None,
        }
    }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactUpdate {
    pub last_contact_date: Option<NaiveDate>,
    pub last_interaction_message: Option<String>,
    pub reminder_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub date: NaiveDate,
    pub contact_name: String,
    pub intent: Intent,
    pub raw_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub timezone: String,
    pub default_reminder_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            default_reminder_days: DEFAULT_REMINDER_DAYS,
        }
    }
}

/// Result of a name-keyed ledger verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerLookup {
    Found(Contact),
    NotFound,
}

impl LedgerLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_user_by_identifier(
        &self,
        channel: Channel,
        identifier: &str,
    ) -> Result<Option<UserRecord>>;

    async fn list_users(&self) -> Result<Vec<UserRecord>>;
}

/// Name-keyed verbs over one user's contacts, settings and log.
#[async_trait]
pub trait ContactLedger: Send + Sync {
    async fn list_active_contacts(&self, scope: &str) -> Result<Vec<Contact>>;

    async fn get_settings(&self, scope: &str) -> Result<Settings>;

    async fn update_contact(
        &self,
        scope: &str,
        name: &str,
        update: &ContactUpdate,
    ) -> Result<LedgerLookup>;

    /// Insert a contact. Re-adding an existing name reactivates and overwrites it.
    async fn add_contact(&self, scope: &str, contact: &Contact) -> Result<()>;

    async fn rename_contact(
        &self,
        scope: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<LedgerLookup>;

    async fn archive_contact(&self, scope: &str, name: &str) -> Result<LedgerLookup>;

    async fn append_log_entry(&self, scope: &str, entry: &LogEntry) -> Result<()>;

    /// Most recent first.
    async fn get_recent_logs(&self, scope: &str, limit: usize) -> Result<Vec<LogEntry>>;
}
