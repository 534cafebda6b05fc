//! Side-effecting executors, one per acting intent.
//!
//! Every executor walks the turn's contacts in order and appends one log row
//! per contact it touched.

use crate::errors::RolodexError;
use crate::ledger::{Contact, ContactLedger, ContactUpdate, LedgerLookup, LogEntry};
use crate::nlp::{ContactRef, Intent};
use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use tracing::{debug, info};

/// Per-turn inputs shared by every executor.
pub struct ActionScope<'a> {
    pub ledger: &'a dyn ContactLedger,
    pub scope: &'a str,
    pub today: NaiveDate,
    pub default_reminder_days: i64,
    pub raw_message: &'a str,
    /// Active roster as read at the start of the turn.
    pub roster: &'a [Contact],
}

impl ActionScope<'_> {
    fn default_reminder(&self) -> Result<NaiveDate> {
        let days = Days::new(self.default_reminder_days.unsigned_abs());
        let date = if self.default_reminder_days >= 0 {
            self.today.checked_add_days(days)
        } else {
            self.today.checked_sub_days(days)
        };
        date.with_context(|| {
            format!(
                "reminder offset of {} days is out of range",
                self.default_reminder_days
            )
        })
    }

    fn existing_reminder(&self, name: &str) -> Option<NaiveDate> {
        self.roster
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.reminder_date)
    }

    async fn log(&self, contact_name: &str, intent: Intent) -> Result<()> {
        self.ledger
            .append_log_entry(
                self.scope,
                &LogEntry {
                    date: self.today,
                    contact_name: contact_name.to_string(),
                    intent,
                    raw_message: self.raw_message.to_string(),
                },
            )
            .await
    }
}

fn not_found(name: &str) -> anyhow::Error {
    RolodexError::ContactNotFound {
        name: name.to_string(),
    }
    .into()
}

/// Record an interaction. An explicit follow-up date wins; otherwise an
/// existing reminder is kept and only a contact without one gets the default.
/// A contact missing from the ledger is created instead.
pub async fn log_interaction(
    s: &ActionScope<'_>,
    contacts: &[ContactRef],
    interaction_date: Option<NaiveDate>,
    follow_up_date: Option<NaiveDate>,
) -> Result<()> {
    let contact_date = interaction_date.unwrap_or(s.today);

    for contact in contacts {
        let reminder_date = match follow_up_date.or_else(|| s.existing_reminder(&contact.name)) {
            Some(date) => date,
            None => s.default_reminder()?,
        };

        let update = ContactUpdate {
            last_contact_date: Some(contact_date),
            last_interaction_message: Some(s.raw_message.to_string()),
            reminder_date: Some(reminder_date),
        };
        match s.ledger.update_contact(s.scope, &contact.name, &update).await? {
            LedgerLookup::Found(_) => debug!("updated contact {}", contact.name),
            LedgerLookup::NotFound => {
                info!("adding unseen contact {} while logging", contact.name);
                s.ledger
                    .add_contact(
                        s.scope,
                        &Contact {
                            last_contact_date: Some(contact_date),
                            last_interaction_message: Some(s.raw_message.to_string()),
                            reminder_date: Some(reminder_date),
                            ..Contact::new(contact.name.clone())
                        },
                    )
                    .await?;
            }
        }

        s.log(&contact.name, Intent::LogInteraction).await?;
    }
    Ok(())
}

/// Queries are read-only apart from one audit row per contact.
pub async fn record_query(s: &ActionScope<'_>, contacts: &[ContactRef]) -> Result<()> {
    for contact in contacts {
        s.log(&contact.name, Intent::Query).await?;
    }
    Ok(())
}

/// Set a reminder. Without an explicit date the default offset always applies.
pub async fn set_reminder(
    s: &ActionScope<'_>,
    contacts: &[ContactRef],
    follow_up_date: Option<NaiveDate>,
) -> Result<()> {
    for contact in contacts {
        let reminder_date = match follow_up_date {
            Some(date) => date,
            None => s.default_reminder()?,
        };
        let update = ContactUpdate {
            reminder_date: Some(reminder_date),
            ..ContactUpdate::default()
        };
        if !s
            .ledger
            .update_contact(s.scope, &contact.name, &update)
            .await?
            .is_found()
        {
            return Err(not_found(&contact.name));
        }
        s.log(&contact.name, Intent::SetReminder).await?;
    }
    Ok(())
}

/// Rename; the log row is filed under the new name.
pub async fn rename(s: &ActionScope<'_>, contacts: &[ContactRef], new_name: &str) -> Result<()> {
    for contact in contacts {
        if !s
            .ledger
            .rename_contact(s.scope, &contact.name, new_name)
            .await?
            .is_found()
        {
            return Err(not_found(&contact.name));
        }
        s.log(new_name, Intent::UpdateContact).await?;
    }
    Ok(())
}

pub async fn archive(s: &ActionScope<'_>, contacts: &[ContactRef]) -> Result<()> {
    for contact in contacts {
        if !s
            .ledger
            .archive_contact(s.scope, &contact.name)
            .await?
            .is_found()
        {
            return Err(not_found(&contact.name));
        }
        info!("archived contact {}", contact.name);
    }
    Ok(())
}

/// Add brand-new contacts. As with logging, a reminder already on file is
/// kept unless the turn supplies an explicit follow-up date.
pub async fn onboard(
    s: &ActionScope<'_>,
    contacts: &[ContactRef],
    interaction_date: Option<NaiveDate>,
    follow_up_date: Option<NaiveDate>,
) -> Result<()> {
    let contact_date = interaction_date.unwrap_or(s.today);
    for contact in contacts {
        let reminder_date = match follow_up_date.or_else(|| s.existing_reminder(&contact.name)) {
            Some(date) => date,
            None => s.default_reminder()?,
        };
        s.ledger
            .add_contact(
                s.scope,
                &Contact {
                    last_contact_date: Some(contact_date),
                    last_interaction_message: Some(s.raw_message.to_string()),
                    reminder_date: Some(reminder_date),
                    ..Contact::new(contact.name.clone())
                },
            )
            .await?;
        s.log(&contact.name, Intent::Onboarding).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
