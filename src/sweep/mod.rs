//! Daily reminder sweep.
//!
//! Independent of the per-message flow: for every registered user, compute
//! "today" in their timezone and send one combined notice listing contacts
//! due today or due in exactly one week.

pub mod schedule;

use crate::delivery::{Delivery, Recipient};
use crate::ledger::{Channel, Contact, ContactLedger, Directory, UserRecord};
use crate::utils::{Clock, local_today, parse_timezone};
use anyhow::Result;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use schedule::{spawn_scheduler, validate_cron_expr};

const ADVANCE_DAYS: u64 = 7;

/// Outcome of one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub users_processed: usize,
    pub messages_sent: usize,
    pub users_failed: usize,
}

/// Notice lines for every active contact due on `today`.
///
/// A same-day notice fires when `reminder_date == today`. A one-week notice
/// fires when `reminder_date == today + 7` and, strictly,
/// `reminder_date > last_contact_date + 7`; a contact with no last-contact
/// date never gets the advance notice.
pub fn due_notices(contacts: &[Contact], today: NaiveDate) -> Vec<String> {
    let week_out = today.checked_add_days(Days::new(ADVANCE_DAYS));
    let mut lines = Vec::new();

    for contact in contacts {
        let Some(reminder) = contact.reminder_date else {
            continue;
        };
        let last = contact.last_interaction_message.as_deref().unwrap_or("");

        if reminder == today {
            lines.push(format!("- {} (last: {})", contact.name, last));
            continue;
        }

        if Some(reminder) == week_out
            && let Some(last_contact) = contact.last_contact_date
            && last_contact
                .checked_add_days(Days::new(ADVANCE_DAYS))
                .is_some_and(|threshold| reminder > threshold)
        {
            lines.push(format!("- {} in 1 week (last: {})", contact.name, last));
        }
    }
    lines
}

/// Fold notice lines into the single outbound message.
pub fn format_reminders(lines: &[String]) -> Option<String> {
    if lines.is_empty() {
        return None;
    }
    Some(format!("Rolodex reminders:\n{}", lines.join("\n")))
}

pub struct ReminderSweep {
    directory: Arc<dyn Directory>,
    ledger: Arc<dyn ContactLedger>,
    delivery: Arc<dyn Delivery>,
    clock: Arc<dyn Clock>,
    channel: Channel,
}

impl ReminderSweep {
    pub fn new(
        directory: Arc<dyn Directory>,
        ledger: Arc<dyn ContactLedger>,
        delivery: Arc<dyn Delivery>,
        clock: Arc<dyn Clock>,
        channel: Channel,
    ) -> Self {
        Self {
            directory,
            ledger,
            delivery,
            clock,
            channel,
        }
    }

    /// Sweep every user. A failure for one user is logged and counted; the
    /// run continues with the next.
    pub async fn run(&self) -> Result<SweepReport> {
        let users = self.directory.list_users().await?;
        let mut report = SweepReport::default();

        for user in &users {
            match self.sweep_user(user).await {
                Ok(sent) => {
                    report.users_processed += 1;
                    if sent {
                        report.messages_sent += 1;
                    }
                }
                Err(e) => {
                    error!("reminder sweep failed for user {}: {:#}", user.phone, e);
                    report.users_failed += 1;
                }
            }
        }

        info!(
            "reminder sweep done: {} users, {} messages, {} failures",
            report.users_processed, report.messages_sent, report.users_failed
        );
        Ok(report)
    }

    async fn sweep_user(&self, user: &UserRecord) -> Result<bool> {
        let settings = self.ledger.get_settings(&user.scope_key).await?;
        let tz = parse_timezone(&settings.timezone)?;
        let today = local_today(self.clock.now(), tz);

        let contacts = self.ledger.list_active_contacts(&user.scope_key).await?;
        let Some(message) = format_reminders(&due_notices(&contacts, today)) else {
            return Ok(false);
        };

        let Some(recipient) = Recipient::for_user(user, self.channel) else {
            warn!(
                "user {} has reminders but no {} address, skipping",
                user.phone, self.channel
            );
            return Ok(false);
        };
        self.delivery.deliver(&recipient, &message).await?;
        Ok(true)
    }
}
