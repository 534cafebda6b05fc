use super::ReminderSweep;
use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Normalize a cron expression to the six-field form, accepting the usual
/// five-field form by prepending a seconds column.
pub fn validate_cron_expr(expr: &str) -> Result<String> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    normalized
        .parse::<Schedule>()
        .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", expr, e))?;
    Ok(normalized)
}

/// The first fire time strictly after `now`, evaluated in `tz`.
pub fn next_run_after(schedule: &Schedule, tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&now.with_timezone(&tz))
        .next()
        .map(|next| next.with_timezone(&Utc))
}

/// Run the sweep on `expr` until `shutdown` flips to true.
pub fn spawn_scheduler(
    sweep: Arc<ReminderSweep>,
    expr: &str,
    tz: Tz,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let schedule: Schedule = validate_cron_expr(expr)?.parse()?;
    info!("reminder sweep scheduled: '{}' ({})", expr, tz);

    Ok(tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = next_run_after(&schedule, tz, now) else {
                warn!("reminder schedule has no future runs, stopping");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                () = tokio::time::sleep(wait) => {
                    if let Err(e) = sweep.run().await {
                        error!("scheduled reminder sweep failed: {:#}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("reminder scheduler stopping");
                        return;
                    }
                }
            }
        }
    }))
}
