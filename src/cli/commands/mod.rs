
use crate::classifier::GeminiClassifier;
use crate::config::{Config, load_config, read_config};
use crate::delivery::{ChannelRouter, TelegramDelivery, TwilioDelivery};
use crate::gateway::GatewayState;
use crate::ledger::{Directory, NewUser, SqliteLedger};
use crate::orchestrator::{Orchestrator, OrchestratorDeps};
use crate::state::SqliteStateStore;
use crate::sweep::{ReminderSweep, spawn_scheduler};
use crate::utils::{Clock, SystemClock, parse_timezone};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rolodex")]
#[command(about = "Personal CRM over Telegram and SMS")]
#[command(version)]
pub struct Cli {
    /// Path to config.json (defaults to ~/.rolodex/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook gateway (and the reminder schedule, if configured)
    Serve,
    /// Run the reminder sweep once
    Sweep,
    /// Manage registered users
    Users {
        #[command(subcommand)]
        cmd: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user, or update an existing one
    Add {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        telegram_chat_id: Option<String>,
        /// IANA timezone, e.g. America/Chicago
        #[arg(long)]
        timezone: Option<String>,
        /// Days until the default follow-up reminder
        #[arg(long)]
        reminder_days: Option<i64>,
    },
    /// List registered users
    List,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve => {
            let config = load_config(config_path)?;
            serve(config).await?;
        }
        Commands::Sweep => {
            let config = load_config(config_path)?;
            sweep_once(&config).await?;
        }
        Commands::Users { cmd } => {
            let config = read_config(config_path)?;
            users_command(&config, cmd).await?;
        }
    }

    Ok(())
}

/// Everything a running instance needs, wired from config.
struct Services {
    orchestrator: Arc<Orchestrator>,
    sweep: Arc<ReminderSweep>,
}

fn open_ledger(config: &Config) -> Result<Arc<SqliteLedger>> {
    let path = config.database.resolved_path()?;
    let ledger = SqliteLedger::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok(Arc::new(ledger))
}

fn build_delivery(config: &Config) -> ChannelRouter {
    let mut router = ChannelRouter::new();
    if !config.telegram.bot_token.is_empty() {
        router = router.with_channel(
            crate::ledger::Channel::Telegram,
            Arc::new(TelegramDelivery::new(
                config.telegram.bot_token.clone(),
                config.telegram.api_base.clone(),
            )),
        );
    }
    let t = &config.twilio;
    if !t.account_sid.is_empty() && !t.auth_token.is_empty() && !t.phone_number.is_empty() {
        router = router.with_channel(
            crate::ledger::Channel::Sms,
            Arc::new(TwilioDelivery::new(
                t.account_sid.clone(),
                t.auth_token.clone(),
                t.phone_number.clone(),
            )),
        );
    }
    router
}

fn build_services(config: &Config) -> Result<Services> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let db_path = config.database.resolved_path()?;
    let state = Arc::new(
        SqliteStateStore::open(&db_path, clock.clone())?
            .with_ttls(config.conversation.state_ttls()),
    );
    let purged = state.purge_expired()?;
    if purged > 0 {
        info!("purged {} expired conversation state rows", purged);
    }
    let ledger = open_ledger(config)?;
    let delivery = Arc::new(build_delivery(config));
    let classifier = Arc::new(GeminiClassifier::new(
        config.gemini.api_key.clone(),
        Some(config.gemini.model.clone()),
        config.gemini.base_url.clone(),
    ));

    let orchestrator = Orchestrator::new(OrchestratorDeps {
        state,
        directory: ledger.clone(),
        ledger: ledger.clone(),
        classifier,
        delivery: delivery.clone(),
        clock: clock.clone(),
    })
    .with_batch_window(config.conversation.batch_window())
    .with_recent_log_limit(config.conversation.recent_log_limit);

    let sweep = ReminderSweep::new(
        ledger.clone(),
        ledger,
        delivery,
        clock,
        config.delivery_channel()?,
    );

    Ok(Services {
        orchestrator: Arc::new(orchestrator),
        sweep: Arc::new(sweep),
    })
}

async fn serve(config: Config) -> Result<()> {
    info!("Configuration loaded. Channel: {}", config.channel);
    let services = build_services(&config)?;

    if config.telegram.secret_token.is_empty() {
        warn!("telegram.secretToken is not set; telegram webhook requests are not authenticated");
    }
    if config.sweep.secret.is_empty() {
        warn!("sweep.secret is not set; /reminder-cron will reject every request");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = match &config.sweep.schedule {
        Some(expr) => {
            let tz = parse_timezone(&config.sweep.timezone)?;
            Some(spawn_scheduler(
                services.sweep.clone(),
                expr,
                tz,
                shutdown_rx.clone(),
            )?)
        }
        None => {
            info!("no sweep schedule configured; use /reminder-cron or `rolodex sweep`");
            None
        }
    };

    let state = GatewayState {
        orchestrator: services.orchestrator,
        sweep: services.sweep,
        telegram_secret: config.telegram.secret_token.clone(),
        twilio_auth_token: config.twilio.auth_token.clone(),
        twilio_webhook_url: config.twilio.webhook_url.clone(),
        sweep_secret: config.sweep.secret.clone(),
    };
    let server = crate::gateway::start(
        &config.gateway.host,
        config.gateway.port,
        state,
        shutdown_rx,
    )
    .await?;

    println!(
        "rolodex {} listening on {}:{}",
        crate::VERSION,
        config.gateway.host,
        config.gateway.port
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    println!("\nShutting down...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = server.await {
        warn!("gateway task ended abnormally: {}", e);
    }
    if let Some(handle) = scheduler
        && let Err(e) = handle.await
    {
        warn!("scheduler task ended abnormally: {}", e);
    }
    Ok(())
}

async fn sweep_once(config: &Config) -> Result<()> {
    let services = build_services(config)?;
    let report = services.sweep.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn users_command(config: &Config, cmd: UserCommands) -> Result<()> {
    let ledger = open_ledger(config)?;
    match cmd {
        UserCommands::Add {
            phone,
            name,
            telegram_chat_id,
            timezone,
            reminder_days,
        } => {
            let user = new_user(phone, name, telegram_chat_id, timezone, reminder_days)?;
            let record = ledger.add_user(&user)?;
            println!("Registered {} ({})", record.name, record.phone);
        }
        UserCommands::List => {
            let users = ledger.list_users().await?;
            if users.is_empty() {
                println!("No users registered.");
            }
            for user in users {
                println!(
                    "{}\t{}\t{}",
                    user.phone,
                    user.name,
                    user.telegram_chat_id.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn new_user(
    phone: String,
    name: String,
    telegram_chat_id: Option<String>,
    timezone: Option<String>,
    reminder_days: Option<i64>,
) -> Result<NewUser> {
    if let Some(tz) = &timezone {
        parse_timezone(tz)?;
    }
    if let Some(days) = reminder_days
        && days <= 0
    {
        anyhow::bail!("--reminder-days must be positive, got {days}");
    }
    Ok(NewUser {
        phone: phone.trim().to_string(),
        name: name.trim().to_string(),
        telegram_chat_id: telegram_chat_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
        timezone,
        default_reminder_days: reminder_days,
    })
}
