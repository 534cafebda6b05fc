use super::credentials;
use crate::errors::RolodexError;
use crate::ledger::Channel;
use crate::state::StateTtls;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`            : printed normally via `&self.field_name`
/// - `redact(field_name)`    : `String` field, shows `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, rename = "botToken")]
    pub bot_token: String,
    /// Expected value of the `X-Telegram-Bot-Api-Secret-Token` header.
    #[serde(default, rename = "secretToken")]
    pub secret_token: String,
    #[serde(default, rename = "apiBase")]
    pub api_base: Option<String>,
}

redact_debug!(TelegramConfig, redact(bot_token), redact(secret_token), api_base,);

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default, rename = "accountSid")]
    pub account_sid: String,
    #[serde(default, rename = "authToken")]
    pub auth_token: String,
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: String,
    /// Public URL Twilio posts to; signatures are computed over it.
    #[serde(default, rename = "webhookUrl")]
    pub webhook_url: String,
}

redact_debug!(
    TwilioConfig,
    account_sid,
    redact(auth_token),
    phone_number,
    webhook_url,
);

#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default, rename = "baseUrl")]
    pub base_url: Option<String>,
}

redact_debug!(GeminiConfig, redact(api_key), model, base_url,);

fn default_gemini_model() -> String {
    crate::classifier::gemini::DEFAULT_MODEL.to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_gemini_model(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_batch_window_secs", rename = "batchWindowSecs")]
    pub batch_window_secs: u64,
    #[serde(default = "default_context_ttl_minutes", rename = "contextTtlMinutes")]
    pub context_ttl_minutes: u64,
    #[serde(
        default = "default_idempotency_ttl_hours",
        rename = "idempotencyTtlHours"
    )]
    pub idempotency_ttl_hours: u64,
    #[serde(default = "default_pending_ttl_minutes", rename = "pendingTtlMinutes")]
    pub pending_ttl_minutes: u64,
    #[serde(default = "default_recent_log_limit", rename = "recentLogLimit")]
    pub recent_log_limit: usize,
}

fn default_batch_window_secs() -> u64 {
    5
}

fn default_context_ttl_minutes() -> u64 {
    10
}

fn default_idempotency_ttl_hours() -> u64 {
    1
}

fn default_pending_ttl_minutes() -> u64 {
    10
}

fn default_recent_log_limit() -> usize {
    crate::orchestrator::DEFAULT_RECENT_LOG_LIMIT
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            batch_window_secs: default_batch_window_secs(),
            context_ttl_minutes: default_context_ttl_minutes(),
            idempotency_ttl_hours: default_idempotency_ttl_hours(),
            pending_ttl_minutes: default_pending_ttl_minutes(),
            recent_log_limit: default_recent_log_limit(),
        }
    }
}

impl ConversationConfig {
    pub fn batch_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.batch_window_secs)
    }

    pub fn state_ttls(&self) -> StateTtls {
        StateTtls {
            idempotency: minutes_to_duration(self.idempotency_ttl_hours.saturating_mul(60)),
            pending: minutes_to_duration(self.pending_ttl_minutes),
            context: minutes_to_duration(self.context_ttl_minutes),
        }
    }
}

fn minutes_to_duration(minutes: u64) -> chrono::Duration {
    chrono::Duration::try_minutes(i64::try_from(minutes).unwrap_or(i64::MAX))
        .unwrap_or(chrono::Duration::MAX)
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Cron expression (5 or 6 fields). No in-process schedule when unset.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_sweep_timezone")]
    pub timezone: String,
    /// Bearer credential for `/reminder-cron`.
    #[serde(default)]
    pub secret: String,
}

redact_debug!(SweepConfig, schedule, timezone, redact(secret),);

fn default_sweep_timezone() -> String {
    "UTC".to_string()
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            schedule: None,
            timezone: default_sweep_timezone(),
            secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> anyhow::Result<PathBuf> {
        match &self.path {
            Some(p) if !p.trim().is_empty() => Ok(crate::utils::expand_home(p)),
            _ => Ok(crate::utils::get_rolodex_home()?.join("rolodex.db")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_channel() -> String {
    Channel::Telegram.as_str().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            channel: default_channel(),
            telegram: TelegramConfig::default(),
            twilio: TwilioConfig::default(),
            gemini: GeminiConfig::default(),
            conversation: ConversationConfig::default(),
            sweep: SweepConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// The configured delivery channel.
    pub fn delivery_channel(&self) -> Result<Channel, RolodexError> {
        match self.channel.trim().to_ascii_lowercase().as_str() {
            "telegram" => Ok(Channel::Telegram),
            "sms" => Ok(Channel::Sms),
            other => Err(RolodexError::Config(format!(
                "channel must be \"telegram\" or \"sms\", got \"{other}\""
            ))),
        }
    }

    /// Full validation, including credentials for the selected channel and
    /// the classifier.
    pub fn validate(&self) -> Result<(), RolodexError> {
        self.validate_structure()?;
        self.validate_credentials()?;
        Ok(())
    }

    /// Checks that do not depend on secrets being present. Enough for
    /// commands that only touch the database.
    pub fn validate_structure(&self) -> Result<(), RolodexError> {
        self.delivery_channel()?;
        self.validate_gateway()?;
        self.validate_conversation()?;
        self.validate_sweep()?;
        self.validate_urls()?;
        Ok(())
    }

    fn validate_urls(&self) -> Result<(), RolodexError> {
        let urls = [
            ("telegram.apiBase", self.telegram.api_base.as_deref()),
            ("gemini.baseUrl", self.gemini.base_url.as_deref()),
            (
                "twilio.webhookUrl",
                Some(self.twilio.webhook_url.as_str()).filter(|u| !u.is_empty()),
            ),
        ];
        for (field, value) in urls {
            let Some(value) = value else { continue };
            let parsed = url::Url::parse(value)
                .map_err(|e| RolodexError::Config(format!("{field} is not a valid URL: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(RolodexError::Config(format!(
                    "{field} must use http or https"
                )));
            }
        }
        Ok(())
    }

    fn validate_gateway(&self) -> Result<(), RolodexError> {
        if self.gateway.port == 0 {
            return Err(RolodexError::Config("gateway.port must be > 0".into()));
        }
        if self.gateway.host.trim().is_empty() {
            return Err(RolodexError::Config(
                "gateway.host must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn validate_conversation(&self) -> Result<(), RolodexError> {
        let c = &self.conversation;
        if c.context_ttl_minutes == 0 {
            return Err(RolodexError::Config(
                "conversation.contextTtlMinutes must be > 0".into(),
            ));
        }
        if c.idempotency_ttl_hours == 0 {
            return Err(RolodexError::Config(
                "conversation.idempotencyTtlHours must be > 0".into(),
            ));
        }
        if c.pending_ttl_minutes == 0 {
            return Err(RolodexError::Config(
                "conversation.pendingTtlMinutes must be > 0".into(),
            ));
        }
        if c.pending_ttl_minutes.saturating_mul(60) <= c.batch_window_secs {
            return Err(RolodexError::Config(
                "conversation.pendingTtlMinutes must outlast batchWindowSecs".into(),
            ));
        }
        Ok(())
    }

    fn validate_sweep(&self) -> Result<(), RolodexError> {
        crate::utils::parse_timezone(&self.sweep.timezone)
            .map_err(|e| RolodexError::Config(format!("sweep.timezone: {e}")))?;
        if let Some(expr) = &self.sweep.schedule {
            crate::sweep::schedule::validate_cron_expr(expr)
                .map_err(|e| RolodexError::Config(format!("sweep.schedule: {e}")))?;
        }
        Ok(())
    }

    fn validate_credentials(&self) -> Result<(), RolodexError> {
        match self.delivery_channel()? {
            Channel::Telegram => {
                self.require_credential(
                    "telegram-bot-token",
                    "telegram.botToken",
                    " when channel is \"telegram\"",
                )?;
            }
            Channel::Sms => {
                let when = " when channel is \"sms\"";
                self.require_credential("twilio-account-sid", "twilio.accountSid", when)?;
                self.require_credential("twilio-auth-token", "twilio.authToken", when)?;
                if self.twilio.phone_number.trim().is_empty() {
                    return Err(RolodexError::Config(format!(
                        "twilio.phoneNumber is required{when}"
                    )));
                }
            }
        }
        self.require_credential("gemini-api-key", "gemini.apiKey", "")
    }

    /// Fail with a message naming both the config key and its env override.
    fn require_credential(&self, slot: &str, key: &str, when: &str) -> Result<(), RolodexError> {
        let value = credentials::get_credential_value(self, slot).unwrap_or_default();
        if !value.trim().is_empty() {
            return Ok(());
        }
        let hint = credentials::credential_env_var(slot)
            .map(|env| format!(" (or set {env})"))
            .unwrap_or_default();
        Err(RolodexError::Config(format!("{key} is required{when}{hint}")))
    }
}
