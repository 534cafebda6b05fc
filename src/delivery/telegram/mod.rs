use super::{Delivery, Recipient, split_message};
use crate::errors::RolodexError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub const API_BASE: &str = "https://api.telegram.org";
const MESSAGE_LIMIT: usize = 4096;

/// Sends replies through the Bot API's `sendMessage`.
pub struct TelegramDelivery {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramDelivery {
    pub fn new(bot_token: String, api_base: Option<String>) -> Self {
        Self {
            bot_token,
            api_base: api_base
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| API_BASE.to_string()),
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    async fn send_chunk(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let resp = self
            .client
            .post(&url)
            .json(&json!({"chat_id": chat_id, "text": text}))
            .send()
            .await
            .context("Failed to reach Telegram API")?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() || body["ok"] != Value::Bool(true) {
            let description = body["description"].as_str().unwrap_or("unknown error");
            return Err(RolodexError::Delivery {
                channel: "telegram".to_string(),
                message: format!("sendMessage failed ({status}): {description}"),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn deliver(&self, to: &Recipient, text: &str) -> Result<()> {
        for chunk in split_message(text, MESSAGE_LIMIT) {
            self.send_chunk(&to.address, &chunk).await?;
        }
        debug!("telegram: delivered {} bytes to {}", text.len(), to.address);
        Ok(())
    }
}
