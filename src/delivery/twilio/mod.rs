use super::{Delivery, Recipient, split_message};
use crate::errors::RolodexError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const API_BASE: &str = "https://api.twilio.com";
const SMS_LIMIT: usize = 1600;

/// Sends SMS through Twilio's Messages resource.
pub struct TwilioDelivery {
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
    client: reqwest::Client,
}

impl TwilioDelivery {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            api_base: API_BASE.to_string(),
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base: String) -> Self {
        self.api_base = base;
        self
    }
}

#[async_trait]
impl Delivery for TwilioDelivery {
    async fn deliver(&self, to: &Recipient, text: &str) -> Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        for chunk in split_message(text, SMS_LIMIT) {
            let response = self
                .client
                .post(&url)
                .basic_auth(&self.account_sid, Some(&self.auth_token))
                .form(&[
                    ("Body", chunk.as_str()),
                    ("To", to.address.as_str()),
                    ("From", self.from_number.as_str()),
                ])
                .send()
                .await
                .context("Failed to reach Twilio API")?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(RolodexError::Delivery {
                    channel: "sms".to_string(),
                    message: format!("twilio API error ({status}): {body}"),
                }
                .into());
            }
        }
        debug!("twilio: delivered {} bytes to {}", text.len(), to.address);
        Ok(())
    }
}
