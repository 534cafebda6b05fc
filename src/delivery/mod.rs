//! Outbound replies.
//!
//! The orchestrator and the sweep only know [`Delivery`]; which transport a
//! message rides on is decided by the [`Recipient`]'s channel.

pub mod telegram;
pub mod twilio;

use crate::errors::RolodexError;
use crate::ledger::{Channel, UserRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use telegram::TelegramDelivery;
pub use twilio::TwilioDelivery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub channel: Channel,
    /// Phone number for SMS, chat id for Telegram.
    pub address: String,
}

impl Recipient {
    pub fn new(channel: Channel, address: impl Into<String>) -> Self {
        Self {
            channel,
            address: address.into(),
        }
    }

    /// Where to reach `user` on `channel`, if they have an address there.
    pub fn for_user(user: &UserRecord, channel: Channel) -> Option<Self> {
        user.address(channel).map(|a| Self::new(channel, a))
    }
}

#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, to: &Recipient, text: &str) -> Result<()>;
}

/// Dispatches to whichever transport is configured for the recipient's channel.
#[derive(Default, Clone)]
pub struct ChannelRouter {
    telegram: Option<Arc<dyn Delivery>>,
    sms: Option<Arc<dyn Delivery>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_channel(mut self, channel: Channel, delivery: Arc<dyn Delivery>) -> Self {
        match channel {
            Channel::Telegram => self.telegram = Some(delivery),
            Channel::Sms => self.sms = Some(delivery),
        }
        self
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        match channel {
            Channel::Telegram => self.telegram.is_some(),
            Channel::Sms => self.sms.is_some(),
        }
    }
}

#[async_trait]
impl Delivery for ChannelRouter {
    async fn deliver(&self, to: &Recipient, text: &str) -> Result<()> {
        let target = match to.channel {
            Channel::Telegram => self.telegram.as_ref(),
            Channel::Sms => self.sms.as_ref(),
        };
        let Some(target) = target else {
            return Err(RolodexError::Delivery {
                channel: to.channel.to_string(),
                message: "channel is not configured".to_string(),
            }
            .into());
        };
        target.deliver(to, text).await
    }
}

/// Split `text` into chunks of at most `limit` bytes, preferring line breaks
/// and never cutting through a UTF-8 sequence.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > limit {
        let mut cut = limit;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        let (head, tail) = match rest[..cut].rfind('\n') {
            Some(nl) if nl > 0 => (&rest[..nl], &rest[nl + 1..]),
            _ => (&rest[..cut], &rest[cut..]),
        };
        let head = head.trim();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }
        rest = tail;
    }

    let rest = rest.trim();
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
