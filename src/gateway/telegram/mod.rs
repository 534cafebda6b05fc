use super::GatewayState;
use crate::ledger::Channel;
use crate::orchestrator::InboundMessage;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Turn an update into an inbound message. Non-message and non-text
/// updates yield `None`. The update id doubles as the message id.
pub fn to_inbound(update: Update) -> Option<InboundMessage> {
    let message = update.message?;
    let text = message.text.filter(|t| !t.trim().is_empty())?;
    Some(InboundMessage {
        channel: Channel::Telegram,
        sender: message.chat.id.to_string(),
        message_id: update.update_id.to_string(),
        text,
    })
}

fn secret_matches(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|given| given.as_bytes().ct_eq(expected.as_bytes()).into())
}

/// POST /telegram-webhook
pub(super) async fn webhook_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    if !secret_matches(&headers, &state.telegram_secret) {
        warn!("telegram webhook: invalid secret token");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            debug!("telegram webhook: unparseable update: {}", e);
            return StatusCode::OK.into_response();
        }
    };

    let update_id = update.update_id;
    let Some(inbound) = to_inbound(update) else {
        debug!("telegram webhook: ignoring update {} without text", update_id);
        return StatusCode::OK.into_response();
    };

    let outcome = state.orchestrator.handle(&inbound).await;
    debug!("telegram webhook: update {} -> {:?}", update_id, outcome);
    StatusCode::OK.into_response()
}
