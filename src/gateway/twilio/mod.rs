use super::GatewayState;
use crate::ledger::Channel;
use crate::orchestrator::InboundMessage;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Empty TwiML: acknowledges without sending an automatic reply.
const EMPTY_TWIML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response></Response>";

/// Compute Twilio's request signature: base64 HMAC-SHA1 over the URL followed
/// by every form param (key then value) in key order.
pub fn compute_signature(auth_token: &str, url: &str, params: &HashMap<String, String>) -> String {
    let mut data = url.to_string();
    let mut sorted_keys: Vec<&String> = params.keys().collect();
    sorted_keys.sort();
    for key in sorted_keys {
        data.push_str(key);
        data.push_str(&params[key]);
    }

    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
        return String::new();
    };
    mac.update(data.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

pub fn validate_twilio_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &HashMap<String, String>,
) -> bool {
    if auth_token.is_empty() {
        return false;
    }
    let expected = compute_signature(auth_token, url, params);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// URL Twilio signed. Falls back to the Host header when no public URL is configured.
fn signed_url(state: &GatewayState, headers: &HeaderMap) -> String {
    if !state.twilio_webhook_url.is_empty() {
        return state.twilio_webhook_url.clone();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("https://{host}/sms-webhook")
}

fn twiml_ok() -> axum::response::Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        EMPTY_TWIML,
    )
        .into_response()
}

/// POST /sms-webhook
pub(super) async fn webhook_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: String,
) -> axum::response::Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!("sms webhook: missing {} header", SIGNATURE_HEADER);
        return StatusCode::FORBIDDEN.into_response();
    };

    let params: HashMap<String, String> = form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let url = signed_url(&state, &headers);
    if !validate_twilio_signature(&state.twilio_auth_token, signature, &url, &params) {
        warn!("sms webhook: invalid signature");
        return StatusCode::FORBIDDEN.into_response();
    }

    let from = params.get("From").map_or("", String::as_str);
    let text = params.get("Body").map_or("", String::as_str);
    let sid = params.get("MessageSid").map_or("", String::as_str);
    if from.is_empty() || sid.is_empty() || text.trim().is_empty() {
        debug!("sms webhook: ignoring request without sender, sid or body");
        return twiml_ok();
    }

    let inbound = InboundMessage {
        channel: Channel::Sms,
        sender: from.to_string(),
        message_id: sid.to_string(),
        text: text.to_string(),
    };
    let outcome = state.orchestrator.handle(&inbound).await;
    debug!("sms webhook: message {} -> {:?}", sid, outcome);
    twiml_ok()
}
