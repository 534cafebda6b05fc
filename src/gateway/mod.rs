//! HTTP adapters in front of the orchestrator and the reminder sweep.
//!
//! Every webhook authenticates first. Once a request is authenticated the
//! handler awaits the turn and answers `200` whatever happened inside it, so
//! upstream providers never retry.

pub mod telegram;
pub mod twilio;

use crate::orchestrator::Orchestrator;
use crate::sweep::ReminderSweep;
use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub sweep: Arc<ReminderSweep>,
    /// Expected `X-Telegram-Bot-Api-Secret-Token`. Unchecked when empty.
    pub telegram_secret: String,
    /// Twilio auth token used for signature validation. SMS is refused when empty.
    pub twilio_auth_token: String,
    /// Public URL of `/sms-webhook` as Twilio sees it.
    pub twilio_webhook_url: String,
    /// Bearer credential for `/reminder-cron`. The trigger is refused when empty.
    pub sweep_secret: String,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/telegram-webhook", post(telegram::webhook_handler))
        .route("/sms-webhook", post(twilio::webhook_handler))
        .route("/reminder-cron", post(reminder_cron_handler).get(reminder_cron_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Constant-time check of an `Authorization: Bearer <secret>` header.
pub(crate) fn bearer_matches(headers: &HeaderMap, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return false;
    };
    token.trim().as_bytes().ct_eq(secret.as_bytes()).into()
}

/// POST|GET /reminder-cron
async fn reminder_cron_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> axum::response::Response {
    if !bearer_matches(&headers, &state.sweep_secret) {
        warn!("reminder-cron: rejected request with bad credentials");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.sweep.run().await {
        Ok(report) => info!(
            "reminder-cron: {} users, {} sent, {} failed",
            report.users_processed, report.messages_sent, report.users_failed
        ),
        Err(e) => error!("reminder-cron: sweep failed: {:#}", e),
    }
    (StatusCode::OK, "OK").into_response()
}

/// Bind and serve until `shutdown` flips to true.
pub async fn start(
    host: &str,
    port: u16,
    state: GatewayState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("gateway listening on {}", addr);

    let handle = tokio::spawn(async move {
        let shutdown_signal = async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            error!("gateway server error: {}", e);
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests;
