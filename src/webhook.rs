//! WhatsApp Cloud webhook transport
//!
//! Thin HTTP boundary: the Meta verification handshake, plus inbound
//! message extraction. The POST handler acknowledges immediately and hands
//! the message to the router on a spawned task, as the platform requires a
//! fast 200.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use log::{debug, error, info};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::router::MessageRouter;

/// Shared state for the webhook handlers.
pub struct AppState {
    pub router: MessageRouter,
    pub verify_token: String,
}

/// Build the webhook application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook", get(verify).post(receive))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: Arc<AppState>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("webhook server listening on {addr}");
    axum::serve(listener, app(state))
        .await
        .context("webhook server stopped")?;
    Ok(())
}

/// Keeps free-tier hosts from idling the process out.
async fn health() -> &'static str {
    "awake and listening 🧠"
}

/// Meta webhook verification handshake parameters.
#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> (StatusCode, String) {
    match (params.mode, params.verify_token, params.challenge) {
        (Some(_), Some(token), Some(challenge)) if token == state.verify_token => {
            info!("webhook verification handshake accepted");
            (StatusCode::OK, challenge)
        }
        _ => (StatusCode::FORBIDDEN, String::new()),
    }
}

// --- Inbound payload --------------------------------------------------

/// The slice of the WhatsApp webhook envelope this bot cares about.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    from: String,
    #[serde(default)]
    text: Option<InboundText>,
}

#[derive(Debug, Deserialize)]
struct InboundText {
    body: String,
}

/// Pull the first inbound text message out of the envelope, if any.
/// Status updates, media, and reactions all come through the same webhook
/// and are ignored here.
pub fn extract_text_message(payload: WebhookPayload) -> Option<(String, String)> {
    let message = payload
        .entry
        .into_iter()
        .next()?
        .changes
        .into_iter()
        .next()?
        .value
        .messages
        .into_iter()
        .next()?;
    let body = message.text?.body;
    Some((message.from, body))
}

async fn receive(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    // Acknowledge before processing; Meta retries on slow responses.
    if let Some((from, body)) = extract_text_message(payload) {
        debug!("inbound text from {from}");
        tokio::spawn(async move {
            if let Err(e) = state.router.handle_inbound(&from, &body).await {
                error!("inbound message handling failed: {e:#}");
            }
        });
    }
    StatusCode::OK
}
