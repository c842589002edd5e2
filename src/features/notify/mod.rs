//! # Notify Feature
//!
//! Outbound message delivery boundary. The core only ever talks to the
//! [`Notifier`] trait; the production implementation posts to the WhatsApp
//! Cloud (Graph) API.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use std::time::Duration;

use crate::core::response::truncate_for_message;

/// Delivers one text message to one destination. Implementations must be
/// safe to call concurrently and should bound their own network time.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<()>;
}

/// Graph API text-message payload.
#[derive(Serialize)]
struct OutboundMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: OutboundText<'a>,
}

#[derive(Serialize)]
struct OutboundText<'a> {
    body: &'a str,
}

/// Production notifier for the WhatsApp Cloud API.
pub struct WhatsAppNotifier {
    http: reqwest::Client,
    token: String,
    endpoint: String,
}

impl WhatsAppNotifier {
    /// Delivery attempts are bounded; a timeout is a failure the caller
    /// may retry on its own schedule.
    const SEND_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(token: String, phone_number_id: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Self::SEND_TIMEOUT)
            .build()
            .context("failed to build WhatsApp HTTP client")?;
        Ok(WhatsAppNotifier {
            http,
            token,
            endpoint: format!("https://graph.facebook.com/v19.0/{phone_number_id}/messages"),
        })
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        let body = truncate_for_message(text);
        let payload = OutboundMessage {
            messaging_product: "whatsapp",
            to: destination,
            kind: "text",
            text: OutboundText { body: &body },
        };

        self.http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .context("WhatsApp send failed")?
            .error_for_status()
            .context("WhatsApp rejected the message")?;

        debug!("delivered {} chars to {destination}", body.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn Notifier) {}

    #[test]
    fn test_outbound_payload_shape() {
        let payload = OutboundMessage {
            messaging_product: "whatsapp",
            to: "911234567890",
            kind: "text",
            text: OutboundText { body: "hello" },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["messaging_product"], "whatsapp");
        assert_eq!(json["to"], "911234567890");
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"]["body"], "hello");
    }
}
