//! Configuration loading from environment variables
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.2.0
//!
//! ## Changelog
//! - 1.2.0: Add assistant/owner display names for prompt personalization
//! - 1.1.0: Add Gemini daily ceiling and fallback model settings
//! - 1.0.0: Initial implementation

use anyhow::{Context, Result};

/// Runtime configuration for the assistant.
///
/// All values come from environment variables (a `.env` file is loaded by
/// the binary before this runs). Required variables produce an error with
/// the variable name; optional ones fall back to sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// WhatsApp Cloud API bearer token.
    pub whatsapp_token: String,
    /// Phone-number id the bot sends from (Graph API path segment).
    pub whatsapp_phone_number_id: String,
    /// Shared secret echoed back during webhook verification.
    pub verify_token: String,
    /// The owner's phone number in wire format (e.g. "9198xxxxxxxx").
    pub owner_phone: String,
    /// Display name used when the bot talks about its owner.
    pub owner_name: String,
    /// The bot's own display name.
    pub assistant_name: String,
    /// Google AI Studio key for the primary classifier.
    pub gemini_api_key: String,
    /// Gemini model id.
    pub gemini_model: String,
    /// Maximum Gemini calls per IST calendar day.
    pub gemini_daily_limit: u32,
    /// OpenAI key for the fallback classifier.
    pub openai_api_key: String,
    /// OpenAI model id for the fallback classifier.
    pub openai_model: String,
    /// Path to the sqlite database file.
    pub database_path: String,
    /// Default log filter (overridable via RUST_LOG).
    pub log_level: String,
    /// HTTP port for the webhook server.
    pub port: u16,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            whatsapp_token: require("WHATSAPP_TOKEN")?,
            whatsapp_phone_number_id: require("WHATSAPP_PHONE_NUMBER_ID")?,
            verify_token: require("VERIFY_TOKEN")?,
            owner_phone: require("OWNER_PHONE_NUMBER")?,
            owner_name: optional("OWNER_NAME", "the owner"),
            assistant_name: optional("ASSISTANT_NAME", "Aria"),
            gemini_api_key: require("GEMINI_API_KEY")?,
            gemini_model: optional("GEMINI_MODEL", "gemini-2.5-flash"),
            gemini_daily_limit: optional("GEMINI_DAILY_LIMIT", "20")
                .parse()
                .context("GEMINI_DAILY_LIMIT must be a non-negative integer")?,
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_model: optional("OPENAI_MODEL", "gpt-4o-mini"),
            database_path: optional("DATABASE_PATH", "concierge.db"),
            log_level: optional("LOG_LEVEL", "info"),
            port: optional("PORT", "3000")
                .parse()
                .context("PORT must be a valid TCP port")?,
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
