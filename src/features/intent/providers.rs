//! Classification providers.
//!
//! Two concrete classifiers (Gemini primary, OpenAI fallback) behind one
//! trait, plus a metering decorator that charges the daily quota before
//! the primary is allowed to spend a call.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::warn;
use openai::chat::{ChatCompletion, ChatCompletionMessage, ChatCompletionMessageRole};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

use crate::features::intent::types::Intent;
use crate::features::quota::UsageLimiter;

/// HTTP deadline for a single classification round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One strategy for turning a prompt into a structured [`Intent`].
///
/// `prompt` is the full classification request; `message` is the raw user
/// text for providers that take the conversation as separate turns.
#[async_trait]
pub trait IntentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, prompt: &str, message: &str) -> Result<Intent>;
}

// --- Gemini (primary) -------------------------------------------------

/// Primary classifier backed by the Gemini generateContent REST API.
///
/// Gemini may wrap its JSON in prose even when asked for a JSON mime type,
/// so the response text goes through a permissive brace search before
/// parsing.
pub struct GeminiClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(serde::Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(serde::Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(serde::Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(serde::Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiClassifier {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(GeminiClassifier { http, api_key, model })
    }
}

#[async_trait]
impl IntentProvider for GeminiClassifier {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn classify(&self, prompt: &str, _message: &str) -> Result<Intent> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?
            .error_for_status()
            .context("Gemini rejected the request")?
            .json::<GenerateContentResponse>()
            .await
            .context("Gemini returned an unreadable body")?;

        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .unwrap_or_default();

        let Some(raw) = extract_json_object(text) else {
            bail!("no JSON object in Gemini response");
        };
        serde_json::from_str(raw).context("Gemini JSON did not match the intent schema")
    }
}

// --- OpenAI (fallback) ------------------------------------------------

/// Fallback classifier using the OpenAI chat API. The prompt already
/// demands raw JSON; the response is parsed strictly (no brace search) so
/// a chatty fallback is surfaced as a failure rather than half-trusted.
pub struct OpenAiClassifier {
    model: String,
}

impl OpenAiClassifier {
    pub fn new(model: String) -> Self {
        OpenAiClassifier { model }
    }
}

#[async_trait]
impl IntentProvider for OpenAiClassifier {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn classify(&self, prompt: &str, message: &str) -> Result<Intent> {
        let messages = vec![
            ChatCompletionMessage {
                role: ChatCompletionMessageRole::System,
                content: Some(prompt.to_string()),
                name: None,
                function_call: None,
                tool_call_id: None,
                tool_calls: None,
            },
            ChatCompletionMessage {
                role: ChatCompletionMessageRole::User,
                content: Some(message.to_string()),
                name: None,
                function_call: None,
                tool_call_id: None,
                tool_calls: None,
            },
        ];

        let completion = ChatCompletion::builder(&self.model, messages)
            .create()
            .await
            .context("OpenAI request failed")?;

        let content = completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        serde_json::from_str(strip_code_fence(content.trim()))
            .context("OpenAI response was not a valid intent object")
    }
}

// --- Quota decorator --------------------------------------------------

/// Wraps the metered (primary) provider so the daily ceiling is charged
/// before the call is spent. A denied or unreadable quota is a provider
/// failure, which makes the resolver fall through to the next strategy.
pub struct MeteredClassifier {
    inner: Box<dyn IntentProvider>,
    limiter: UsageLimiter,
}

impl MeteredClassifier {
    pub fn new(inner: Box<dyn IntentProvider>, limiter: UsageLimiter) -> Self {
        MeteredClassifier { inner, limiter }
    }
}

#[async_trait]
impl IntentProvider for MeteredClassifier {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn classify(&self, prompt: &str, message: &str) -> Result<Intent> {
        let decision = match self.limiter.try_consume().await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("usage counter unreachable, treating quota as exhausted: {e:#}");
                bail!("usage counter unavailable");
            }
        };
        if !decision.allowed {
            bail!("daily ceiling reached for {}", self.inner.name());
        }

        let mut intent = self.inner.classify(prompt, message).await?;
        intent.provider_tag = Some(format!(
            "⚡ {} {} requests left today",
            decision.remaining,
            self.inner.name()
        ));
        Ok(intent)
    }
}

// --- Response text helpers --------------------------------------------

/// Find the outermost JSON object in free text: first `{` through the last
/// `}`. Providers sometimes wrap the object in prose or markdown.
pub fn extract_json_object(text: &str) -> Option<&str> {
    static OBJECT: OnceLock<Regex> = OnceLock::new();
    let object = OBJECT.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));
    object.find(text).map(|m| m.as_str())
}

/// Remove a surrounding markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
