//! # Intent Feature
//!
//! Natural-language-to-structured-intent extraction with quota-gated
//! multi-provider fallback. One classification request is built per inbound
//! message and tried against an ordered list of providers; the first
//! success wins and all-fail degrades to a `provider_error` intent.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Quota gating moved into a metered provider decorator
//! - 1.1.0: OpenAI fallback classifier
//! - 1.0.0: Initial release with Gemini classification

pub mod prompt;
pub mod providers;
pub mod resolver;
pub mod types;

pub use prompt::PromptProfile;
pub use providers::{GeminiClassifier, IntentProvider, MeteredClassifier, OpenAiClassifier};
pub use resolver::IntentResolver;
pub use types::{Intent, IntentKind, SELF_TARGET};
