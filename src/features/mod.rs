//! # Features Layer
//!
//! All feature modules of the assistant. Each feature owns one concern and
//! exposes a small surface re-exported here.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0

pub mod intent;
pub mod notify;
pub mod quota;
pub mod rate_limiting;
pub mod scheduler;

// Intent resolution
pub use intent::{
    GeminiClassifier, Intent, IntentKind, IntentProvider, IntentResolver, MeteredClassifier,
    OpenAiClassifier, PromptProfile,
};
// Outbound delivery
pub use notify::{Notifier, WhatsAppNotifier};
// Daily classifier quota
pub use quota::{QuotaDecision, UsageLimiter};
// Inbound flood control
pub use rate_limiting::RateLimiter;
// Temporal dispatch
pub use scheduler::DispatchScheduler;
