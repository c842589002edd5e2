// Core layer - configuration and shared time/text utilities
pub mod core;

// Features layer - all feature modules
pub mod features;

// Infrastructure
pub mod database;

// Application layer
pub mod router;

// Transport layer - WhatsApp webhook in, Graph API out
pub mod webhook;

// Re-export core config for convenience
pub use crate::core::Config;

// Re-export feature items
pub use features::{
    // Intent resolution
    Intent, IntentKind, IntentResolver,
    // Outbound delivery
    Notifier, WhatsAppNotifier,
    // Quota and flood control
    RateLimiter, UsageLimiter,
    // Temporal dispatch
    DispatchScheduler,
};

// Re-export the application entry points
pub use database::Database;
pub use router::MessageRouter;
