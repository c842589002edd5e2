//! # Scheduler Feature
//!
//! Temporal dispatch: three independent polling loops that decide which
//! persisted reminders, routines, and events are due "now" and hand them
//! to the notifier. Reminders are fired exactly once per record (pending →
//! completed); routines and events are stateless recurring triggers.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 2.0.0: Exact-minute routine matching with same-minute latch
//! - 1.1.0: Daily event digest at a fixed local time
//! - 1.0.0: Initial release with the reminder poller

pub mod dispatch;

pub use dispatch::DispatchScheduler;
