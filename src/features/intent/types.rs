//! Structured intent records exchanged with the classification providers.

use serde::{Deserialize, Serialize};

/// Wire sentinel meaning "the owner" in `target_name`. This is what the
/// few-shot examples teach the model to emit for self-directed messages.
pub const SELF_TARGET: &str = "you";

/// The fixed set of actions a message can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Reminder,
    Routine,
    Event,
    InstantMessage,
    Chat,
    QueryBirthday,
    QuerySchedule,
    QueryRoutines,
    QueryContacts,
    QueryReminders,
    QueryEvents,
    DeleteTask,
    /// Synthesized locally when every provider fails; never requested
    /// from a model.
    ProviderError,
    /// Anything the classifier could not place, including kinds this
    /// version does not know about.
    #[serde(other)]
    Unknown,
}

/// One classified message. Transient: produced per inbound message,
/// consumed immediately by the router, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub intent: IntentKind,
    /// Addressee token ([`SELF_TARGET`] or a contact name), if any.
    #[serde(default, rename = "targetName")]
    pub target_name: Option<String>,
    /// Wall-clock time-of-day "HH:MM:SS" in the home timezone.
    #[serde(default)]
    pub time: Option<String>,
    /// Calendar date "YYYY-MM-DD".
    #[serde(default)]
    pub date: Option<String>,
    /// Task description, message body, or (for `chat`) the reply itself.
    #[serde(default, rename = "taskOrMessage")]
    pub task_or_message: Option<String>,
    /// Which provider answered and with what quota headroom. Advisory
    /// only: displayed to the user, never routed on.
    #[serde(skip)]
    pub provider_tag: Option<String>,
}

impl Default for Intent {
    fn default() -> Self {
        Intent {
            intent: IntentKind::Unknown,
            target_name: None,
            time: None,
            date: None,
            task_or_message: None,
            provider_tag: None,
        }
    }
}

impl Intent {
    /// The terminal degraded intent returned when every provider failed.
    pub fn provider_error(explanation: impl Into<String>) -> Self {
        Intent {
            intent: IntentKind::ProviderError,
            target_name: Some(SELF_TARGET.to_string()),
            task_or_message: Some(explanation.into()),
            ..Intent::default()
        }
    }

    /// Whether the target is the owner (absent or the self sentinel).
    pub fn is_for_owner(&self) -> bool {
        match &self.target_name {
            None => true,
            Some(name) => name.eq_ignore_ascii_case(SELF_TARGET),
        }
    }
}
