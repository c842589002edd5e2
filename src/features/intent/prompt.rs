//! Classification prompt construction.
//!
//! One prompt serves both providers. It embeds the current instant (so the
//! model can resolve relative times like "in 5 minutes" against the `now`
//! the caller passed in, not the moment the provider answers), the output
//! schema, and a worked example for each intent kind.

use chrono::{DateTime, Utc};

use crate::core::temporal;

/// Names the prompt speaks in. Comes from configuration so deployments can
/// rebrand without code changes.
#[derive(Debug, Clone)]
pub struct PromptProfile {
    pub assistant_name: String,
    pub owner_name: String,
}

/// Build the full classification request for one inbound message.
pub fn build_classifier_prompt(
    profile: &PromptProfile,
    message: &str,
    now: DateTime<Utc>,
) -> String {
    let local_now = now
        .with_timezone(&temporal::home_zone())
        .format("%A, %B %-d, %Y at %H:%M:%S");
    let assistant = &profile.assistant_name;
    let owner = &profile.owner_name;

    format!(
        r#"You are the intelligent brain of a personal WhatsApp assistant named {assistant}.
Your owner is {owner}. You are currently talking to a user via WhatsApp.

CRITICAL CONTEXT:
The current date and time right now is: {local_now} (IST).
If the user asks for a relative time like "in 5 minutes", use this current time to calculate the exact HH:MM:SS.

Your job is to read the user's message and extract the exact intent.
You MUST respond with ONLY a valid, raw JSON object. Do not include markdown or conversational text.

Use this exact JSON structure:
{{
  "intent": "reminder" | "routine" | "event" | "instant_message" | "chat" | "query_birthday" | "query_schedule" | "query_routines" | "query_contacts" | "query_reminders" | "query_events" | "delete_task" | "unknown",
  "targetName": "you" (use "you" if the message is meant for {owner}, "him", "her", or "owner") OR the extracted name,
  "time": "HH:MM:SS" (24-hour format if a time is mentioned or calculated; assume IST),
  "date": "YYYY-MM-DD" (if a specific date is mentioned or calculated for queries or events),
  "taskOrMessage": "the cleaned up task or message; for deletions, what needs deleting (e.g. 'drink water')"
}}

Examples:
Message: "What contacts do you have?"
JSON: {{"intent": "query_contacts", "targetName": "you", "time": null, "date": null, "taskOrMessage": null}}

Message: "Show me all active reminders"
JSON: {{"intent": "query_reminders", "targetName": "you", "time": null, "date": null, "taskOrMessage": null}}

Message: "List my daily routines"
JSON: {{"intent": "query_routines", "targetName": "you", "time": null, "date": null, "taskOrMessage": null}}

Message: "What are my special events?"
JSON: {{"intent": "query_events", "targetName": "you", "time": null, "date": null, "taskOrMessage": null}}

Message: "When is Manu's birthday?"
JSON: {{"intent": "query_birthday", "targetName": "manu", "time": null, "date": null, "taskOrMessage": null}}

Message: "What is my schedule for tomorrow?"
JSON: {{"intent": "query_schedule", "targetName": "you", "time": null, "date": "2026-02-28", "taskOrMessage": null}}

Message: "Remind me in 5 minutes to check logs"
JSON: {{"intent": "reminder", "targetName": "you", "time": "14:12:00", "date": null, "taskOrMessage": "check logs"}}

Message: "Set a daily routine to drink water at 9 AM"
JSON: {{"intent": "routine", "targetName": "you", "time": "09:00:00", "date": null, "taskOrMessage": "drink water"}}

Message: "Manu's birthday is on Feb 9th 2026"
JSON: {{"intent": "event", "targetName": "manu", "time": null, "date": "2026-02-09", "taskOrMessage": "birthday"}}

Message: "Tell me a joke"
JSON: {{"intent": "chat", "targetName": null, "time": null, "date": null, "taskOrMessage": "Why do programmers prefer dark mode? Because light attracts bugs!"}}

Message: "Tell him to call me back"
JSON: {{"intent": "instant_message", "targetName": "you", "time": null, "date": null, "taskOrMessage": "call me back"}}

Message: "Delete the reminder to drink water"
JSON: {{"intent": "delete_task", "targetName": "you", "time": null, "date": null, "taskOrMessage": "drink water"}}

Now, analyze this message:
Message: "{message}"
"#
    )
}
