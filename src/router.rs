//! Message router
//!
//! Turns one inbound WhatsApp message into replies and persisted records.
//! The flow mirrors the webhook lifecycle: identify the sender, short-cut
//! zero-cost greetings, resolve the intent, resolve the addressee against
//! the address book, then dispatch on the intent kind.
//!
//! - **Version**: 2.1.0
//! - **Since**: 0.2.0
//!
//! ## Changelog
//! - 2.1.0: Per-sender flood control before any processing
//! - 2.0.0: Intent-based dispatch replacing keyword matching
//! - 1.0.0: Initial implementation

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::temporal;
use crate::database::Database;
use crate::features::intent::{Intent, IntentKind, IntentResolver};
use crate::features::notify::Notifier;
use crate::features::rate_limiting::RateLimiter;

/// Routes inbound messages. One instance serves every sender.
pub struct MessageRouter {
    database: Database,
    resolver: IntentResolver,
    notifier: Arc<dyn Notifier>,
    rate_limiter: RateLimiter,
    owner_phone: String,
    owner_name: String,
    assistant_name: String,
}

/// Everything known about the current conversation turn. Replies flow
/// through [`MessageRouter::respond`] so the advisory provider tag and the
/// interaction log are never forgotten.
struct Turn<'a> {
    request_id: Uuid,
    sender_phone: &'a str,
    sender_name: String,
    is_owner: bool,
    inbound: &'a str,
    tag: Option<String>,
}

impl MessageRouter {
    pub fn new(
        database: Database,
        resolver: IntentResolver,
        notifier: Arc<dyn Notifier>,
        rate_limiter: RateLimiter,
        owner_phone: String,
        owner_name: String,
        assistant_name: String,
    ) -> Self {
        MessageRouter {
            database,
            resolver,
            notifier,
            rate_limiter,
            owner_phone,
            owner_name,
            assistant_name,
        }
    }

    /// Process one inbound message end to end.
    pub async fn handle_inbound(&self, sender_phone: &str, text: &str) -> Result<()> {
        let request_id = Uuid::new_v4();

        if !self.rate_limiter.check(sender_phone) {
            warn!("[{request_id}] rate limited {sender_phone}, dropping message");
            return Ok(());
        }

        let (sender_name, is_owner) = self.identify_sender(sender_phone).await;
        debug!("[{request_id}] message from {sender_name} (owner: {is_owner})");

        let mut turn = Turn {
            request_id,
            sender_phone,
            sender_name,
            is_owner,
            inbound: text,
            tag: None,
        };

        // Plain greetings never wake the AI.
        let lowered = text.trim().to_lowercase();
        if matches!(lowered.as_str(), "hi" | "hello" | "hey") {
            let greeting = self.greeting_text(&turn);
            return self.respond(&turn, &greeting).await;
        }

        let now = Utc::now();
        let intent = self.resolver.resolve(text, now, request_id).await;
        info!("[{request_id}] resolved intent {:?}", intent.intent);
        turn.tag = intent.provider_tag.clone();

        if let Err(e) = self.route(&turn, &intent, now).await {
            warn!("[{request_id}] routing failed: {e:#}");
            return self
                .respond(&turn, "Oops, I ran into a database error trying to handle that. 🚨")
                .await;
        }
        Ok(())
    }

    /// Owner by configured number, then the address book, then "Guest".
    async fn identify_sender(&self, sender_phone: &str) -> (String, bool) {
        if sender_phone == self.owner_phone {
            return (self.owner_name.clone(), true);
        }
        match self.database.get_contact_by_phone(sender_phone).await {
            Ok(Some(contact)) => (capitalize(&contact.name), false),
            Ok(None) => ("Guest".to_string(), false),
            Err(e) => {
                warn!("sender lookup failed, treating as guest: {e:#}");
                ("Guest".to_string(), false)
            }
        }
    }

    fn greeting_text(&self, turn: &Turn<'_>) -> String {
        let assistant = &self.assistant_name;
        let owner = &self.owner_name;
        if turn.is_owner {
            format!(
                "Hi {owner}! 👋 I'm {assistant}. My AI brain is online! 🧠\n\n\
                 You can talk to me naturally:\n\
                 📌 \"Remind me at 4 PM to review the quarterly report\"\n\
                 🔄 \"Set a daily routine to take my medicine at 9 AM\"\n\
                 🎉 \"Manu's birthday is on Feb 9th 2026\"\n\
                 ✉️ \"Send a message to dad that I'll be 10 minutes late\""
            )
        } else {
            format!(
                "Hi {}! 👋 I'm {assistant}, {owner}'s personal AI assistant. 🧠\n\n\
                 If you want me to pass a message to {owner} or save a reminder, just let me know!",
                turn.sender_name
            )
        }
    }

    /// Send `body` (plus the advisory provider tag) and record the turn.
    async fn respond(&self, turn: &Turn<'_>, body: &str) -> Result<()> {
        let text = match &turn.tag {
            Some(tag) => format!("{body}\n\n_{tag}_"),
            None => body.to_string(),
        };
        self.notifier.send(turn.sender_phone, &text).await?;
        if let Err(e) = self
            .database
            .log_interaction(&turn.sender_name, turn.sender_phone, turn.inbound, &text)
            .await
        {
            warn!("[{}] interaction log write failed: {e:#}", turn.request_id);
        }
        Ok(())
    }

    /// Dispatch one resolved intent.
    async fn route(&self, turn: &Turn<'_>, intent: &Intent, now: DateTime<Utc>) -> Result<()> {
        // Resolve the addressee first; every kind below relies on it.
        let (target_phone, target_display) = if intent.is_for_owner() {
            (self.owner_phone.clone(), "you".to_string())
        } else {
            let name = intent.target_name.as_deref().unwrap_or_default();
            match self.database.get_contact_by_name(name).await? {
                Some(contact) => (contact.phone, capitalize(&contact.name)),
                None => {
                    let body = format!(
                        "I couldn't find \"{name}\" in the address book. Please check the spelling!"
                    );
                    return self.respond(turn, &body).await;
                }
            }
        };
        let payload = intent.task_or_message.as_deref().unwrap_or_default();

        match intent.intent {
            // The chat payload is already the final reply text.
            IntentKind::Chat => self.respond(turn, payload).await,

            IntentKind::ProviderError => self.respond(turn, &format!("⚠️ {payload}")).await,

            IntentKind::DeleteTask => self.handle_delete(turn, payload).await,

            IntentKind::QueryContacts
            | IntentKind::QueryReminders
            | IntentKind::QueryRoutines
            | IntentKind::QueryEvents => {
                if !turn.is_owner {
                    let body = format!(
                        "🔒 I'm sorry {}, only {} can look through my saved lists.",
                        turn.sender_name, self.owner_name
                    );
                    return self.respond(turn, &body).await;
                }
                let body = match intent.intent {
                    IntentKind::QueryContacts => self.list_contacts_text().await?,
                    IntentKind::QueryReminders => self.list_reminders_text(now).await?,
                    IntentKind::QueryRoutines => self.list_routines_text().await?,
                    _ => self.list_events_text().await?,
                };
                self.respond(turn, &body).await
            }

            IntentKind::QueryBirthday => {
                let body = match self.database.find_event(&target_display, "birthday").await? {
                    Some(event) => {
                        format!("🎂 {target_display}'s birthday is saved as {}.", event.event_date)
                    }
                    None => format!(
                        "I checked my memory, but I don't have a birthday saved for {target_display} yet."
                    ),
                };
                self.respond(turn, &body).await
            }

            IntentKind::QuerySchedule => {
                let Some(date) = intent.date.as_deref() else {
                    return self
                        .respond(
                            turn,
                            "Could you specify which day you want to check? (e.g. \"What is my schedule for today?\")",
                        )
                        .await;
                };
                let body = self.schedule_text(date).await?;
                self.respond(turn, &body).await
            }

            IntentKind::Event => {
                let Some(date) = intent.date.as_deref() else {
                    return self
                        .respond(
                            turn,
                            "I got that it's a special event, but I didn't catch the date. Could you mention it?",
                        )
                        .await;
                };
                let event_type = if payload.is_empty() { "event" } else { payload };
                self.database
                    .add_event(&target_phone, &target_display, event_type, date)
                    .await?;
                let body =
                    format!("🎉 Got it! I've saved {target_display}'s {event_type} for {date}.");
                self.respond(turn, &body).await
            }

            IntentKind::Routine => {
                let Some(time) = intent.time.as_deref().and_then(temporal::parse_time_of_day)
                else {
                    return self
                        .respond(
                            turn,
                            "I understood you want a daily routine, but I didn't catch the time. Could you specify it?",
                        )
                        .await;
                };
                let stored = time.format("%H:%M:%S").to_string();
                self.database
                    .add_routine(&target_phone, payload, &stored)
                    .await?;
                let body = format!(
                    "🔄 Routine set! I'll remind {target_display} to \"{payload}\" every day at {stored}."
                );
                self.respond(turn, &body).await
            }

            IntentKind::InstantMessage => {
                if intent.is_for_owner() {
                    let forwarded = format!("📬 Forwarded from {}: {payload}", turn.sender_name);
                    self.notifier.send(&self.owner_phone, &forwarded).await?;
                    let body = format!("✅ I've passed your message to {}!", self.owner_name);
                    self.respond(turn, &body).await
                } else {
                    let forwarded = format!("✨ Message from {}: {payload}", turn.sender_name);
                    self.notifier.send(&target_phone, &forwarded).await?;
                    let body = format!("✅ Message successfully sent to {target_display}!");
                    self.respond(turn, &body).await
                }
            }

            IntentKind::Reminder => {
                // A reminder without a time gets a clarification request,
                // never a silently assumed default.
                let Some(time) = intent.time.as_deref().and_then(temporal::parse_time_of_day)
                else {
                    return self
                        .respond(
                            turn,
                            "I understood you want a reminder, but I didn't catch the exact time. Could you specify it?",
                        )
                        .await;
                };
                let due = temporal::to_due_instant(time, now);
                let message = if payload.is_empty() {
                    "You have a scheduled reminder!"
                } else {
                    payload
                };
                let group = (!intent.is_for_owner()).then_some(target_display.as_str());
                self.database
                    .add_reminder(&target_phone, message, due, group)
                    .await?;
                let body = format!(
                    "✅ Reminder set for {target_display} at {}.",
                    temporal::format_for_reply(due)
                );
                self.respond(turn, &body).await
            }

            IntentKind::Unknown => {
                let body = format!(
                    "I'm sorry {}, I didn't quite understand that. Could you rephrase it? 🤖",
                    turn.sender_name
                );
                self.respond(turn, &body).await
            }
        }
    }

    /// Owner-only destructive path: try reminders, then routines, then
    /// events, deleting the first match.
    async fn handle_delete(&self, turn: &Turn<'_>, pattern: &str) -> Result<()> {
        if !turn.is_owner {
            let body = format!("🔒 Only {} can delete saved items.", self.owner_name);
            return self.respond(turn, &body).await;
        }
        if pattern.is_empty() {
            return self
                .respond(turn, "What should I delete? Give me a few words from the saved item.")
                .await;
        }

        if let Some(message) = self.database.delete_reminder_matching(pattern).await? {
            let body = format!("🗑️ Successfully deleted reminder: \"{message}\"");
            return self.respond(turn, &body).await;
        }
        if let Some(task) = self.database.delete_routine_matching(pattern).await? {
            let body = format!("🗑️ Successfully deleted routine: \"{task}\"");
            return self.respond(turn, &body).await;
        }
        if let Some(person) = self.database.delete_event_matching(pattern).await? {
            let body = format!("🗑️ Successfully deleted event for: \"{person}\"");
            return self.respond(turn, &body).await;
        }

        let body = format!(
            "I couldn't find anything matching \"{pattern}\" to delete. Try checking your active lists first!"
        );
        self.respond(turn, &body).await
    }

    async fn list_contacts_text(&self) -> Result<String> {
        let names = self.database.list_contact_names().await?;
        let mut text = String::from("📇 *Saved address book:*\n\n");
        if names.is_empty() {
            text.push_str("No contacts found.");
        } else {
            for name in names {
                text.push_str(&format!("- {}\n", capitalize(&name)));
            }
        }
        Ok(text)
    }

    async fn list_reminders_text(&self, now: DateTime<Utc>) -> Result<String> {
        let reminders = self.database.upcoming_reminders(now).await?;
        let mut text = String::from("🔔 *Active upcoming reminders:*\n\n");
        if reminders.is_empty() {
            text.push_str("No active reminders pending! 🌴");
        } else {
            for reminder in reminders {
                let prefix = reminder
                    .group_name
                    .map(|g| format!("{g}: "))
                    .unwrap_or_default();
                text.push_str(&format!(
                    "- [{}] {prefix}{}\n",
                    temporal::format_for_reply(reminder.remind_at),
                    reminder.message
                ));
            }
        }
        Ok(text)
    }

    async fn list_routines_text(&self) -> Result<String> {
        let routines = self.database.list_active_routines().await?;
        let mut text = String::from("🔄 *Active daily routines:*\n\n");
        if routines.is_empty() {
            text.push_str("No active routines.");
        } else {
            for routine in routines {
                text.push_str(&format!(
                    "- Every day at {}: {}\n",
                    routine.remind_time, routine.task_name
                ));
            }
        }
        Ok(text)
    }

    async fn list_events_text(&self) -> Result<String> {
        let events = self.database.all_events().await?;
        let mut text = String::from("🎉 *All special events:*\n\n");
        if events.is_empty() {
            text.push_str("No special events saved.");
        } else {
            for event in events {
                text.push_str(&format!(
                    "- {}: {}'s {}\n",
                    event.event_date, event.person_name, event.event_type
                ));
            }
        }
        Ok(text)
    }

    async fn schedule_text(&self, date: &str) -> Result<String> {
        let events = self.database.events_on_date(date).await?;
        let reminders = match temporal::day_window(date) {
            Some((start, end)) => self.database.reminders_between(start, end).await?,
            None => Vec::new(),
        };

        if events.is_empty() && reminders.is_empty() {
            return Ok(format!(
                "Looks like a free day! I don't see any reminders or events scheduled for {date}. 🌴"
            ));
        }

        let mut text = format!("📅 *Your schedule for {date}:*\n\n");
        if !events.is_empty() {
            text.push_str("*Special events:*\n");
            for event in &events {
                text.push_str(&format!("- {}'s {} 🎉\n", event.person_name, event.event_type));
            }
        }
        if !reminders.is_empty() {
            text.push_str("\n*Reminders:*\n");
            for reminder in &reminders {
                text.push_str(&format!(
                    "- {}: {}\n",
                    temporal::format_for_reply(reminder.remind_at),
                    reminder.message
                ));
            }
        }
        Ok(text)
    }
}

/// First letter uppercased, rest untouched ("manu" -> "Manu").
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
