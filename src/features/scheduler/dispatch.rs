//! Polling loops and per-tick dispatch logic.
//!
//! Each loop runs its tick body to completion before awaiting the next
//! tick, so a poller never overlaps itself. Loops share nothing but the
//! database handle and the notifier; a failed read skips the whole cycle,
//! a failed delivery skips only that item.

use anyhow::Result;
use chrono::{DateTime, NaiveTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::core::temporal;
use crate::database::Database;
use crate::features::notify::Notifier;

/// Cadence of the reminder and routine pollers.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// IST wall-clock time of the daily event digest.
fn event_digest_time() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).expect("08:00:00 is a valid time")
}

/// Owns the three background pollers.
pub struct DispatchScheduler {
    database: Database,
    notifier: Arc<dyn Notifier>,
}

impl DispatchScheduler {
    pub fn new(database: Database, notifier: Arc<dyn Notifier>) -> Self {
        DispatchScheduler { database, notifier }
    }

    /// Spawn the reminder, routine, and event loops. Each loop runs for
    /// the life of the process.
    pub fn start(&self) {
        info!("starting dispatch scheduler (reminders/routines every 60s, events daily at 08:00 IST)");
        tokio::spawn(reminder_loop(self.database.clone(), self.notifier.clone()));
        tokio::spawn(routine_loop(self.database.clone(), self.notifier.clone()));
        tokio::spawn(event_loop(self.database.clone(), self.notifier.clone()));
    }
}

async fn reminder_loop(database: Database, notifier: Arc<dyn Notifier>) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = poll_reminders_once(&database, notifier.as_ref(), Utc::now()).await {
            warn!("reminder cycle skipped: {e:#}");
        }
    }
}

async fn routine_loop(database: Database, notifier: Arc<dyn Notifier>) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_minute: Option<String> = None;
    loop {
        interval.tick().await;
        if let Err(e) =
            poll_routines_once(&database, notifier.as_ref(), Utc::now(), &mut last_minute).await
        {
            warn!("routine cycle skipped: {e:#}");
        }
    }
}

async fn event_loop(database: Database, notifier: Arc<dyn Notifier>) {
    loop {
        let now = Utc::now();
        let next = temporal::to_due_instant(event_digest_time(), now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!("next event digest in {}s", wait.as_secs());
        tokio::time::sleep(wait).await;

        if let Err(e) = poll_events_once(&database, notifier.as_ref(), Utc::now()).await {
            warn!("event cycle skipped: {e:#}");
        }
    }
}

/// One reminder tick: deliver everything pending and past due, then mark
/// each delivered row completed (guarded, so a lost race means no second
/// delivery through the store). Returns the number delivered.
pub async fn poll_reminders_once(
    database: &Database,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> Result<usize> {
    let due = database.due_reminders(now).await?;
    let mut delivered = 0;

    for reminder in due {
        let text = match &reminder.group_name {
            Some(group) => format!("✨ Reminder for {group}: {}", reminder.message),
            None => format!("✨ Reminder: {}", reminder.message),
        };
        match notifier.send(&reminder.phone, &text).await {
            Ok(()) => match database.complete_reminder(reminder.id).await {
                Ok(true) => delivered += 1,
                Ok(false) => debug!("reminder {} was already completed", reminder.id),
                Err(e) => warn!(
                    "reminder {} delivered but not marked completed, it will repeat next cycle: {e:#}",
                    reminder.id
                ),
            },
            Err(e) => warn!(
                "reminder {} delivery failed, leaving pending for retry: {e:#}",
                reminder.id
            ),
        }
    }

    Ok(delivered)
}

/// One routine tick: fire every active routine whose stored minute equals
/// the current IST minute. `last_minute` latches the minute most recently
/// processed so two ticks inside the same minute cannot double-fire.
pub async fn poll_routines_once(
    database: &Database,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
    last_minute: &mut Option<String>,
) -> Result<usize> {
    let minute = temporal::current_minute(now);
    if last_minute.as_deref() == Some(minute.as_str()) {
        return Ok(0);
    }

    let routines = database.routines_active_at_minute(&minute).await?;
    // Latch only after a successful read so a failed cycle can retry the
    // same minute.
    *last_minute = Some(minute);

    let mut fired = 0;
    for routine in routines {
        let text = format!("🔄 Routine check: time to {}!", routine.task_name);
        match notifier.send(&routine.phone, &text).await {
            Ok(()) => fired += 1,
            Err(e) => warn!("routine {} delivery failed: {e:#}", routine.id),
        }
    }
    Ok(fired)
}

/// One event tick: announce every stored event whose month and day match
/// today in IST (year ignored). Runs once per day, so each event fires at
/// most once per year.
pub async fn poll_events_once(
    database: &Database,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> Result<usize> {
    let events = database.all_events().await?;
    let mut fired = 0;

    for event in events {
        if !temporal::matches_month_day(&event.event_date, now) {
            continue;
        }
        let text = format!(
            "🎉 Hey! Just a heads up: today is {}'s {}!",
            event.person_name, event.event_type
        );
        match notifier.send(&event.phone, &text).await {
            Ok(()) => fired += 1,
            Err(e) => warn!("event {} delivery failed: {e:#}", event.id),
        }
    }
    Ok(fired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Mutex;

    /// Notifier double that records deliveries and can be told to fail.
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        failing: Mutex<bool>,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            RecordingNotifier {
                sent: Mutex::new(Vec::new()),
                failing: Mutex::new(false),
            }
        }

        fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, destination: &str, text: &str) -> Result<()> {
            if *self.failing.lock().unwrap() {
                bail!("network down");
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), text.to_string()));
            Ok(())
        }
    }

    async fn fresh() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 9, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_due_reminder_fires_once_and_completes() {
        let db = fresh().await;
        let notifier = RecordingNotifier::new();
        let now = at(12, 0);
        db.add_reminder("91x", "check logs", now - ChronoDuration::seconds(1), None)
            .await
            .unwrap();

        assert_eq!(poll_reminders_once(&db, &notifier, now).await.unwrap(), 1);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "91x");
        assert!(sent[0].1.contains("check logs"));

        // Immediate second run: the item is completed, nothing fires.
        assert_eq!(poll_reminders_once(&db, &notifier, now).await.unwrap(), 0);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_future_reminder_does_not_fire() {
        let db = fresh().await;
        let notifier = RecordingNotifier::new();
        let now = at(12, 0);
        db.add_reminder("91x", "later", now + ChronoDuration::minutes(3), None)
            .await
            .unwrap();

        assert_eq!(poll_reminders_once(&db, &notifier, now).await.unwrap(), 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_leaves_reminder_pending() {
        let db = fresh().await;
        let notifier = RecordingNotifier::new();
        let now = at(12, 0);
        db.add_reminder("91x", "retry me", now - ChronoDuration::minutes(1), None)
            .await
            .unwrap();

        notifier.set_failing(true);
        assert_eq!(poll_reminders_once(&db, &notifier, now).await.unwrap(), 0);

        // Next cycle, network back: the same reminder is retried.
        notifier.set_failing(false);
        assert_eq!(poll_reminders_once(&db, &notifier, now).await.unwrap(), 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_one_bad_item_does_not_abort_the_cycle() {
        let db = fresh().await;
        let notifier = RecordingNotifier::new();
        let now = at(12, 0);
        db.add_reminder("91x", "first", now - ChronoDuration::minutes(2), None)
            .await
            .unwrap();
        db.add_reminder("91y", "second", now - ChronoDuration::minutes(1), None)
            .await
            .unwrap();

        // Both deliveries fail this cycle but the loop still visits both.
        notifier.set_failing(true);
        assert_eq!(poll_reminders_once(&db, &notifier, now).await.unwrap(), 0);
        notifier.set_failing(false);
        assert_eq!(poll_reminders_once(&db, &notifier, now).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_routine_fires_on_exact_minute() {
        let db = fresh().await;
        let notifier = RecordingNotifier::new();
        db.add_routine("91x", "take medicine", "14:07:00").await.unwrap();

        // 08:37 UTC == 14:07 IST.
        let mut latch = None;
        let fired = poll_routines_once(&db, &notifier, at(8, 37), &mut latch)
            .await
            .unwrap();
        assert_eq!(fired, 1);
        assert!(notifier.sent()[0].1.contains("take medicine"));

        // A minute later, nothing matches.
        let fired = poll_routines_once(&db, &notifier, at(8, 38), &mut latch)
            .await
            .unwrap();
        assert_eq!(fired, 0);
    }

    #[tokio::test]
    async fn test_routine_same_minute_latch_prevents_double_fire() {
        let db = fresh().await;
        let notifier = RecordingNotifier::new();
        db.add_routine("91x", "stretch", "14:07:00").await.unwrap();

        let mut latch = None;
        // Two ticks landing in the same wall-clock minute (drift, slow
        // prior tick): only the first may fire.
        assert_eq!(
            poll_routines_once(&db, &notifier, at(8, 37), &mut latch).await.unwrap(),
            1
        );
        assert_eq!(
            poll_routines_once(&db, &notifier, at(8, 37), &mut latch).await.unwrap(),
            0
        );
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_routine_fires_again_next_day() {
        let db = fresh().await;
        let notifier = RecordingNotifier::new();
        db.add_routine("91x", "journal", "14:07:00").await.unwrap();

        let mut latch = None;
        let today = at(8, 37);
        let tomorrow = today + ChronoDuration::days(1);
        assert_eq!(
            poll_routines_once(&db, &notifier, today, &mut latch).await.unwrap(),
            1
        );
        assert_eq!(
            poll_routines_once(&db, &notifier, tomorrow, &mut latch).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_event_round_trip_fires_on_month_day_any_year() {
        let db = fresh().await;
        let notifier = RecordingNotifier::new();
        db.add_event("91x", "manu", "birthday", "2026-02-09").await.unwrap();

        // Feb 9 of a later year, 06:00 UTC (11:30 IST).
        let feb9_2031 = Utc.with_ymd_and_hms(2031, 2, 9, 6, 0, 0).unwrap();
        assert_eq!(poll_events_once(&db, &notifier, feb9_2031).await.unwrap(), 1);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("manu"));
        assert!(sent[0].1.contains("birthday"));

        // The next day, nothing fires.
        let feb10 = Utc.with_ymd_and_hms(2031, 2, 10, 6, 0, 0).unwrap();
        assert_eq!(poll_events_once(&db, &notifier, feb10).await.unwrap(), 0);
    }
}
