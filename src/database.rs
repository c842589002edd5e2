//! SQLite persistence layer
//!
//! Single-file database behind a `Clone` handle. Every method takes the
//! connection lock, runs synchronous sqlite calls, and releases the lock
//! before returning — no lock is ever held across an `.await` elsewhere.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 2.0.0: Guarded reminder completion and atomic usage increment
//! - 1.1.0: Add interaction logs and special events
//! - 1.0.0: Initial implementation with reminders and contacts

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlite::{Connection, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A saved address-book entry.
#[derive(Debug, Clone)]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

/// A one-off reminder. `remind_at` is an absolute UTC instant; rows move
/// from `pending` to `completed` exactly once and are never re-evaluated.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: i64,
    pub phone: String,
    pub message: String,
    pub remind_at: DateTime<Utc>,
    pub group_name: Option<String>,
}

/// A daily recurring task keyed by wall-clock time-of-day (no date).
#[derive(Debug, Clone)]
pub struct Routine {
    pub id: i64,
    pub phone: String,
    pub task_name: String,
    /// "HH:MM:SS" in the home timezone.
    pub remind_time: String,
}

/// A yearly calendar event (birthday, anniversary). The stored year is
/// informational; matching ignores it.
#[derive(Debug, Clone)]
pub struct SpecialEvent {
    pub id: i64,
    pub phone: String,
    pub person_name: String,
    pub event_type: String,
    /// "YYYY-MM-DD".
    pub event_date: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL COLLATE NOCASE,
    phone TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reminders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phone TEXT NOT NULL,
    message TEXT NOT NULL,
    remind_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    group_name TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS daily_routines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phone TEXT NOT NULL,
    task_name TEXT NOT NULL,
    remind_time TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS special_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phone TEXT NOT NULL,
    person_name TEXT NOT NULL COLLATE NOCASE,
    event_type TEXT NOT NULL,
    event_date TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS api_usage (
    usage_date TEXT PRIMARY KEY,
    request_count INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS interaction_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_name TEXT NOT NULL,
    sender_phone TEXT NOT NULL,
    message TEXT NOT NULL,
    bot_response TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders (status, remind_at);
CREATE INDEX IF NOT EXISTS idx_routines_active ON daily_routines (is_active, remind_time);
";

/// Shared database handle. Cheap to clone; all clones use one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and ensure the schema.
    /// `":memory:"` gives an isolated throwaway database for tests.
    pub async fn new(path: &str) -> Result<Self> {
        let conn = sqlite::open(path).with_context(|| format!("failed to open database at {path}"))?;
        conn.execute(SCHEMA).context("failed to create database schema")?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // --- Contacts -----------------------------------------------------

    /// Case-insensitive contact lookup by name.
    pub async fn get_contact_by_name(&self, name: &str) -> Result<Option<Contact>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare("SELECT name, phone FROM contacts WHERE name = ? LIMIT 1")?;
        statement.bind((1, name))?;
        read_optional(&mut statement, |row| {
            Ok(Contact {
                name: row.read::<String, _>("name")?,
                phone: row.read::<String, _>("phone")?,
            })
        })
    }

    /// Contact lookup by phone number (caller identification).
    pub async fn get_contact_by_phone(&self, phone: &str) -> Result<Option<Contact>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare("SELECT name, phone FROM contacts WHERE phone = ? LIMIT 1")?;
        statement.bind((1, phone))?;
        read_optional(&mut statement, |row| {
            Ok(Contact {
                name: row.read::<String, _>("name")?,
                phone: row.read::<String, _>("phone")?,
            })
        })
    }

    /// All saved contact names, alphabetical.
    pub async fn list_contact_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare("SELECT name FROM contacts ORDER BY name")?;
        let mut names = Vec::new();
        while let State::Row = statement.next()? {
            names.push(statement.read::<String, _>("name")?);
        }
        Ok(names)
    }

    pub async fn add_contact(&self, name: &str, phone: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare("INSERT INTO contacts (name, phone) VALUES (?, ?)")?;
        statement.bind((1, name))?;
        statement.bind((2, phone))?;
        run_to_done(&mut statement)
    }

    // --- Reminders ----------------------------------------------------

    /// Store a new pending reminder; returns its id.
    pub async fn add_reminder(
        &self,
        phone: &str,
        message: &str,
        remind_at: DateTime<Utc>,
        group_name: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO reminders (phone, message, remind_at, status, group_name, created_at)
             VALUES (?, ?, ?, 'pending', ?, ?)",
        )?;
        statement.bind((1, phone))?;
        statement.bind((2, message))?;
        statement.bind((3, utc_string(remind_at).as_str()))?;
        statement.bind((4, group_name))?;
        statement.bind((5, utc_string(Utc::now()).as_str()))?;
        run_to_done(&mut statement)?;
        last_insert_id(&conn)
    }

    /// All pending reminders whose due instant is at or before `now`.
    pub async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, phone, message, remind_at, group_name FROM reminders
             WHERE status = 'pending' AND remind_at <= ? ORDER BY remind_at",
        )?;
        statement.bind((1, utc_string(now).as_str()))?;
        read_reminders(&mut statement)
    }

    /// Transition a reminder to `completed`, but only if it is still
    /// `pending`. Returns whether this call performed the transition, so a
    /// poller racing itself can tell it lost.
    pub async fn complete_reminder(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut statement = conn
            .prepare("UPDATE reminders SET status = 'completed' WHERE id = ? AND status = 'pending'")?;
        statement.bind((1, id))?;
        run_to_done(&mut statement)?;
        Ok(conn.change_count() > 0)
    }

    /// Pending reminders strictly after `now`, soonest first.
    pub async fn upcoming_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, phone, message, remind_at, group_name FROM reminders
             WHERE status = 'pending' AND remind_at > ? ORDER BY remind_at",
        )?;
        statement.bind((1, utc_string(now).as_str()))?;
        read_reminders(&mut statement)
    }

    /// Reminders (any status) due inside a half-open UTC window. Used for
    /// schedule queries where the window is one home-timezone day.
    pub async fn reminders_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, phone, message, remind_at, group_name FROM reminders
             WHERE remind_at >= ? AND remind_at < ? ORDER BY remind_at",
        )?;
        statement.bind((1, utc_string(start).as_str()))?;
        statement.bind((2, utc_string(end).as_str()))?;
        read_reminders(&mut statement)
    }

    /// Delete the first reminder whose message contains `pattern`; returns
    /// the deleted message for the confirmation reply.
    pub async fn delete_reminder_matching(&self, pattern: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let like = format!("%{pattern}%");
        let mut statement =
            conn.prepare("SELECT id, message FROM reminders WHERE message LIKE ? LIMIT 1")?;
        statement.bind((1, like.as_str()))?;
        let found = read_optional(&mut statement, |row| {
            Ok((row.read::<i64, _>("id")?, row.read::<String, _>("message")?))
        })?;
        let Some((id, message)) = found else {
            return Ok(None);
        };
        let mut delete = conn.prepare("DELETE FROM reminders WHERE id = ?")?;
        delete.bind((1, id))?;
        run_to_done(&mut delete)?;
        Ok(Some(message))
    }

    // --- Daily routines -----------------------------------------------

    pub async fn add_routine(&self, phone: &str, task_name: &str, remind_time: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO daily_routines (phone, task_name, remind_time, is_active) VALUES (?, ?, ?, 1)",
        )?;
        statement.bind((1, phone))?;
        statement.bind((2, task_name))?;
        statement.bind((3, remind_time))?;
        run_to_done(&mut statement)?;
        last_insert_id(&conn)
    }

    /// Active routines whose stored minute equals `minute` ("HH:MM"),
    /// exact equality on the minute, never a prefix match.
    pub async fn routines_active_at_minute(&self, minute: &str) -> Result<Vec<Routine>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, phone, task_name, remind_time FROM daily_routines
             WHERE is_active = 1 AND substr(remind_time, 1, 5) = ?",
        )?;
        statement.bind((1, minute))?;
        read_routines(&mut statement)
    }

    pub async fn list_active_routines(&self) -> Result<Vec<Routine>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, phone, task_name, remind_time FROM daily_routines
             WHERE is_active = 1 ORDER BY remind_time",
        )?;
        read_routines(&mut statement)
    }

    pub async fn delete_routine_matching(&self, pattern: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let like = format!("%{pattern}%");
        let mut statement =
            conn.prepare("SELECT id, task_name FROM daily_routines WHERE task_name LIKE ? LIMIT 1")?;
        statement.bind((1, like.as_str()))?;
        let found = read_optional(&mut statement, |row| {
            Ok((row.read::<i64, _>("id")?, row.read::<String, _>("task_name")?))
        })?;
        let Some((id, task_name)) = found else {
            return Ok(None);
        };
        let mut delete = conn.prepare("DELETE FROM daily_routines WHERE id = ?")?;
        delete.bind((1, id))?;
        run_to_done(&mut delete)?;
        Ok(Some(task_name))
    }

    // --- Special events -----------------------------------------------

    pub async fn add_event(
        &self,
        phone: &str,
        person_name: &str,
        event_type: &str,
        event_date: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO special_events (phone, person_name, event_type, event_date) VALUES (?, ?, ?, ?)",
        )?;
        statement.bind((1, phone))?;
        statement.bind((2, person_name))?;
        statement.bind((3, event_type))?;
        statement.bind((4, event_date))?;
        run_to_done(&mut statement)?;
        last_insert_id(&conn)
    }

    pub async fn all_events(&self) -> Result<Vec<SpecialEvent>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, phone, person_name, event_type, event_date FROM special_events
             ORDER BY event_date",
        )?;
        read_events(&mut statement)
    }

    /// Events stored for an exact calendar date ("YYYY-MM-DD").
    pub async fn events_on_date(&self, date: &str) -> Result<Vec<SpecialEvent>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, phone, person_name, event_type, event_date FROM special_events
             WHERE event_date = ?",
        )?;
        statement.bind((1, date))?;
        read_events(&mut statement)
    }

    /// Case-insensitive lookup of one event by person and type.
    pub async fn find_event(&self, person_name: &str, event_type: &str) -> Result<Option<SpecialEvent>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, phone, person_name, event_type, event_date FROM special_events
             WHERE person_name = ? AND event_type = ? LIMIT 1",
        )?;
        statement.bind((1, person_name))?;
        statement.bind((2, event_type))?;
        read_optional(&mut statement, read_event_row)
    }

    pub async fn delete_event_matching(&self, pattern: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let like = format!("%{pattern}%");
        let mut statement = conn
            .prepare("SELECT id, person_name FROM special_events WHERE person_name LIKE ? LIMIT 1")?;
        statement.bind((1, like.as_str()))?;
        let found = read_optional(&mut statement, |row| {
            Ok((row.read::<i64, _>("id")?, row.read::<String, _>("person_name")?))
        })?;
        let Some((id, person_name)) = found else {
            return Ok(None);
        };
        let mut delete = conn.prepare("DELETE FROM special_events WHERE id = ?")?;
        delete.bind((1, id))?;
        run_to_done(&mut delete)?;
        Ok(Some(person_name))
    }

    // --- API usage counter --------------------------------------------

    /// Check-and-increment the primary-provider counter for `day_key`.
    ///
    /// The row is created lazily at zero, then a single guarded UPDATE
    /// increments only while the count is below `ceiling`. Both statements
    /// run under the one connection lock, so concurrent callers observe a
    /// serialized check-then-increment. Returns `(allowed, remaining)`.
    pub async fn try_consume_usage(&self, day_key: &str, ceiling: u32) -> Result<(bool, u32)> {
        let conn = self.conn.lock().await;

        let mut insert = conn
            .prepare("INSERT OR IGNORE INTO api_usage (usage_date, request_count) VALUES (?, 0)")?;
        insert.bind((1, day_key))?;
        run_to_done(&mut insert)?;

        let mut update = conn.prepare(
            "UPDATE api_usage SET request_count = request_count + 1
             WHERE usage_date = ? AND request_count < ?",
        )?;
        update.bind((1, day_key))?;
        update.bind((2, i64::from(ceiling)))?;
        run_to_done(&mut update)?;
        let allowed = conn.change_count() > 0;

        if !allowed {
            return Ok((false, 0));
        }

        let mut select =
            conn.prepare("SELECT request_count FROM api_usage WHERE usage_date = ?")?;
        select.bind((1, day_key))?;
        let count = match select.next()? {
            State::Row => select.read::<i64, _>(0)?,
            State::Done => 0,
        };
        Ok((true, ceiling.saturating_sub(count as u32)))
    }

    // --- Interaction log ----------------------------------------------

    /// Record both sides of a conversation turn.
    pub async fn log_interaction(
        &self,
        sender_name: &str,
        sender_phone: &str,
        message: &str,
        bot_response: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO interaction_logs (sender_name, sender_phone, message, bot_response, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )?;
        statement.bind((1, sender_name))?;
        statement.bind((2, sender_phone))?;
        statement.bind((3, message))?;
        statement.bind((4, bot_response))?;
        statement.bind((5, utc_string(Utc::now()).as_str()))?;
        run_to_done(&mut statement)
    }
}

/// Fixed-width RFC 3339 UTC ("...Z", whole seconds) so lexicographic string
/// comparison in SQL matches chronological order.
fn utc_string(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn run_to_done(statement: &mut Statement) -> Result<()> {
    while let State::Row = statement.next()? {}
    Ok(())
}

fn last_insert_id(conn: &Connection) -> Result<i64> {
    let mut statement = conn.prepare("SELECT last_insert_rowid()")?;
    match statement.next()? {
        State::Row => Ok(statement.read::<i64, _>(0)?),
        State::Done => Ok(0),
    }
}

fn read_optional<T>(
    statement: &mut Statement,
    read: impl FnOnce(&Statement) -> Result<T>,
) -> Result<Option<T>> {
    match statement.next()? {
        State::Row => Ok(Some(read(statement)?)),
        State::Done => Ok(None),
    }
}

fn read_reminders(statement: &mut Statement) -> Result<Vec<Reminder>> {
    let mut out = Vec::new();
    while let State::Row = statement.next()? {
        let remind_at = statement.read::<String, _>("remind_at")?;
        out.push(Reminder {
            id: statement.read::<i64, _>("id")?,
            phone: statement.read::<String, _>("phone")?,
            message: statement.read::<String, _>("message")?,
            remind_at: DateTime::parse_from_rfc3339(&remind_at)
                .with_context(|| format!("invalid reminder timestamp {remind_at}"))?
                .with_timezone(&Utc),
            group_name: statement.read::<Option<String>, _>("group_name")?,
        });
    }
    Ok(out)
}

fn read_routines(statement: &mut Statement) -> Result<Vec<Routine>> {
    let mut out = Vec::new();
    while let State::Row = statement.next()? {
        out.push(Routine {
            id: statement.read::<i64, _>("id")?,
            phone: statement.read::<String, _>("phone")?,
            task_name: statement.read::<String, _>("task_name")?,
            remind_time: statement.read::<String, _>("remind_time")?,
        });
    }
    Ok(out)
}

fn read_event_row(statement: &Statement) -> Result<SpecialEvent> {
    Ok(SpecialEvent {
        id: statement.read::<i64, _>("id")?,
        phone: statement.read::<String, _>("phone")?,
        person_name: statement.read::<String, _>("person_name")?,
        event_type: statement.read::<String, _>("event_type")?,
        event_date: statement.read::<String, _>("event_date")?,
    })
}

fn read_events(statement: &mut Statement) -> Result<Vec<SpecialEvent>> {
    let mut out = Vec::new();
    while let State::Row = statement.next()? {
        out.push(read_event_row(statement)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn fresh() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 9, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_contact_lookup_is_case_insensitive() {
        let db = fresh().await;
        db.add_contact("Manu", "911234567890").await.unwrap();

        let contact = db.get_contact_by_name("manu").await.unwrap().unwrap();
        assert_eq!(contact.phone, "911234567890");
        assert!(db.get_contact_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_due_reminders_selects_only_pending_past_due() {
        let db = fresh().await;
        let now = at(12, 0);
        db.add_reminder("91x", "overdue", now - Duration::seconds(1), None)
            .await
            .unwrap();
        db.add_reminder("91x", "future", now + Duration::minutes(5), None)
            .await
            .unwrap();
        let done = db
            .add_reminder("91x", "already done", now - Duration::minutes(5), None)
            .await
            .unwrap();
        assert!(db.complete_reminder(done).await.unwrap());

        let due = db.due_reminders(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].message, "overdue");
    }

    #[tokio::test]
    async fn test_complete_reminder_is_guarded() {
        let db = fresh().await;
        let id = db
            .add_reminder("91x", "water the plants", at(9, 0), Some("Manu"))
            .await
            .unwrap();

        assert!(db.complete_reminder(id).await.unwrap());
        // The second transition must report that it did nothing.
        assert!(!db.complete_reminder(id).await.unwrap());
        assert!(db.due_reminders(at(23, 59)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reminders_between_window_is_half_open() {
        let db = fresh().await;
        db.add_reminder("91x", "inside", at(10, 0), None).await.unwrap();
        db.add_reminder("91x", "at end", at(12, 0), None).await.unwrap();

        let rows = db.reminders_between(at(9, 0), at(12, 0)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "inside");
    }

    #[tokio::test]
    async fn test_routines_match_exact_minute_only() {
        let db = fresh().await;
        db.add_routine("91x", "take medicine", "09:00:00").await.unwrap();
        db.add_routine("91x", "late task", "09:01:00").await.unwrap();

        let hits = db.routines_active_at_minute("09:00").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].task_name, "take medicine");
        assert!(db.routines_active_at_minute("09:0").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_find_ignores_name_case() {
        let db = fresh().await;
        db.add_event("91x", "Manu", "birthday", "2026-02-09").await.unwrap();

        let event = db.find_event("manu", "birthday").await.unwrap().unwrap();
        assert_eq!(event.event_date, "2026-02-09");
        assert!(db.find_event("manu", "anniversary").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_usage_counter_enforces_ceiling() {
        let db = fresh().await;
        let day = "2026-02-09";

        // Exactly the first `ceiling` consumes are allowed.
        assert_eq!(db.try_consume_usage(day, 3).await.unwrap(), (true, 2));
        assert_eq!(db.try_consume_usage(day, 3).await.unwrap(), (true, 1));
        assert_eq!(db.try_consume_usage(day, 3).await.unwrap(), (true, 0));
        assert_eq!(db.try_consume_usage(day, 3).await.unwrap(), (false, 0));

        // A new day starts from zero.
        assert_eq!(db.try_consume_usage("2026-02-10", 3).await.unwrap(), (true, 2));
    }

    #[tokio::test]
    async fn test_usage_counter_zero_ceiling_denies_everything() {
        let db = fresh().await;
        assert_eq!(db.try_consume_usage("2026-02-09", 0).await.unwrap(), (false, 0));
    }

    #[tokio::test]
    async fn test_delete_matching_returns_what_was_removed() {
        let db = fresh().await;
        db.add_reminder("91x", "drink water at noon", at(6, 30), None)
            .await
            .unwrap();
        db.add_routine("91x", "morning walk", "06:00:00").await.unwrap();

        let removed = db.delete_reminder_matching("drink water").await.unwrap();
        assert_eq!(removed.as_deref(), Some("drink water at noon"));
        assert!(db.delete_reminder_matching("drink water").await.unwrap().is_none());

        let removed = db.delete_routine_matching("walk").await.unwrap();
        assert_eq!(removed.as_deref(), Some("morning walk"));
        assert!(db.list_active_routines().await.unwrap().is_empty());
    }
}
