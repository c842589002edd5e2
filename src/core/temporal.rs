//! Temporal normalization in the bot's home timezone
//!
//! All wall-clock interpretation happens in Indian Standard Time, a fixed
//! UTC+05:30 offset with no daylight-saving transitions. Nothing here may
//! consult the host timezone.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.4.0
//!
//! ## Changelog
//! - 1.1.0: Add month/day event matching and display formatting
//! - 1.0.0: Initial implementation with due-instant computation

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};

/// IST offset from UTC in seconds (+05:30).
const IST_OFFSET_SECONDS: i32 = 5 * 3600 + 30 * 60;

/// The fixed home timezone for all wall-clock math.
pub fn home_zone() -> FixedOffset {
    // Statically valid: 19800 is within chrono's +/-24h bound.
    FixedOffset::east_opt(IST_OFFSET_SECONDS).expect("IST offset is a valid fixed offset")
}

/// Compute the next absolute instant at which `time_of_day` occurs in IST.
///
/// The time-of-day is anchored to the current IST calendar date; if that
/// instant is not strictly after `now`, it rolls forward by exactly one
/// day. The result is therefore always in `(now, now + 24h]`.
pub fn to_due_instant(time_of_day: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let local_now = now.with_timezone(&home_zone());
    let local_candidate = local_now.date_naive().and_time(time_of_day);

    // Fixed offset, so conversion back to UTC is plain arithmetic and
    // cannot be ambiguous the way a DST zone would be.
    let mut candidate = DateTime::<Utc>::from_naive_utc_and_offset(
        local_candidate - Duration::seconds(i64::from(IST_OFFSET_SECONDS)),
        Utc,
    );

    if candidate <= now {
        candidate += Duration::days(1);
    }
    candidate
}

/// Today's calendar-day key in IST, e.g. "2026-02-09".
pub fn today_key(now: DateTime<Utc>) -> String {
    now.with_timezone(&home_zone()).format("%Y-%m-%d").to_string()
}

/// The current IST wall-clock minute, e.g. "09:05".
pub fn current_minute(now: DateTime<Utc>) -> String {
    now.with_timezone(&home_zone()).format("%H:%M").to_string()
}

/// Parse a wall-clock time-of-day as exchanged at the intent boundary.
///
/// Accepts "HH:MM:SS" and the shorter "HH:MM".
pub fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

/// The UTC half-open window covering one IST calendar day, for range
/// queries over stored instants. `None` if `date` is not "YYYY-MM-DD".
pub fn day_window(date: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let local_start = day.and_time(NaiveTime::MIN);
    let start = DateTime::<Utc>::from_naive_utc_and_offset(
        local_start - Duration::seconds(i64::from(IST_OFFSET_SECONDS)),
        Utc,
    );
    Some((start, start + Duration::days(1)))
}

/// Whether a stored "YYYY-MM-DD" event date falls on today's IST month and
/// day. The stored year is informational only (birthdays recur).
pub fn matches_month_day(event_date: &str, now: DateTime<Utc>) -> bool {
    let Ok(date) = NaiveDate::parse_from_str(event_date, "%Y-%m-%d") else {
        return false;
    };
    let local = now.with_timezone(&home_zone());
    date.month() == local.month() && date.day() == local.day()
}

/// Format an instant for user-facing replies, e.g. "Feb 9, 2:05 PM".
pub fn format_for_reply(instant: DateTime<Utc>) -> String {
    let local = instant.with_timezone(&home_zone());
    let (is_pm, hour12) = local.hour12();
    format!(
        "{} {}, {}:{:02} {}",
        local.format("%b"),
        local.day(),
        hour12,
        local.minute(),
        if is_pm { "PM" } else { "AM" }
    )
}
