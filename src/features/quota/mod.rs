//! # Quota Feature
//!
//! Daily ceiling on primary-classifier calls. The count lives in the
//! database keyed by the IST calendar day and is only ever touched through
//! `try_consume`, which performs a serialized check-then-increment.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.5.0
//! - **Toggleable**: false

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::core::temporal;
use crate::database::Database;

/// Outcome of one quota consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    /// Whether the caller may spend one primary-provider call.
    pub allowed: bool,
    /// Calls left today after this one. Zero when denied.
    pub remaining: u32,
}

/// Owner of the per-day usage counter. Other components never see the raw
/// count, only allow/deny decisions.
#[derive(Clone)]
pub struct UsageLimiter {
    database: Database,
    ceiling: u32,
}

impl UsageLimiter {
    pub fn new(database: Database, ceiling: u32) -> Self {
        UsageLimiter { database, ceiling }
    }

    /// Try to spend one primary-provider call for today (IST).
    ///
    /// Storage failures propagate as errors; callers must treat an error
    /// the same as a denial and route to the fallback provider.
    pub async fn try_consume(&self) -> Result<QuotaDecision> {
        self.try_consume_at(Utc::now()).await
    }

    /// Same as [`try_consume`](Self::try_consume) with an explicit clock,
    /// so day-boundary behavior is testable.
    pub async fn try_consume_at(&self, now: DateTime<Utc>) -> Result<QuotaDecision> {
        let day_key = temporal::today_key(now);
        let (allowed, remaining) = self.database.try_consume_usage(&day_key, self.ceiling).await?;
        Ok(QuotaDecision { allowed, remaining })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn limiter(ceiling: u32) -> UsageLimiter {
        UsageLimiter::new(Database::new(":memory:").await.unwrap(), ceiling)
    }

    #[tokio::test]
    async fn test_allows_exactly_ceiling_calls_per_day() {
        let limiter = limiter(2).await;
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 10, 0, 0).unwrap();

        assert_eq!(
            limiter.try_consume_at(now).await.unwrap(),
            QuotaDecision { allowed: true, remaining: 1 }
        );
        assert_eq!(
            limiter.try_consume_at(now).await.unwrap(),
            QuotaDecision { allowed: true, remaining: 0 }
        );
        assert_eq!(
            limiter.try_consume_at(now).await.unwrap(),
            QuotaDecision { allowed: false, remaining: 0 }
        );
    }

    #[tokio::test]
    async fn test_resets_at_ist_day_boundary() {
        let limiter = limiter(1).await;
        // 18:00 UTC Feb 9 is 23:30 IST Feb 9; 19:00 UTC is 00:30 IST Feb 10.
        let before_midnight = Utc.with_ymd_and_hms(2026, 2, 9, 18, 0, 0).unwrap();
        let after_midnight = Utc.with_ymd_and_hms(2026, 2, 9, 19, 0, 0).unwrap();

        assert!(limiter.try_consume_at(before_midnight).await.unwrap().allowed);
        assert!(!limiter.try_consume_at(before_midnight).await.unwrap().allowed);
        // Same UTC day, new IST day: quota is fresh.
        assert!(limiter.try_consume_at(after_midnight).await.unwrap().allowed);
    }
}
