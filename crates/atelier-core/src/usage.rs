//! Per-day usage counters.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// How many times a user invoked a feature on one calendar day.
///
/// The day is a calendar date in the configured reporting timezone, not a
/// timestamp. There is at most one counter per `(user, feature, date)` and
/// `usage_count` only increases within that date; a new row is created once
/// the day boundary passes. Old rows are historical only and may be purged
/// after the retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageCounter {
    /// The user.
    pub user_id: UserId,

    /// The metered feature name.
    pub feature: String,

    /// Calendar date in the reporting timezone.
    pub usage_date: NaiveDate,

    /// Number of successful uses on `usage_date`.
    pub usage_count: u32,

    /// Timestamp of the most recent use.
    pub last_used_at: DateTime<Utc>,
}

impl UsageCounter {
    /// Create the first counter of the day with a count of one.
    #[must_use]
    pub fn first(user_id: UserId, feature: &str, usage_date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            feature: feature.to_owned(),
            usage_date,
            usage_count: 1,
            last_used_at: now,
        }
    }

    /// Record one more use.
    pub fn increment(&mut self, now: DateTime<Utc>) {
        self.usage_count += 1;
        self.last_used_at = now;
    }
}
