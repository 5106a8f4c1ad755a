//! Daily usage tracking.
//!
//! "Today" is computed in the single configured reporting timezone so every
//! user shares one reset instant. Counters live in the [`UsageStore`] keyed
//! by `(user, feature, date)`; a new day gets a new row.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;

use atelier_core::{CostTable, DailyLimit, Tier, UsageCounter, UserId};
use atelier_store::{StoreError, UsageStore};

use crate::clock::Clock;

/// Result of a daily-cap check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyCheck {
    /// Under the cap (or the combination is uncapped).
    Allowed,

    /// The cap is spent for today.
    Exhausted {
        /// The configured cap.
        limit: u32,
        /// Today's count.
        used: u32,
        /// When the next reporting day begins, in UTC.
        resets_at: DateTime<Utc>,
    },
}

/// Per-user, per-feature, per-day usage counting with tier caps.
pub struct UsageTracker {
    store: Arc<dyn UsageStore>,
    costs: Arc<CostTable>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    retention_days: u32,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl UsageTracker {
    /// Create a tracker over a store and cost table.
    #[must_use]
    pub fn new(
        store: Arc<dyn UsageStore>,
        costs: Arc<CostTable>,
        clock: Arc<dyn Clock>,
        tz: Tz,
        retention_days: u32,
    ) -> Self {
        Self {
            store,
            costs,
            clock,
            tz,
            retention_days,
            locks: DashMap::new(),
        }
    }

    /// Today's count for a feature, 0 when the user has not used it today.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn usage_today(&self, user_id: &UserId, feature: &str) -> Result<u32, StoreError> {
        Ok(self
            .store
            .get_counter(user_id, feature, self.today())?
            .map_or(0, |c| c.usage_count))
    }

    /// Count one successful use, creating today's row on first use.
    ///
    /// Returns the new count.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn record_usage(&self, user_id: &UserId, feature: &str) -> Result<u32, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = acquire(&lock)?;

        let today = self.today();
        let now = self.clock.now();
        let counter = match self.store.get_counter(user_id, feature, today)? {
            Some(mut counter) => {
                counter.increment(now);
                counter
            }
            None => UsageCounter::first(*user_id, feature, today, now),
        };
        self.store.put_counter(&counter)?;
        Ok(counter.usage_count)
    }

    /// Check the daily cap for a feature/tier combination.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn check(
        &self,
        user_id: &UserId,
        feature: &str,
        tier: Tier,
    ) -> Result<DailyCheck, StoreError> {
        match self.costs.daily_limit(feature, tier) {
            DailyLimit::Unlimited => Ok(DailyCheck::Allowed),
            DailyLimit::Limited(limit) => {
                let used = self.usage_today(user_id, feature)?;
                if used < limit {
                    Ok(DailyCheck::Allowed)
                } else {
                    Ok(DailyCheck::Exhausted {
                        limit,
                        used,
                        resets_at: self.next_reset(),
                    })
                }
            }
        }
    }

    /// Whether another use is allowed right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn can_use(&self, user_id: &UserId, feature: &str, tier: Tier) -> Result<bool, StoreError> {
        Ok(matches!(
            self.check(user_id, feature, tier)?,
            DailyCheck::Allowed
        ))
    }

    /// Administrative/test override: delete today's counter for one feature,
    /// or all of today's counters for the user. Returns the rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn reset_usage(&self, user_id: &UserId, feature: Option<&str>) -> Result<u64, StoreError> {
        self.store.delete_counters(user_id, feature, self.today())
    }

    /// Delete counters older than the retention window. Returns the rows
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn purge_stale(&self) -> Result<u64, StoreError> {
        let cutoff = self.today() - chrono::Duration::days(i64::from(self.retention_days));
        self.store.purge_before(cutoff)
    }

    /// Today's date in the reporting timezone.
    fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.tz).date_naive()
    }

    /// The next local midnight in the reporting timezone, as UTC.
    fn next_reset(&self) -> DateTime<Utc> {
        let today = self.today();
        let Some(tomorrow) = today.succ_opt() else {
            return self.clock.now();
        };
        let midnight = tomorrow.and_time(NaiveTime::MIN);
        self.tz
            .from_local_datetime(&midnight)
            .earliest()
            .map_or_else(
                || Utc.from_utc_datetime(&midnight),
                |local| local.with_timezone(&Utc),
            )
    }

    fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.locks
            .entry(*user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn acquire(lock: &Arc<Mutex<()>>) -> Result<MutexGuard<'_, ()>, StoreError> {
    lock.lock()
        .map_err(|_| StoreError::Database("user lock poisoned".into()))
}
