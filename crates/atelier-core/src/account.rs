//! Account balance and subscription tier types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

// ============================================================================
// Constants
// ============================================================================

/// Bronze tier monthly credit allowance.
pub const BRONZE_MONTHLY_ALLOWANCE: i64 = 100;

/// Silver tier monthly credit allowance.
pub const SILVER_MONTHLY_ALLOWANCE: i64 = 500;

/// Gold tier monthly credit allowance.
pub const GOLD_MONTHLY_ALLOWANCE: i64 = 2000;

/// A user's spendable credit pool.
///
/// The balance is a non-negative integer at all observable points: any
/// operation that would make it negative must fail without applying. The
/// account row is derived state; every mutation also appends a
/// [`LedgerTransaction`](crate::LedgerTransaction) to the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    /// The user this pool belongs to.
    pub user_id: UserId,

    /// Current credit balance. Never negative.
    pub balance: i64,

    /// Date (in the reporting timezone) of the last monthly allowance grant.
    pub last_reset: NaiveDate,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    /// Create a new account with zero balance.
    ///
    /// The initial allowance grant is a separate ledger operation so that it
    /// shows up in the audit trail like any other mutation.
    #[must_use]
    pub fn new(user_id: UserId, today: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: 0,
            last_reset: today,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the account can cover a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

/// Subscription tier determining monthly allowance and daily caps.
///
/// The tier is resolved by the surrounding auth/session layer and passed in
/// with each request; it is not stored on the account row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Entry tier: small monthly allowance, tight daily caps.
    Bronze,

    /// Mid tier: larger allowance, relaxed caps.
    Silver,

    /// Top tier: largest allowance, most features uncapped.
    Gold,
}

impl Tier {
    /// Monthly credit allowance granted on account creation and on each
    /// month rollover.
    #[must_use]
    pub const fn monthly_allowance(&self) -> i64 {
        match self {
            Self::Bronze => BRONZE_MONTHLY_ALLOWANCE,
            Self::Silver => SILVER_MONTHLY_ALLOWANCE,
            Self::Gold => GOLD_MONTHLY_ALLOWANCE,
        }
    }

    /// The tier name as a lowercase string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn new_account_has_zero_balance() {
        let account = AccountBalance::new(UserId::generate(), today(), Utc::now());
        assert_eq!(account.balance, 0);
        assert_eq!(account.last_reset, today());
    }

    #[test]
    fn account_sufficient_credits() {
        let mut account = AccountBalance::new(UserId::generate(), today(), Utc::now());
        account.balance = 10;

        assert!(account.has_sufficient_credits(5));
        assert!(account.has_sufficient_credits(10));
        assert!(!account.has_sufficient_credits(11));
    }

    #[test]
    fn tier_monthly_allowances() {
        assert_eq!(Tier::Bronze.monthly_allowance(), 100);
        assert_eq!(Tier::Silver.monthly_allowance(), 500);
        assert_eq!(Tier::Gold.monthly_allowance(), 2000);
    }

    #[test]
    fn tier_serde_is_snake_case() {
        assert_eq!(serde_json::to_string(&Tier::Bronze).unwrap(), "\"bronze\"");
        let parsed: Tier = serde_json::from_str("\"gold\"").unwrap();
        assert_eq!(parsed, Tier::Gold);
    }
}
