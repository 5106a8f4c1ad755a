//! Ledger operations.
//!
//! All balance mutations for a single user are linearized by a per-user
//! lock: load, check, mutate, and the atomic account+transaction write all
//! happen with the lock held, so two concurrent deductions can never both
//! pass the balance check. Locks are per user; cross-user operations never
//! contend.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use dashmap::DashMap;

use atelier_core::{AccountBalance, LedgerTransaction, Tier, TransactionId, UserId};
use atelier_store::{LedgerStore, StoreError};

use crate::clock::Clock;

/// Outcome of a deduction attempt.
///
/// Running out of credits is an expected business outcome, not an error:
/// callers match on this type, while `StoreError` stays reserved for
/// infrastructure failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductOutcome {
    /// The deduction was applied.
    Applied {
        /// Balance after the deduction.
        remaining: i64,
        /// The audit record written for it.
        transaction_id: TransactionId,
    },

    /// The balance could not cover the amount; nothing was changed.
    InsufficientFunds {
        /// Current balance.
        balance: i64,
        /// How many credits short the balance is.
        shortfall: i64,
    },
}

/// Balance operations over a [`LedgerStore`].
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl Ledger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self {
            store,
            clock,
            tz,
            locks: DashMap::new(),
        }
    }

    /// Current balance for a user.
    ///
    /// First access creates the account and grants the tier's monthly
    /// allowance; an account whose last reset falls in an earlier month
    /// receives the allowance for the current month first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn balance(&self, user_id: &UserId, tier: Tier) -> Result<i64, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = acquire(&lock)?;
        Ok(self.load_or_init(user_id, tier)?.balance)
    }

    /// Atomically check and deduct `amount` credits.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails. An uncoverable
    /// amount is reported through [`DeductOutcome::InsufficientFunds`], not
    /// an error.
    pub fn deduct(
        &self,
        user_id: &UserId,
        tier: Tier,
        amount: i64,
        feature: &str,
        reason: &str,
    ) -> Result<DeductOutcome, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = acquire(&lock)?;

        let mut account = self.load_or_init(user_id, tier)?;
        if !account.has_sufficient_credits(amount) {
            return Ok(DeductOutcome::InsufficientFunds {
                balance: account.balance,
                shortfall: amount - account.balance,
            });
        }

        let tx = LedgerTransaction::deduct(
            *user_id,
            feature,
            amount,
            account.balance,
            reason.to_owned(),
        );
        account.balance = tx.balance_after;
        account.updated_at = self.clock.now();
        self.store.apply(&account, &tx)?;

        tracing::debug!(user = %user_id, feature, amount, remaining = account.balance, "deducted credits");
        Ok(DeductOutcome::Applied {
            remaining: account.balance,
            transaction_id: tx.id,
        })
    }

    /// Return `amount` credits to a user.
    ///
    /// Refunds are never rejected for business reasons; only a storage
    /// failure can stop one, and callers treat that as a high-severity
    /// event.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails, or `NotFound` if
    /// the account does not exist (a refund always follows a deduction, so
    /// the account must).
    pub fn refund(
        &self,
        user_id: &UserId,
        amount: i64,
        feature: Option<&str>,
        reason: &str,
    ) -> Result<i64, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = acquire(&lock)?;

        let mut account = self
            .store
            .get_account(user_id)?
            .ok_or(StoreError::NotFound)?;

        let tx = LedgerTransaction::refund(
            *user_id,
            feature,
            amount,
            account.balance,
            reason.to_owned(),
        );
        account.balance = tx.balance_after;
        account.updated_at = self.clock.now();
        self.store.apply(&account, &tx)?;

        tracing::debug!(user = %user_id, amount, balance = account.balance, "refunded credits");
        Ok(account.balance)
    }

    /// Grant `amount` credits (admin top-up).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn grant(
        &self,
        user_id: &UserId,
        tier: Tier,
        amount: i64,
        reason: &str,
    ) -> Result<i64, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = acquire(&lock)?;

        let mut account = self.load_or_init(user_id, tier)?;
        let tx = LedgerTransaction::grant(*user_id, amount, account.balance, reason.to_owned());
        account.balance = tx.balance_after;
        account.updated_at = self.clock.now();
        self.store.apply(&account, &tx)?;

        Ok(account.balance)
    }

    /// Audit trail for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn history(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>, StoreError> {
        self.store.list_transactions(user_id, limit, offset)
    }

    /// Today's date in the reporting timezone.
    fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.tz).date_naive()
    }

    /// Load the account, creating it (with the initial allowance grant) on
    /// first access and applying the monthly allowance reset when the month
    /// has rolled over. Callers must hold the user lock.
    fn load_or_init(&self, user_id: &UserId, tier: Tier) -> Result<AccountBalance, StoreError> {
        let today = self.today();
        let now = self.clock.now();

        let Some(mut account) = self.store.get_account(user_id)? else {
            let mut account = AccountBalance::new(*user_id, today, now);
            let tx = LedgerTransaction::grant(
                *user_id,
                tier.monthly_allowance(),
                0,
                format!("initial {tier} allowance"),
            );
            account.balance = tx.balance_after;
            self.store.apply(&account, &tx)?;
            tracing::info!(user = %user_id, %tier, balance = account.balance, "account created");
            return Ok(account);
        };

        if month_of(account.last_reset) < month_of(today) {
            let tx = LedgerTransaction::reset(
                *user_id,
                tier.monthly_allowance(),
                account.balance,
                tier.as_str(),
            );
            account.balance = tx.balance_after;
            account.last_reset = today;
            account.updated_at = now;
            self.store.apply(&account, &tx)?;
            tracing::info!(user = %user_id, %tier, balance = account.balance, "monthly allowance granted");
        }

        Ok(account)
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

fn month_of(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    use atelier_core::TransactionKind;
    use atelier_store::MemoryStore;

    use crate::clock::ManualClock;

    fn june_noon() -> DateTime<Utc> {
        // 2025-06-01 08:00 Eastern
        "2025-06-01T12:00:00Z".parse().unwrap()
    }

    fn test_ledger() -> (Ledger, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(june_noon()));
        let ledger = Ledger::new(
            store.clone(),
            clock.clone(),
            chrono_tz::America::New_York,
        );
        (ledger, store, clock)
    }

    #[test]
    fn first_access_grants_allowance() {
        let (ledger, _store, _clock) = test_ledger();
        let user = UserId::generate();

        let balance = ledger.balance(&user, Tier::Bronze).unwrap();
        assert_eq!(balance, Tier::Bronze.monthly_allowance());

        let history = ledger.history(&user, 10, 0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Grant);
    }

    #[test]
    fn deduct_and_refund_are_symmetric() {
        let (ledger, _store, _clock) = test_ledger();
        let user = UserId::generate();
        let start = ledger.balance(&user, Tier::Bronze).unwrap();

        let outcome = ledger
            .deduct(&user, Tier::Bronze, 7, "tarot", "tarot draw")
            .unwrap();
        assert!(matches!(outcome, DeductOutcome::Applied { remaining, .. } if remaining == start - 7));

        let balance = ledger
            .refund(&user, 7, Some("tarot"), "tarot draw failed")
            .unwrap();
        assert_eq!(balance, start);

        // Two records, newest first, chaining correctly.
        let history = ledger.history(&user, 2, 0).unwrap();
        assert_eq!(history[0].kind, TransactionKind::Refund);
        assert_eq!(history[1].kind, TransactionKind::Deduct);
        assert_eq!(history[0].balance_before, history[1].balance_after);
        assert_eq!(history[0].balance_after, start);
        assert!(history.iter().all(LedgerTransaction::is_consistent));
    }

    #[test]
    fn deduct_rejects_when_short() {
        let (ledger, _store, _clock) = test_ledger();
        let user = UserId::generate();
        let start = ledger.balance(&user, Tier::Bronze).unwrap();

        let outcome = ledger
            .deduct(&user, Tier::Bronze, start + 1, "story", "long story")
            .unwrap();
        assert_eq!(
            outcome,
            DeductOutcome::InsufficientFunds {
                balance: start,
                shortfall: 1
            }
        );

        // No record was written for the rejected attempt.
        let history = ledger.history(&user, 10, 0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(ledger.balance(&user, Tier::Bronze).unwrap(), start);
    }

    #[test]
    fn concurrent_deducts_never_go_negative() {
        let (ledger, _store, _clock) = test_ledger();
        let user = UserId::generate();

        // Bronze allowance is 100; 8 credits a call supports at most 12.
        ledger.balance(&user, Tier::Bronze).unwrap();

        let applied = std::sync::atomic::AtomicU32::new(0);
        std::thread::scope(|scope| {
            for _ in 0..20 {
                scope.spawn(|| {
                    let outcome = ledger
                        .deduct(&user, Tier::Bronze, 8, "decoder", "dream decoding")
                        .unwrap();
                    if matches!(outcome, DeductOutcome::Applied { .. }) {
                        applied.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(applied.load(std::sync::atomic::Ordering::SeqCst), 12);
        assert_eq!(ledger.balance(&user, Tier::Bronze).unwrap(), 4);
    }

    #[test]
    fn month_rollover_grants_allowance_once() {
        let (ledger, _store, clock) = test_ledger();
        let user = UserId::generate();

        ledger.balance(&user, Tier::Silver).unwrap();
        ledger
            .deduct(&user, Tier::Silver, 400, "story", "novellas")
            .unwrap();

        // Into July (reporting timezone).
        clock.advance(Duration::days(31));

        let balance = ledger.balance(&user, Tier::Silver).unwrap();
        assert_eq!(balance, 100 + Tier::Silver.monthly_allowance());

        // A second read in the same month must not grant again.
        assert_eq!(ledger.balance(&user, Tier::Silver).unwrap(), balance);
    }

    #[test]
    fn refund_without_account_is_not_found() {
        let (ledger, _store, _clock) = test_ledger();
        let user = UserId::generate();

        assert!(matches!(
            ledger.refund(&user, 5, None, "stray refund"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn storage_failure_propagates() {
        let (ledger, store, _clock) = test_ledger();
        let user = UserId::generate();
        ledger.balance(&user, Tier::Bronze).unwrap();

        store.set_failing(true);
        assert!(matches!(
            ledger.deduct(&user, Tier::Bronze, 5, "decoder", "dream decoding"),
            Err(StoreError::Database(_))
        ));
    }
}
