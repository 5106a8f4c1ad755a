//! In-memory storage implementation.
//!
//! Used by tests and by embedders that do not need persistence. The store
//! can also be switched into a failing mode to exercise fail-closed paths
//! in the layers above.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;

use atelier_core::{AccountBalance, LedgerTransaction, TransactionId, UsageCounter, UserId};

use crate::error::{Result, StoreError};
use crate::{LedgerStore, UsageStore};

#[derive(Default)]
struct Inner {
    accounts: HashMap<UserId, AccountBalance>,
    transactions: HashMap<TransactionId, LedgerTransaction>,
    by_user: HashMap<UserId, Vec<TransactionId>>,
    usage: HashMap<(UserId, String, NaiveDate), UsageCounter>,
}

/// In-memory storage implementing both store traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failing mode. While enabled, every operation returns
    /// `StoreError::Database`, simulating an unavailable backend.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected failure".into()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("lock poisoned".into()))
    }
}

impl LedgerStore for MemoryStore {
    fn get_account(&self, user_id: &UserId) -> Result<Option<AccountBalance>> {
        self.check_available()?;
        Ok(self.lock()?.accounts.get(user_id).cloned())
    }

    fn apply(&self, account: &AccountBalance, transaction: &LedgerTransaction) -> Result<()> {
        self.check_available()?;
        let mut inner = self.lock()?;
        inner.accounts.insert(account.user_id, account.clone());
        inner
            .transactions
            .insert(transaction.id, transaction.clone());
        inner
            .by_user
            .entry(transaction.user_id)
            .or_default()
            .push(transaction.id);
        Ok(())
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<LedgerTransaction>> {
        self.check_available()?;
        Ok(self.lock()?.transactions.get(transaction_id).cloned())
    }

    fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        self.check_available()?;
        let inner = self.lock()?;
        let ids = inner.by_user.get(user_id).cloned().unwrap_or_default();

        // Insertion order is chronological; reverse for newest first.
        Ok(ids
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|id| inner.transactions.get(id).cloned())
            .collect())
    }
}

impl UsageStore for MemoryStore {
    fn get_counter(
        &self,
        user_id: &UserId,
        feature: &str,
        date: NaiveDate,
    ) -> Result<Option<UsageCounter>> {
        self.check_available()?;
        Ok(self
            .lock()?
            .usage
            .get(&(*user_id, feature.to_owned(), date))
            .cloned())
    }

    fn put_counter(&self, counter: &UsageCounter) -> Result<()> {
        self.check_available()?;
        self.lock()?.usage.insert(
            (counter.user_id, counter.feature.clone(), counter.usage_date),
            counter.clone(),
        );
        Ok(())
    }

    fn delete_counters(
        &self,
        user_id: &UserId,
        feature: Option<&str>,
        date: NaiveDate,
    ) -> Result<u64> {
        self.check_available()?;
        let mut inner = self.lock()?;
        let before = inner.usage.len();
        inner.usage.retain(|(uid, feat, d), _| {
            !(uid == user_id && *d == date && feature.map_or(true, |f| f == feat))
        });
        Ok((before - inner.usage.len()) as u64)
    }

    fn purge_before(&self, cutoff: NaiveDate) -> Result<u64> {
        self.check_available()?;
        let mut inner = self.lock()?;
        let before = inner.usage.len();
        inner.usage.retain(|(_, _, d), _| *d >= cutoff);
        let removed = (before - inner.usage.len()) as u64;
        tracing::debug!(removed, %cutoff, "purged stale usage counters");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn account_apply_and_get() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        let tx = LedgerTransaction::grant(user_id, 100, 0, "initial allowance".into());
        let mut account = AccountBalance::new(user_id, date(2025, 6, 1), Utc::now());
        account.balance = tx.balance_after;

        store.apply(&account, &tx).unwrap();

        assert_eq!(store.get_account(&user_id).unwrap().unwrap().balance, 100);
        assert_eq!(store.list_transactions(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn list_is_newest_first() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let mut account = AccountBalance::new(user_id, date(2025, 6, 1), Utc::now());

        let tx1 = LedgerTransaction::grant(user_id, 100, 0, "first".into());
        account.balance = tx1.balance_after;
        store.apply(&account, &tx1).unwrap();

        let tx2 = LedgerTransaction::deduct(user_id, "tarot", 3, 100, "second".into());
        account.balance = tx2.balance_after;
        store.apply(&account, &tx2).unwrap();

        let listed = store.list_transactions(&user_id, 10, 0).unwrap();
        assert_eq!(listed[0].reason, "second");
        assert_eq!(listed[1].reason, "first");
    }

    #[test]
    fn usage_counter_lifecycle() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let d = date(2025, 6, 1);

        store
            .put_counter(&UsageCounter::first(user_id, "decoder", d, Utc::now()))
            .unwrap();
        store
            .put_counter(&UsageCounter::first(user_id, "tarot", d, Utc::now()))
            .unwrap();

        assert_eq!(store.delete_counters(&user_id, Some("decoder"), d).unwrap(), 1);
        assert_eq!(store.delete_counters(&user_id, None, d).unwrap(), 1);
        assert!(store.get_counter(&user_id, "tarot", d).unwrap().is_none());
    }

    #[test]
    fn purge_respects_cutoff() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        store
            .put_counter(&UsageCounter::first(
                user_id,
                "decoder",
                date(2025, 4, 30),
                Utc::now(),
            ))
            .unwrap();
        store
            .put_counter(&UsageCounter::first(
                user_id,
                "decoder",
                date(2025, 5, 1),
                Utc::now(),
            ))
            .unwrap();

        assert_eq!(store.purge_before(date(2025, 5, 1)).unwrap(), 1);
    }

    #[test]
    fn failing_mode_errors_every_operation() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        store.set_failing(true);
        assert!(matches!(
            store.get_account(&user_id),
            Err(StoreError::Database(_))
        ));

        store.set_failing(false);
        assert!(store.get_account(&user_id).unwrap().is_none());
    }
}
