//! `RocksDB` storage implementation.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use atelier_core::{AccountBalance, LedgerTransaction, TransactionId, UsageCounter, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{LedgerStore, UsageStore};

/// RocksDB-backed storage implementing both store traits.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl LedgerStore for RocksStore {
    fn get_account(&self, user_id: &UserId) -> Result<Option<AccountBalance>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn apply(&self, account: &AccountBalance, transaction: &LedgerTransaction) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let account_key = keys::account_key(&account.user_id);
        let tx_key = keys::transaction_key(&transaction.id);
        let user_tx_key = keys::user_transaction_key(&transaction.user_id, &transaction.id);

        let account_value = Self::serialize(account)?;
        let tx_value = Self::serialize(transaction)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_accounts, &account_key, &account_value);
        batch.put_cf(&cf_tx, &tx_key, &tx_value);
        batch.put_cf(&cf_by_user, &user_tx_key, []); // Index entry (empty value)

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<LedgerTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        let key = keys::transaction_key(transaction_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // ULIDs are time-ordered, so the index range is oldest-to-newest.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }

        // Newest first.
        all_keys.reverse();

        let mut transactions = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }
            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }
}

impl UsageStore for RocksStore {
    fn get_counter(
        &self,
        user_id: &UserId,
        feature: &str,
        date: NaiveDate,
    ) -> Result<Option<UsageCounter>> {
        let cf = self.cf(cf::USAGE_COUNTERS)?;
        let key = keys::usage_counter_key(user_id, feature, date);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_counter(&self, counter: &UsageCounter) -> Result<()> {
        let cf = self.cf(cf::USAGE_COUNTERS)?;
        let key = keys::usage_counter_key(&counter.user_id, &counter.feature, counter.usage_date);
        let value = Self::serialize(counter)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn delete_counters(
        &self,
        user_id: &UserId,
        feature: Option<&str>,
        date: NaiveDate,
    ) -> Result<u64> {
        let cf = self.cf(cf::USAGE_COUNTERS)?;

        if let Some(feature) = feature {
            let key = keys::usage_counter_key(user_id, feature, date);
            let existed = self
                .db
                .get_cf(&cf, &key)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .is_some();
            if existed {
                self.db
                    .delete_cf(&cf, key)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
            return Ok(u64::from(existed));
        }

        let prefix = keys::usage_day_prefix(user_id, date);
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut batch = WriteBatch::default();
        let mut removed = 0u64;
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            batch.delete_cf(&cf, key);
            removed += 1;
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(removed)
    }

    fn purge_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let cf = self.cf(cf::USAGE_COUNTERS)?;
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        let mut batch = WriteBatch::default();
        let mut removed = 0u64;
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let Some(date) = keys::extract_usage_date(&key) else {
                continue;
            };
            if date < cutoff {
                batch.delete_cf(&cf, key);
                removed += 1;
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(removed, %cutoff, "purged stale usage counters");
        Ok(removed)
    }
}
