//! Storage layer for the Atelier credit ledger.
//!
//! Two traits define all persistence: [`LedgerStore`] for the balance row
//! plus the append-only transaction log, and [`UsageStore`] for per-day
//! usage counters. All mutation of those tables goes through these traits —
//! no other component writes them directly, which is what lets the ledger
//! operations above enforce atomicity.
//!
//! Backends are selected at construction time; call sites never branch on
//! the storage flavor:
//!
//! - [`RocksStore`] — persistent RocksDB backend with column families, CBOR
//!   values, and atomic `WriteBatch` writes (feature `rocksdb-backend`,
//!   enabled by default).
//! - [`MemoryStore`] — in-memory backend for tests and embedding.
//!
//! # Example
//!
//! ```
//! use atelier_store::{LedgerStore, MemoryStore};
//! use atelier_core::UserId;
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//! assert!(store.get_account(&user_id).unwrap().is_none());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::NaiveDate;

use atelier_core::{AccountBalance, LedgerTransaction, TransactionId, UsageCounter, UserId};

/// Persistence for account balances and the transaction audit trail.
pub trait LedgerStore: Send + Sync {
    /// Get an account by user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<AccountBalance>>;

    /// Write the updated account row and append its audit transaction in
    /// one atomic unit.
    ///
    /// The transaction's `balance_after` is expected to equal the account's
    /// `balance`; the ledger operations layer constructs both together under
    /// a per-user lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn apply(&self, account: &AccountBalance, transaction: &LedgerTransaction) -> Result<()>;

    /// Get a transaction by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<LedgerTransaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>>;
}

/// Persistence for per-day usage counters.
pub trait UsageStore: Send + Sync {
    /// Get the counter for a `(user, feature, date)` triple.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_counter(
        &self,
        user_id: &UserId,
        feature: &str,
        date: NaiveDate,
    ) -> Result<Option<UsageCounter>>;

    /// Insert or replace a counter row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_counter(&self, counter: &UsageCounter) -> Result<()>;

    /// Delete counters for a user on a date. With a feature, deletes that
    /// one counter; without, deletes all of the user's counters for the
    /// date. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_counters(
        &self,
        user_id: &UserId,
        feature: Option<&str>,
        date: NaiveDate,
    ) -> Result<u64>;

    /// Delete all counters older than `cutoff` (exclusive), across users.
    /// Returns the number of rows removed.
    ///
    /// Counters are historical/analytical once their day has passed, so
    /// purging is safe.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn purge_before(&self, cutoff: NaiveDate) -> Result<u64>;
}
