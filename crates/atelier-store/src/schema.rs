//! Column family definitions for the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Current balance rows, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Usage counters, keyed by `user_id || date || feature`.
    pub const USAGE_COUNTERS: &str = "usage_counters";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::USAGE_COUNTERS,
    ]
}
