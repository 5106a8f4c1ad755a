//! Error types for Atelier storage.
//!
//! The store layer reports infrastructure failures only. Business outcomes
//! such as insufficient funds belong to the ledger operations above it, so
//! callers can statically tell "the database is down" from "the user is out
//! of credits".

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,
}
