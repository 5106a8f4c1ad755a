//! Core types for the Atelier credit ledger.
//!
//! This crate provides the foundational types used throughout the Atelier
//! metering platform:
//!
//! - **Identifiers**: `UserId`, `TransactionId`
//! - **Accounts**: `AccountBalance`, `Tier`
//! - **Ledger**: `LedgerTransaction`, `TransactionKind`
//! - **Usage**: `UsageCounter`
//! - **Costs**: `CostTable`, `FeatureCost`, `DailyLimit`
//!
//! # Artistic-Time Credits
//!
//! A credit is the spendable unit gating paid creative features. Balances
//! are stored as `i64` and are never allowed to go negative: every mutation
//! is recorded as an append-only [`LedgerTransaction`], and the newest
//! transaction's `balance_after` always equals the current account balance.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod costs;
pub mod ids;
pub mod ledger;
pub mod usage;

pub use account::{
    AccountBalance, Tier, BRONZE_MONTHLY_ALLOWANCE, GOLD_MONTHLY_ALLOWANCE,
    SILVER_MONTHLY_ALLOWANCE,
};
pub use costs::{CostTable, CostTableError, DailyLimit, FeatureCost};
pub use ids::{IdError, TransactionId, UserId};
pub use ledger::{LedgerTransaction, TransactionKind};
pub use usage::UsageCounter;
