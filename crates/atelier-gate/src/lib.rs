//! Ledger operations, usage tracking, and credit enforcement for Atelier.
//!
//! This crate is the operational surface of the credit ledger:
//!
//! - [`Ledger`] — balance operations (deduct/refund/grant) with per-user
//!   linearizability and an append-only audit trail
//! - [`UsageTracker`] — per-day usage counting with tier caps and a single
//!   configurable reporting timezone
//! - [`CreditGate`] — the enforcement wrapper around async handlers:
//!   deduct before, refund on failure, annotate on success
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use atelier_core::{CostTable, Tier, UserId};
//! use atelier_gate::{CreditGate, GateConfig, Ledger, RequestContext, SystemClock, UsageTracker};
//! use atelier_store::MemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = GateConfig::default();
//! let tz = config.resolve_timezone();
//! let store = Arc::new(MemoryStore::new());
//! let clock = Arc::new(SystemClock);
//! let costs = Arc::new(CostTable::default());
//!
//! let gate = CreditGate::new(
//!     Ledger::new(store.clone(), clock.clone(), tz),
//!     UsageTracker::new(store, costs.clone(), clock, tz, config.retention_days),
//!     costs,
//! );
//!
//! let ctx = RequestContext::authenticated(UserId::generate(), Tier::Bronze);
//! let metered = gate
//!     .charge(&ctx, "tarot", || async { Ok::<_, String>("the tower") })
//!     .await
//!     .unwrap();
//! assert_eq!(metered.charged, 3);
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod usage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GateConfig, DEFAULT_REPORTING_TIMEZONE, DEFAULT_RETENTION_DAYS};
pub use error::GateError;
pub use gate::{CreditGate, Metered, RequestContext};
pub use ledger::{DeductOutcome, Ledger};
pub use usage::{DailyCheck, UsageTracker};
