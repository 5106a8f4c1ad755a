//! Ledger transaction types.
//!
//! Every balance mutation appends one immutable transaction record. The
//! records chain: `balance_after = balance_before ± amount` depending on the
//! kind, and the newest record's `balance_after` equals the current account
//! balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// An immutable audit record of one balance mutation.
///
/// Transactions use ULIDs for time-ordered ids and are never mutated or
/// deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique transaction id (ULID, time-ordered).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// What kind of mutation this was.
    pub kind: TransactionKind,

    /// The feature that triggered the mutation, when there is one.
    pub feature: Option<String>,

    /// Amount moved, always positive. The sign is implied by `kind`.
    pub amount: i64,

    /// Balance immediately before this transaction.
    pub balance_before: i64,

    /// Balance immediately after this transaction.
    pub balance_after: i64,

    /// Human-readable reason.
    pub reason: String,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Create a grant record (monthly allowance or admin top-up).
    #[must_use]
    pub fn grant(user_id: UserId, amount: i64, balance_before: i64, reason: String) -> Self {
        Self::record(user_id, TransactionKind::Grant, None, amount, balance_before, reason)
    }

    /// Create a deduct record for a metered feature.
    #[must_use]
    pub fn deduct(
        user_id: UserId,
        feature: &str,
        amount: i64,
        balance_before: i64,
        reason: String,
    ) -> Self {
        Self::record(
            user_id,
            TransactionKind::Deduct,
            Some(feature.to_owned()),
            amount,
            balance_before,
            reason,
        )
    }

    /// Create a refund record reversing an earlier deduction.
    #[must_use]
    pub fn refund(
        user_id: UserId,
        feature: Option<&str>,
        amount: i64,
        balance_before: i64,
        reason: String,
    ) -> Self {
        Self::record(
            user_id,
            TransactionKind::Refund,
            feature.map(str::to_owned),
            amount,
            balance_before,
            reason,
        )
    }

    /// Create a monthly allowance reset record.
    #[must_use]
    pub fn reset(user_id: UserId, amount: i64, balance_before: i64, tier_name: &str) -> Self {
        Self::record(
            user_id,
            TransactionKind::Reset,
            None,
            amount,
            balance_before,
            format!("monthly {tier_name} allowance"),
        )
    }

    fn record(
        user_id: UserId,
        kind: TransactionKind,
        feature: Option<String>,
        amount: i64,
        balance_before: i64,
        reason: String,
    ) -> Self {
        let amount = amount.abs();
        let balance_after = if kind.is_debit() {
            balance_before - amount
        } else {
            balance_before + amount
        };
        Self {
            id: TransactionId::generate(),
            user_id,
            kind,
            feature,
            amount,
            balance_before,
            balance_after,
            reason,
            created_at: Utc::now(),
        }
    }

    /// Check the chain invariant: `balance_after` matches `balance_before`
    /// adjusted by `amount` in the direction of `kind`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let delta = if self.kind.is_debit() {
            -self.amount
        } else {
            self.amount
        };
        self.amount >= 0 && self.balance_after == self.balance_before + delta
    }
}

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credits added by an allowance grant or admin top-up.
    Grant,

    /// Credits removed for feature usage.
    Deduct,

    /// Credits returned after a failed or abandoned charge.
    Refund,

    /// Monthly allowance reset grant.
    Reset,
}

impl TransactionKind {
    /// Whether this kind adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Grant | Self::Refund | Self::Reset)
    }

    /// Whether this kind removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Deduct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduct_reduces_balance() {
        let user_id = UserId::generate();
        let tx = LedgerTransaction::deduct(user_id, "decoder", 5, 20, "dream decoding".into());

        assert_eq!(tx.kind, TransactionKind::Deduct);
        assert_eq!(tx.feature.as_deref(), Some("decoder"));
        assert_eq!(tx.balance_before, 20);
        assert_eq!(tx.balance_after, 15);
        assert!(tx.is_consistent());
    }

    #[test]
    fn refund_restores_balance() {
        let user_id = UserId::generate();
        let tx = LedgerTransaction::refund(
            user_id,
            Some("decoder"),
            5,
            15,
            "decoder handler failed".into(),
        );

        assert_eq!(tx.kind, TransactionKind::Refund);
        assert_eq!(tx.balance_after, 20);
        assert!(tx.is_consistent());
    }

    #[test]
    fn negative_amount_is_normalized() {
        let user_id = UserId::generate();
        let tx = LedgerTransaction::grant(user_id, -30, 0, "top-up".into());

        assert_eq!(tx.amount, 30);
        assert_eq!(tx.balance_after, 30);
        assert!(tx.is_consistent());
    }

    #[test]
    fn kind_credit_debit() {
        assert!(TransactionKind::Grant.is_credit());
        assert!(TransactionKind::Refund.is_credit());
        assert!(TransactionKind::Reset.is_credit());
        assert!(!TransactionKind::Deduct.is_credit());

        assert!(TransactionKind::Deduct.is_debit());
        assert!(!TransactionKind::Grant.is_debit());
    }

    #[test]
    fn inconsistent_record_is_detected() {
        let user_id = UserId::generate();
        let mut tx = LedgerTransaction::deduct(user_id, "tarot", 3, 10, "tarot draw".into());
        tx.balance_after = 9;
        assert!(!tx.is_consistent());
    }
}
