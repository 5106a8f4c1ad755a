//! Enforcement error taxonomy.

use chrono::{DateTime, Utc};

use atelier_store::StoreError;

/// Errors surfaced by [`CreditGate::charge`](crate::CreditGate::charge).
///
/// `DailyLimitExceeded` and `InsufficientCredits` are expected business
/// outcomes ("come back tomorrow" / "upgrade or buy credits") and should be
/// mapped to non-5xx responses by the embedding layer. `Storage` means the
/// metered action was denied because the backend is unavailable (fail
/// closed); callers may retry. `Handler` carries the wrapped handler's own
/// failure, re-surfaced untouched after the refund side effect.
#[derive(Debug, thiserror::Error)]
pub enum GateError<E> {
    /// No authenticated user in the request context.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The feature has no cost entry; a deploy-time bug, never a silent
    /// zero-cost default.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The daily cap for this feature/tier is spent.
    #[error("daily limit exceeded for {feature}: {used}/{limit}")]
    DailyLimitExceeded {
        /// The capped feature.
        feature: String,
        /// The configured cap.
        limit: u32,
        /// Today's count.
        used: u32,
        /// When the next reporting day begins, in UTC.
        resets_at: DateTime<Utc>,
    },

    /// The balance cannot cover the feature cost.
    #[error("insufficient credits: cost={cost}, balance={balance}, shortfall={shortfall}")]
    InsufficientCredits {
        /// Cost of the attempted feature.
        cost: i64,
        /// Current balance.
        balance: i64,
        /// How many credits short the balance is.
        shortfall: i64,
    },

    /// The ledger or usage store is unavailable; the action was denied.
    #[error("storage unavailable: {0}")]
    Storage(#[from] StoreError),

    /// The wrapped handler failed; the charge was refunded.
    #[error("handler failed")]
    Handler(E),
}

impl<E> GateError<E> {
    /// Whether this is an expected business outcome rather than a fault.
    #[must_use]
    pub const fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            Self::DailyLimitExceeded { .. } | Self::InsufficientCredits { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_outcomes_are_flagged() {
        let limit: GateError<String> = GateError::DailyLimitExceeded {
            feature: "decoder".into(),
            limit: 3,
            used: 3,
            resets_at: Utc::now(),
        };
        let funds: GateError<String> = GateError::InsufficientCredits {
            cost: 5,
            balance: 2,
            shortfall: 3,
        };
        let storage: GateError<String> = GateError::Storage(StoreError::NotFound);

        assert!(limit.is_business_outcome());
        assert!(funds.is_business_outcome());
        assert!(!storage.is_business_outcome());
    }
}
