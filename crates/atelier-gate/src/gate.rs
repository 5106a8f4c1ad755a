//! Credit enforcement around request handlers.
//!
//! [`CreditGate::charge`] wraps an arbitrary async handler with the full
//! metering sequence: auth check, cost lookup, daily cap, pre-emptive
//! deduction, handler execution, and commit-or-refund. The deduction always
//! happens before the handler runs — "execute, then decide whether to
//! charge" would reopen the double-spend window during long AI calls — and
//! the refund on failure is unconditional.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use atelier_core::{CostTable, Tier, UserId};

use crate::error::GateError;
use crate::ledger::{DeductOutcome, Ledger};
use crate::usage::{DailyCheck, UsageTracker};

/// Request-scoped identity resolved by the surrounding auth layer.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    user: Option<UserId>,
    tier: Tier,
}

impl RequestContext {
    /// Context for an authenticated user.
    #[must_use]
    pub const fn authenticated(user: UserId, tier: Tier) -> Self {
        Self {
            user: Some(user),
            tier,
        }
    }

    /// Context with no authenticated user. Charging always fails with
    /// [`GateError::AuthenticationRequired`].
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user: None,
            tier: Tier::Bronze,
        }
    }

    /// The authenticated user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<UserId> {
        self.user
    }

    /// The user's subscription tier.
    #[must_use]
    pub const fn tier(&self) -> Tier {
        self.tier
    }
}

/// A handler result annotated with charge metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metered<T> {
    /// The handler's output, untouched.
    pub output: T,

    /// Credits charged for this call (0 for free features).
    pub charged: i64,

    /// Balance after the charge. `None` for free features, which never
    /// touch the ledger.
    pub remaining: Option<i64>,
}

impl<T> Metered<T> {
    /// Merge `charged`/`remaining` into an existing JSON object without
    /// altering its shape. Non-object values are left untouched.
    pub fn annotate(&self, response: &mut Value) {
        if let Value::Object(map) = response {
            map.insert("charged".into(), Value::from(self.charged));
            if let Some(remaining) = self.remaining {
                map.insert("remaining".into(), Value::from(remaining));
            }
        }
    }
}

/// The enforcement wrapper gating paid features.
///
/// Owns its collaborators explicitly; construct one at application startup
/// and share it, rather than reaching for globals.
pub struct CreditGate {
    ledger: Ledger,
    usage: UsageTracker,
    costs: Arc<CostTable>,
}

impl CreditGate {
    /// Create a gate from its collaborators.
    #[must_use]
    pub fn new(ledger: Ledger, usage: UsageTracker, costs: Arc<CostTable>) -> Self {
        Self {
            ledger,
            usage,
            costs,
        }
    }

    /// The underlying ledger operations.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The underlying usage tracker.
    #[must_use]
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Run `handler` behind the credit gate for `feature`.
    ///
    /// On success the response carries `{charged, remaining}` metadata and
    /// today's usage count goes up by one. On handler failure the charge is
    /// refunded, usage is not counted, and the handler's error comes back
    /// as [`GateError::Handler`]. If the returned future is dropped before
    /// the handler settles — a timeout or client disconnect — the charge is
    /// refunded as well.
    ///
    /// # Errors
    ///
    /// See [`GateError`] for the full taxonomy.
    pub async fn charge<T, E, F, Fut>(
        &self,
        ctx: &RequestContext,
        feature: &str,
        handler: F,
    ) -> Result<Metered<T>, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(user) = ctx.user() else {
            return Err(GateError::AuthenticationRequired);
        };
        let tier = ctx.tier();

        let cost = self
            .costs
            .cost(feature)
            .ok_or_else(|| GateError::Configuration(format!("no cost entry for feature: {feature}")))?;

        // Free features skip the ledger and the usage books entirely.
        if cost == 0 {
            let output = handler().await.map_err(GateError::Handler)?;
            return Ok(Metered {
                output,
                charged: 0,
                remaining: None,
            });
        }

        match self.usage.check(&user, feature, tier)? {
            DailyCheck::Allowed => {}
            DailyCheck::Exhausted {
                limit,
                used,
                resets_at,
            } => {
                return Err(GateError::DailyLimitExceeded {
                    feature: feature.to_owned(),
                    limit,
                    used,
                    resets_at,
                });
            }
        }

        let remaining = match self
            .ledger
            .deduct(&user, tier, cost, feature, &format!("{feature} charge"))?
        {
            DeductOutcome::Applied { remaining, .. } => remaining,
            DeductOutcome::InsufficientFunds { balance, shortfall } => {
                return Err(GateError::InsufficientCredits {
                    cost,
                    balance,
                    shortfall,
                });
            }
        };

        let guard = ChargeGuard {
            ledger: &self.ledger,
            user,
            amount: cost,
            feature: feature.to_owned(),
            armed: true,
        };

        match handler().await {
            Ok(output) => {
                guard.disarm();
                if let Err(e) = self.usage.record_usage(&user, feature) {
                    tracing::error!(
                        user = %user,
                        feature,
                        error = %e,
                        "usage recording failed after successful charge"
                    );
                }
                tracing::debug!(user = %user, feature, charged = cost, remaining, "charge committed");
                Ok(Metered {
                    output,
                    charged: cost,
                    remaining: Some(remaining),
                })
            }
            Err(e) => {
                guard.refund_now("handler failed");
                Err(GateError::Handler(e))
            }
        }
    }
}

/// Holds an uncommitted charge. Refunds on drop unless disarmed, which is
/// what keeps a cancelled or timed-out handler from stranding the charge.
struct ChargeGuard<'a> {
    ledger: &'a Ledger,
    user: UserId,
    amount: i64,
    feature: String,
    armed: bool,
}

impl ChargeGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }

    fn refund_now(mut self, why: &str) {
        self.armed = false;
        self.execute_refund(why);
    }

    fn execute_refund(&self, why: &str) {
        let reason = format!("{}: {why}", self.feature);
        match self
            .ledger
            .refund(&self.user, self.amount, Some(&self.feature), &reason)
        {
            Ok(balance) => {
                tracing::debug!(user = %self.user, feature = %self.feature, amount = self.amount, balance, "charge refunded");
            }
            Err(e) => {
                // The user was charged for work that was not delivered and
                // the refund did not land; this needs eyes.
                tracing::error!(
                    user = %self.user,
                    feature = %self.feature,
                    amount = self.amount,
                    error = %e,
                    "refund failed, manual reconciliation required"
                );
            }
        }
    }
}

impl Drop for ChargeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.execute_refund("charge abandoned before completion");
        }
    }
}
