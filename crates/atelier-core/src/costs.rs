//! Static cost and cap configuration for metered features.
//!
//! The table maps feature names to credit costs and, per feature, tiers to
//! daily caps. A feature missing from the table is a configuration error at
//! the enforcement layer, never a silent zero-cost default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Tier;

/// A daily cap for one feature/tier combination.
///
/// `Unlimited` is an explicit value rather than a large magic integer, so
/// raising a numeric limit can never accidentally cap a tier that was meant
/// to be uncapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyLimit {
    /// At most this many successful uses per reporting day.
    Limited(u32),

    /// No daily cap.
    Unlimited,
}

impl DailyLimit {
    /// Whether another use is allowed given today's count.
    #[must_use]
    pub const fn allows(&self, used_today: u32) -> bool {
        match self {
            Self::Limited(limit) => used_today < *limit,
            Self::Unlimited => true,
        }
    }
}

/// Cost entry for one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCost {
    /// Credit cost per successful use. Zero means free/unmetered.
    pub credits: i64,

    /// Daily caps by tier. A tier with no entry is uncapped.
    pub daily_limits: HashMap<Tier, DailyLimit>,
}

impl FeatureCost {
    /// Create an entry with no daily caps.
    #[must_use]
    pub fn new(credits: i64) -> Self {
        Self {
            credits,
            daily_limits: HashMap::new(),
        }
    }

    /// Set the daily cap for a tier.
    #[must_use]
    pub fn with_limit(mut self, tier: Tier, limit: DailyLimit) -> Self {
        self.daily_limits.insert(tier, limit);
        self
    }
}

/// The static feature cost table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostTable {
    features: HashMap<String, FeatureCost>,
}

impl Default for CostTable {
    fn default() -> Self {
        let mut table = Self::empty();

        // Creative suite
        table.insert(
            "decoder",
            FeatureCost::new(5)
                .with_limit(Tier::Bronze, DailyLimit::Limited(3))
                .with_limit(Tier::Silver, DailyLimit::Limited(10))
                .with_limit(Tier::Gold, DailyLimit::Unlimited),
        );
        table.insert(
            "tarot",
            FeatureCost::new(3)
                .with_limit(Tier::Bronze, DailyLimit::Limited(5))
                .with_limit(Tier::Silver, DailyLimit::Limited(15)),
        );
        table.insert(
            "horoscope",
            FeatureCost::new(2).with_limit(Tier::Bronze, DailyLimit::Limited(5)),
        );
        table.insert(
            "poetry",
            FeatureCost::new(4)
                .with_limit(Tier::Bronze, DailyLimit::Limited(5))
                .with_limit(Tier::Silver, DailyLimit::Limited(20)),
        );
        table.insert(
            "story",
            FeatureCost::new(6)
                .with_limit(Tier::Bronze, DailyLimit::Limited(2))
                .with_limit(Tier::Silver, DailyLimit::Limited(8)),
        );

        // Companion chat is metered per message but never capped.
        table.insert("companion_chat", FeatureCost::new(1));

        // Daily affirmation is free for everyone.
        table.insert("affirmation", FeatureCost::new(0));

        table
    }
}

impl CostTable {
    /// Create an empty table.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            features: HashMap::new(),
        }
    }

    /// Insert or replace a feature entry.
    pub fn insert(&mut self, feature: &str, cost: FeatureCost) {
        self.features.insert(feature.to_owned(), cost);
    }

    /// Whether the table has an entry for a feature.
    #[must_use]
    pub fn contains(&self, feature: &str) -> bool {
        self.features.contains_key(feature)
    }

    /// Credit cost of a feature, or `None` when the feature is not
    /// configured.
    #[must_use]
    pub fn cost(&self, feature: &str) -> Option<i64> {
        self.features.get(feature).map(|f| f.credits)
    }

    /// Daily cap for a feature/tier combination.
    ///
    /// Tiers without an entry are uncapped. The feature itself must exist;
    /// querying an unknown feature also reports `Unlimited`, which is why
    /// the enforcement layer resolves the cost (and errors on absence)
    /// before consulting caps.
    #[must_use]
    pub fn daily_limit(&self, feature: &str, tier: Tier) -> DailyLimit {
        self.features
            .get(feature)
            .and_then(|f| f.daily_limits.get(&tier))
            .copied()
            .unwrap_or(DailyLimit::Unlimited)
    }

    /// Validate that every gated feature has a cost entry.
    ///
    /// Intended for startup: a missing entry is a deploy-time bug and should
    /// fail loudly before any request is served.
    ///
    /// # Errors
    ///
    /// Returns `CostTableError::MissingFeature` naming the first feature
    /// without an entry.
    pub fn validate<'a, I>(&self, gated_features: I) -> Result<(), CostTableError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for feature in gated_features {
            if !self.contains(feature) {
                return Err(CostTableError::MissingFeature {
                    feature: feature.to_owned(),
                });
            }
        }
        Ok(())
    }
}

/// Configuration errors for the cost table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CostTableError {
    /// A gated feature has no cost entry.
    #[error("no cost entry for feature: {feature}")]
    MissingFeature {
        /// The feature missing from the table.
        feature: String,
    },
}
