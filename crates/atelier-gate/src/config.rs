//! Gate configuration.

use chrono_tz::Tz;

/// Default reporting timezone. All users share one reset instant anchored
/// to US Eastern, independent of request origin or server locale.
pub const DEFAULT_REPORTING_TIMEZONE: &str = "America/New_York";

/// Default usage-counter retention window in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// IANA name of the reporting timezone used to compute "today" for
    /// daily caps and monthly resets (default: `America/New_York`).
    pub reporting_timezone: String,

    /// How many days of usage counters to keep (default: 30).
    pub retention_days: u32,

    /// Path to the persistent data directory for embedders using the
    /// RocksDB backend (default: `/data/atelier`).
    pub data_dir: String,
}

impl GateConfig {
    /// Load configuration from environment variables.
    ///
    /// - `ATELIER_TIMEZONE` — IANA reporting timezone name
    /// - `ATELIER_RETENTION_DAYS` — usage retention window
    /// - `ATELIER_DATA_DIR` — persistent data directory
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            reporting_timezone: std::env::var("ATELIER_TIMEZONE")
                .unwrap_or_else(|_| DEFAULT_REPORTING_TIMEZONE.into()),
            retention_days: std::env::var("ATELIER_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            data_dir: std::env::var("ATELIER_DATA_DIR")
                .unwrap_or_else(|_| "/data/atelier".into()),
        }
    }

    /// Resolve the configured timezone name.
    ///
    /// An unrecognized name falls back to UTC with a logged warning rather
    /// than silently shifting resets with the deployment region.
    #[must_use]
    pub fn resolve_timezone(&self) -> Tz {
        match self.reporting_timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(
                    timezone = %self.reporting_timezone,
                    "unrecognized reporting timezone, falling back to UTC"
                );
                Tz::UTC
            }
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            reporting_timezone: DEFAULT_REPORTING_TIMEZONE.into(),
            retention_days: DEFAULT_RETENTION_DAYS,
            data_dir: "/data/atelier".into(),
        }
    }
}
