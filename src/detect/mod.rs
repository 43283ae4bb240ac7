//! Request-traffic anomaly detection.
//!
//! A [`Detector`] ingests one event per inbound request, keeps a rolling
//! sixty-second view of traffic, smooths a baseline rate, classifies the
//! current rate into a [`Level`] and emits rate-limited [`Alert`]s.

pub mod alert;
pub mod baseline;
pub mod cache;
pub mod classifier;
pub mod engine;
pub mod event_log;
pub mod snapshot;

pub use self::alert::{Alert, AlertManager};
pub use self::baseline::BaselineEstimator;
pub use self::cache::SnapshotCache;
pub use self::classifier::LevelClassifier;
pub use self::engine::{Detector, DetectorConfig, RequestEvent};
pub use self::event_log::EventLog;
pub use self::snapshot::{Snapshot, SnapshotBuilder, TopKey};

use thiserror::Error;

/// Key substituted when a caller reports an event without an identity.
pub const UNKNOWN_KEY: &str = "unknown";

#[derive(Debug, Error, PartialEq)]
pub enum DetectError {
    #[error("invalid detector config: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

/// Severity of the current traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Normal,
    High,
    Critical,
}

impl Level {
    /// Human-readable label shown on dashboards.
    pub fn label(self) -> &'static str {
        match self {
            Level::Normal => "Normal",
            Level::High => "High Traffic",
            Level::Critical => "Potential DDoS",
        }
    }

    pub fn is_normal(self) -> bool {
        self == Level::Normal
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Normal => f.write_str("normal"),
            Level::High => f.write_str("high"),
            Level::Critical => f.write_str("critical"),
        }
    }
}

/// Round to `decimals` places for presentation.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
