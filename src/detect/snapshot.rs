//! Immutable traffic snapshots and the builder that produces them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detect::alert::{Alert, AlertManager};
use crate::detect::baseline::BaselineEstimator;
use crate::detect::classifier::LevelClassifier;
use crate::detect::event_log::EventLog;
use crate::detect::{round_to, Level};

/// One of the busiest keys in the current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKey {
    pub key: String,
    pub count: u64,
    /// Share of all requests in the window, one decimal place.
    pub percent: f64,
}

/// Point-in-time view of traffic. Replaced wholesale on every rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub level: Level,
    pub label: String,
    pub requests_per_minute: u64,
    pub requests_last_burst_window: u64,
    pub unique_keys: u64,
    pub baseline_rate: f64,
    pub relative_change: f64,
    pub top_keys: Vec<TopKey>,
    /// Most recent alerts, newest first.
    pub recent_alerts: Vec<Alert>,
    pub last_updated: DateTime<Utc>,
}

impl Snapshot {
    /// Zero-valued snapshot for a detector that has seen nothing.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            level: Level::Normal,
            label: Level::Normal.label().to_string(),
            requests_per_minute: 0,
            requests_last_burst_window: 0,
            unique_keys: 0,
            baseline_rate: 0.0,
            relative_change: 0.0,
            top_keys: Vec::new(),
            recent_alerts: Vec::new(),
            last_updated: now,
        }
    }
}

/// Owns the detector's mutable components and turns them into a
/// [`Snapshot`] on demand.
#[derive(Debug)]
pub struct SnapshotBuilder {
    pub log: EventLog,
    pub baseline: BaselineEstimator,
    pub classifier: LevelClassifier,
    pub alerts: AlertManager,
    pub burst_window: Duration,
    pub top_keys: usize,
    pub snapshot_alerts: usize,
}

impl SnapshotBuilder {
    /// Prune, measure, update the baseline, classify and maybe alert.
    ///
    /// The returned snapshot lists the alerts that existed before this
    /// rebuild; an alert raised by this very rebuild shows up in the next.
    pub fn rebuild(&mut self, now: DateTime<Utc>) -> Snapshot {
        let pruned = self.log.prune(now);

        let rpm = self.requests_per_minute();
        let burst = self.log.count_in_burst_window(now, self.burst_window) as u64;
        let unique = self.log.unique_key_count() as u64;

        let baseline = self.baseline.update(rpm as f64);
        let relative_change = self.baseline.relative_change(rpm as f64);
        let (level, label) = self.classifier.classify(rpm, relative_change);
        let top_keys = self.log.top_keys(self.top_keys);

        let snapshot = Snapshot {
            level,
            label: label.to_string(),
            requests_per_minute: rpm,
            requests_last_burst_window: burst,
            unique_keys: unique,
            baseline_rate: round_to(baseline, 1),
            relative_change: round_to(relative_change, 2),
            top_keys,
            recent_alerts: self.alerts.recent(self.snapshot_alerts),
            last_updated: now,
        };

        debug!(
            rpm,
            burst,
            unique,
            pruned,
            baseline,
            relative_change,
            level = %level,
            "rebuilt traffic snapshot"
        );

        self.alerts.maybe_emit(&snapshot, now);
        snapshot
    }

    /// Window count normalised to one minute.
    fn requests_per_minute(&self) -> u64 {
        let count = self.log.count_in_window() as u64;
        let window_ms = self.log.window().num_milliseconds().max(1) as u64;
        if window_ms == 60_000 {
            count
        } else {
            count.saturating_mul(60_000) / window_ms
        }
    }
}
