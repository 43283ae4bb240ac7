use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::detect::alert::{Alert, AlertManager};
use crate::detect::baseline::BaselineEstimator;
use crate::detect::cache::SnapshotCache;
use crate::detect::classifier::LevelClassifier;
use crate::detect::event_log::EventLog;
use crate::detect::snapshot::{Snapshot, SnapshotBuilder};
use crate::detect::DetectError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Longest accepted window, gap or cache lifetime: one day.
pub const MAX_SPAN_MS: u64 = 86_400_000;

/// Largest accepted alert history.
pub const MAX_ALERT_HISTORY: usize = 10_000;

/// Tunables for a [`Detector`]. All durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Trailing window for requests-per-minute.
    pub window_ms: u64,
    /// Trailing window for the short burst count.
    pub burst_window_ms: u64,
    /// Requests per minute at or above which traffic is `high`.
    pub high_threshold_rpm: u64,
    /// Requests per minute at or above which traffic is `critical`.
    pub critical_threshold_rpm: u64,
    /// Relative change from baseline at or above which traffic is `high`.
    pub high_relative_change: f64,
    /// Relative change from baseline at or above which traffic is `critical`.
    pub critical_relative_change: f64,
    /// Minimum gap between two emitted alerts.
    pub min_alert_gap_ms: u64,
    /// Smoothing factor for the baseline EMA.
    pub ema_alpha: f64,
    /// Alerts kept in history; the oldest is dropped first.
    pub max_alert_history: usize,
    /// Snapshot age tolerated on the ingestion path.
    pub ingest_cache_ms: u64,
    /// Snapshot age tolerated on the status path.
    pub query_cache_ms: u64,
    /// Busiest keys listed in a snapshot.
    pub top_keys: usize,
    /// Recent alerts embedded in a snapshot.
    pub snapshot_alerts: usize,
    /// Alerts returned by `recent_alerts` when the caller gives no limit.
    pub default_alert_limit: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            burst_window_ms: 5_000,
            high_threshold_rpm: 3_000,
            critical_threshold_rpm: 5_000,
            high_relative_change: 4.0,
            critical_relative_change: 8.0,
            min_alert_gap_ms: 30_000,
            ema_alpha: 0.1,
            max_alert_history: 20,
            ingest_cache_ms: 750,
            query_cache_ms: 1_000,
            top_keys: 5,
            snapshot_alerts: 5,
            default_alert_limit: 10,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), DetectError> {
            Err(DetectError::InvalidConfig {
                field,
                reason: reason.into(),
            })
        }

        if self.window_ms == 0 || self.window_ms > MAX_SPAN_MS {
            return invalid("window_ms", format!("must be in 1..={}", MAX_SPAN_MS));
        }
        if self.burst_window_ms == 0 || self.burst_window_ms > self.window_ms {
            return invalid("burst_window_ms", "must be in 1..=window_ms");
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return invalid("ema_alpha", format!("must be in (0, 1], got {}", self.ema_alpha));
        }
        if self.high_threshold_rpm > self.critical_threshold_rpm {
            return invalid("high_threshold_rpm", "must not exceed critical_threshold_rpm");
        }
        if self.high_relative_change > self.critical_relative_change {
            return invalid(
                "high_relative_change",
                "must not exceed critical_relative_change",
            );
        }
        if self.max_alert_history == 0 || self.max_alert_history > MAX_ALERT_HISTORY {
            return invalid(
                "max_alert_history",
                format!("must be in 1..={}", MAX_ALERT_HISTORY),
            );
        }
        for (field, value) in [
            ("min_alert_gap_ms", self.min_alert_gap_ms),
            ("ingest_cache_ms", self.ingest_cache_ms),
            ("query_cache_ms", self.query_cache_ms),
        ] {
            if value > MAX_SPAN_MS {
                return invalid(field, format!("must not exceed {}", MAX_SPAN_MS));
            }
        }
        Ok(())
    }

    fn ms(value: u64) -> Duration {
        Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
    }

    fn classifier(&self) -> LevelClassifier {
        LevelClassifier {
            high_rpm: self.high_threshold_rpm,
            critical_rpm: self.critical_threshold_rpm,
            high_relative_change: self.high_relative_change,
            critical_relative_change: self.critical_relative_change,
        }
    }
}

// ---------------------------------------------------------------------------
// RequestEvent
// ---------------------------------------------------------------------------

/// What the host reports for each inbound request.
///
/// Only `key` drives aggregation today; the remaining fields are carried
/// for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

struct DetectorState {
    builder: SnapshotBuilder,
    cache: SnapshotCache,
}

/// Traffic anomaly detector.
///
/// All state (event log, baseline, alert history and cached snapshot) sits
/// behind one `RwLock`. Serving a fresh cached snapshot takes the read
/// lock; recording and rebuilding take the write lock, so the alert
/// cooldown check and update happen atomically.
///
/// The wall-clock entry points read the clock after acquiring the lock, so
/// `now` never goes backwards between two serialized calls unless the
/// system clock itself does.
pub struct Detector {
    config: DetectorConfig,
    state: RwLock<DetectorState>,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Result<Self, DetectError> {
        config.validate()?;
        info!(
            window_ms = config.window_ms,
            high_rpm = config.high_threshold_rpm,
            critical_rpm = config.critical_threshold_rpm,
            alert_gap_ms = config.min_alert_gap_ms,
            "traffic detector initialised"
        );
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: DetectorConfig) -> Self {
        let builder = SnapshotBuilder {
            log: EventLog::new(DetectorConfig::ms(config.window_ms)),
            baseline: BaselineEstimator::new(config.ema_alpha),
            classifier: config.classifier(),
            alerts: AlertManager::new(
                config.max_alert_history,
                DetectorConfig::ms(config.min_alert_gap_ms),
            ),
            burst_window: DetectorConfig::ms(config.burst_window_ms),
            top_keys: config.top_keys,
            snapshot_alerts: config.snapshot_alerts,
        };
        let cache = SnapshotCache::new(
            DetectorConfig::ms(config.ingest_cache_ms),
            DetectorConfig::ms(config.query_cache_ms),
        );
        Self {
            config,
            state: RwLock::new(DetectorState { builder, cache }),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Record one request observed now and return the current snapshot.
    pub fn record_event(&self, event: &RequestEvent) -> Snapshot {
        let mut state = self.state.write();
        let now = Utc::now();
        Self::ingest(&mut state, event, now)
    }

    /// Record one request observed at `now`.
    pub fn record_event_at(&self, event: &RequestEvent, now: DateTime<Utc>) -> Snapshot {
        let mut state = self.state.write();
        Self::ingest(&mut state, event, now)
    }

    fn ingest(state: &mut DetectorState, event: &RequestEvent, now: DateTime<Utc>) -> Snapshot {
        trace!(
            key = %event.key,
            method = event.method.as_deref().unwrap_or("-"),
            path = event.path.as_deref().unwrap_or("-"),
            "recorded request event"
        );
        state.builder.log.record(&event.key, now);
        state.cache.on_ingest(&mut state.builder, now)
    }

    /// Current snapshot without recording an event.
    pub fn status(&self) -> Snapshot {
        {
            let state = self.state.read();
            if let Some(snap) = state.cache.fresh_for_query(Utc::now()) {
                return snap.clone();
            }
        }
        let mut state = self.state.write();
        let now = Utc::now();
        let state = &mut *state;
        state.cache.on_query(&mut state.builder, now)
    }

    /// Current snapshot as of `now`.
    pub fn status_at(&self, now: DateTime<Utc>) -> Snapshot {
        {
            let state = self.state.read();
            if let Some(snap) = state.cache.fresh_for_query(now) {
                return snap.clone();
            }
        }
        let mut state = self.state.write();
        let state = &mut *state;
        state.cache.on_query(&mut state.builder, now)
    }

    /// Up to `limit` alerts, newest first. `None` uses the configured
    /// default.
    pub fn recent_alerts(&self, limit: Option<usize>) -> Vec<Alert> {
        let limit = limit
            .unwrap_or(self.config.default_alert_limit)
            .min(self.config.max_alert_history);
        self.state.read().builder.alerts.recent(limit)
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::from_validated(DetectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Level;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let cases = [
            (
                DetectorConfig {
                    window_ms: 0,
                    ..DetectorConfig::default()
                },
                "window_ms",
            ),
            (
                DetectorConfig {
                    burst_window_ms: 120_000,
                    ..DetectorConfig::default()
                },
                "burst_window_ms",
            ),
            (
                DetectorConfig {
                    ema_alpha: 0.0,
                    ..DetectorConfig::default()
                },
                "ema_alpha",
            ),
            (
                DetectorConfig {
                    high_threshold_rpm: 9_000,
                    ..DetectorConfig::default()
                },
                "high_threshold_rpm",
            ),
            (
                DetectorConfig {
                    high_relative_change: 10.0,
                    ..DetectorConfig::default()
                },
                "high_relative_change",
            ),
            (
                DetectorConfig {
                    max_alert_history: 0,
                    ..DetectorConfig::default()
                },
                "max_alert_history",
            ),
            (
                DetectorConfig {
                    window_ms: u64::MAX / 2,
                    ..DetectorConfig::default()
                },
                "window_ms",
            ),
            (
                DetectorConfig {
                    max_alert_history: usize::MAX,
                    ..DetectorConfig::default()
                },
                "max_alert_history",
            ),
            (
                DetectorConfig {
                    min_alert_gap_ms: MAX_SPAN_MS + 1,
                    ..DetectorConfig::default()
                },
                "min_alert_gap_ms",
            ),
            (
                DetectorConfig {
                    ingest_cache_ms: u64::MAX,
                    ..DetectorConfig::default()
                },
                "ingest_cache_ms",
            ),
            (
                DetectorConfig {
                    query_cache_ms: u64::MAX,
                    ..DetectorConfig::default()
                },
                "query_cache_ms",
            ),
        ];

        for (config, expected) in cases {
            match Detector::new(config) {
                Err(DetectError::InvalidConfig { field, .. }) => assert_eq!(field, expected),
                Ok(_) => panic!("config with bad {} accepted", expected),
            }
        }
    }

    #[test]
    fn test_day_long_window_is_accepted() {
        let config = DetectorConfig {
            window_ms: MAX_SPAN_MS,
            min_alert_gap_ms: MAX_SPAN_MS,
            max_alert_history: MAX_ALERT_HISTORY,
            ..DetectorConfig::default()
        };
        let detector = Detector::new(config).unwrap();
        detector.record_event_at(&RequestEvent::new("a"), t0());
        let snap = detector.status_at(t0() + Duration::hours(23));
        assert_eq!(snap.unique_keys, 1);
    }

    #[test]
    fn test_oversized_window_in_toml_is_rejected() {
        let config: DetectorConfig =
            toml::from_str("window_ms = 9223372036854775807\nburst_window_ms = 5000\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(DetectError::InvalidConfig { field: "window_ms", .. })
        ));
    }

    #[test]
    fn test_record_event_uses_key() {
        let detector = Detector::default();
        let event = RequestEvent::new("198.51.100.7")
            .with_method("GET")
            .with_path("/products")
            .with_user_agent("curl/8.0");
        let snap = detector.record_event_at(&event, t0());
        assert_eq!(snap.requests_per_minute, 1);
        assert_eq!(snap.top_keys[0].key, "198.51.100.7");
    }

    #[test]
    fn test_status_on_fresh_detector_is_zero_valued() {
        let detector = Detector::default();
        let snap = detector.status_at(t0());
        assert_eq!(snap, Snapshot::empty(t0()));
        assert!(detector.recent_alerts(None).is_empty());
    }

    #[test]
    fn test_status_is_idempotent_within_query_ttl() {
        let detector = Detector::default();
        detector.record_event_at(&RequestEvent::new("a"), t0());
        let first = detector.status_at(t0() + Duration::milliseconds(100));
        let second = detector.status_at(t0() + Duration::milliseconds(900));
        assert_eq!(first, second);
    }

    #[test]
    fn test_recent_alerts_limit_clamped_to_history() {
        let config = DetectorConfig {
            min_alert_gap_ms: 0,
            ingest_cache_ms: 0,
            critical_threshold_rpm: 2,
            high_threshold_rpm: 1,
            max_alert_history: 3,
            ..DetectorConfig::default()
        };
        let detector = Detector::new(config).unwrap();
        for i in 0..6 {
            detector.record_event_at(&RequestEvent::new("a"), t0() + Duration::seconds(i));
        }
        assert_eq!(detector.recent_alerts(Some(50)).len(), 3);
        assert_eq!(detector.recent_alerts(Some(2)).len(), 2);
        assert_eq!(detector.recent_alerts(None).len(), 3);
        assert!(detector
            .recent_alerts(None)
            .iter()
            .all(|a| a.level >= Level::High));
    }

    #[test]
    fn test_concurrent_recording_loses_nothing() {
        let detector = Arc::new(Detector::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let detector = Arc::clone(&detector);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        detector.record_event_at(&RequestEvent::new(format!("10.0.0.{}", t)), t0());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = detector.status_at(t0() + Duration::seconds(2));
        assert_eq!(snap.requests_per_minute, 2000);
        assert_eq!(snap.unique_keys, 8);
        assert!(snap.top_keys.iter().all(|k| k.count == 250));
    }
}
