//! Synthetic traffic scenarios replayed against a fresh detector on a
//! virtual clock. Used by `surgewatch simulate` to show how a given
//! configuration reacts without waiting in real time.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use crate::detect::{Alert, Detector, DetectorConfig, RequestEvent, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// 6000 requests from one client inside a single second.
    Flood,
    /// Five quiet minutes at 10 req/min, then 200 requests in one clump.
    Surge,
    /// Ten minutes of 10 req/min spread over several clients.
    Steady,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub scenario: Scenario,
    pub events: usize,
    pub snapshot: Snapshot,
    pub alerts: Vec<Alert>,
}

/// Replay `scenario` starting at `start` and return the final state.
pub fn run(scenario: Scenario, config: DetectorConfig, start: DateTime<Utc>) -> Result<SimulationReport> {
    let detector = Detector::new(config)?;
    info!(?scenario, "running traffic simulation");

    let (events, end) = match scenario {
        Scenario::Flood => flood(&detector, start),
        Scenario::Surge => surge(&detector, start),
        Scenario::Steady => steady(&detector, start),
    };

    let snapshot = detector.status_at(end);
    let alerts = detector.recent_alerts(None);
    Ok(SimulationReport {
        scenario,
        events,
        snapshot,
        alerts,
    })
}

fn flood(detector: &Detector, start: DateTime<Utc>) -> (usize, DateTime<Utc>) {
    let event = RequestEvent::new("1.2.3.4").with_method("GET").with_path("/");
    let count = 6000;
    for i in 0..count {
        detector.record_event_at(&event, start + Duration::microseconds(i * 166));
    }
    (count as usize, start + Duration::seconds(2))
}

/// Ten requests a minute for `minutes`, rotating over five clients.
fn quiet_traffic(detector: &Detector, start: DateTime<Utc>, minutes: i64) -> (usize, DateTime<Utc>) {
    let count = minutes * 10;
    for i in 0..count {
        let event = RequestEvent::new(format!("10.0.0.{}", i % 5 + 1)).with_path("/products");
        detector.record_event_at(&event, start + Duration::seconds(i * 6));
    }
    (count as usize, start + Duration::seconds(count * 6))
}

fn surge(detector: &Detector, start: DateTime<Utc>) -> (usize, DateTime<Utc>) {
    let (quiet, burst_start) = quiet_traffic(detector, start, 5);
    let event = RequestEvent::new("203.0.113.50").with_path("/login");
    for i in 0..200 {
        detector.record_event_at(&event, burst_start + Duration::milliseconds(i * 2));
    }
    (quiet + 200, burst_start + Duration::milliseconds(1500))
}

fn steady(detector: &Detector, start: DateTime<Utc>) -> (usize, DateTime<Utc>) {
    quiet_traffic(detector, start, 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Level;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_flood_is_critical() {
        let report = run(Scenario::Flood, DetectorConfig::default(), t0()).unwrap();
        assert_eq!(report.events, 6000);
        assert_eq!(report.snapshot.level, Level::Critical);
        assert_eq!(report.snapshot.requests_per_minute, 6000);
        assert_eq!(report.snapshot.top_keys[0].key, "1.2.3.4");
        assert_eq!(report.snapshot.top_keys[0].percent, 100.0);
        assert!(!report.alerts.is_empty());
    }

    #[test]
    fn test_surge_escalates() {
        let report = run(Scenario::Surge, DetectorConfig::default(), t0()).unwrap();
        assert!(report.snapshot.relative_change > 4.0);
        assert!(report.snapshot.level >= Level::High);
        assert_eq!(report.alerts.len(), 1);
    }

    #[test]
    fn test_steady_stays_normal() {
        let report = run(Scenario::Steady, DetectorConfig::default(), t0()).unwrap();
        assert_eq!(report.snapshot.level, Level::Normal);
        assert!(report.alerts.is_empty());
        assert_eq!(report.snapshot.unique_keys, 5);
        assert!((report.snapshot.baseline_rate - 10.0).abs() < 0.5);
    }
}
