use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::detect::snapshot::{Snapshot, TopKey};
use crate::detect::Level;

/// A recorded traffic alert. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub level: Level,
    pub label: String,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub requests_per_minute: u64,
    pub requests_last_burst_window: u64,
    pub unique_keys: u64,
    pub baseline_rate: f64,
    pub relative_change: f64,
    pub top_keys: Vec<TopKey>,
}

fn message_for(level: Level) -> &'static str {
    match level {
        Level::Critical => "suspected DDoS, requests/minute far exceeds safe threshold",
        Level::High => "traffic spike relative to baseline",
        Level::Normal => "traffic within normal range",
    }
}

/// Decides whether a snapshot warrants an alert and keeps a bounded,
/// oldest-first history of the ones that did.
#[derive(Debug)]
pub struct AlertManager {
    history: VecDeque<Alert>,
    capacity: usize,
    cooldown: Duration,
    last_alert: Option<DateTime<Utc>>,
}

impl AlertManager {
    pub fn new(capacity: usize, cooldown: Duration) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            cooldown,
            last_alert: None,
        }
    }

    /// Emit an alert for `snapshot` unless it is normal or the previous
    /// alert is still inside the cooldown. Returns the new alert, if any.
    pub fn maybe_emit(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> Option<Alert> {
        if snapshot.level.is_normal() {
            return None;
        }

        if let Some(last) = self.last_alert {
            if now < last {
                // Clock stepped backwards: restart the cooldown from here.
                debug!(
                    last = %last.to_rfc3339(),
                    now = %now.to_rfc3339(),
                    "clock moved backwards, re-anchoring alert cooldown"
                );
                self.last_alert = Some(now);
                return None;
            }
            let elapsed = now - last;
            if elapsed < self.cooldown {
                debug!(
                    level = %snapshot.level,
                    elapsed_ms = elapsed.num_milliseconds(),
                    cooldown_ms = self.cooldown.num_milliseconds(),
                    "alert suppressed by cooldown"
                );
                return None;
            }
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            level: snapshot.level,
            label: snapshot.label.clone(),
            message: message_for(snapshot.level).to_string(),
            triggered_at: now,
            requests_per_minute: snapshot.requests_per_minute,
            requests_last_burst_window: snapshot.requests_last_burst_window,
            unique_keys: snapshot.unique_keys,
            baseline_rate: snapshot.baseline_rate,
            relative_change: snapshot.relative_change,
            top_keys: snapshot.top_keys.clone(),
        };

        warn!(
            id = %alert.id,
            level = %alert.level,
            rpm = alert.requests_per_minute,
            burst = alert.requests_last_burst_window,
            baseline = alert.baseline_rate,
            relative_change = alert.relative_change,
            top_key = alert.top_keys.first().map(|k| k.key.as_str()).unwrap_or("-"),
            "{}: {}",
            alert.label,
            alert.message
        );

        self.history.push_back(alert.clone());
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.last_alert = Some(now);

        Some(alert)
    }

    /// Up to `limit` alerts, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn last_alert_at(&self) -> Option<DateTime<Utc>> {
        self.last_alert
    }
}
