//! Time-ordered log of recent request events with live per-key counts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::detect::snapshot::TopKey;
use crate::detect::{round_to, UNKNOWN_KEY};

/// A single observed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub key: Arc<str>,
}

/// Sliding window of events.
///
/// `counts` always mirrors the events held in `events`: every insert bumps
/// the key's counter and every prune decrements it, removing the entry when
/// it reaches zero.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<Event>,
    counts: HashMap<Arc<str>, usize>,
    window: Duration,
}

impl EventLog {
    pub fn new(window: Duration) -> Self {
        Self {
            events: VecDeque::new(),
            counts: HashMap::new(),
            window,
        }
    }

    /// Append an event. Empty keys are recorded under [`UNKNOWN_KEY`]; any
    /// other key is taken verbatim.
    pub fn record(&mut self, key: &str, now: DateTime<Utc>) {
        let key = if key.is_empty() { UNKNOWN_KEY } else { key };

        // Share one allocation per live key between the queue and the map.
        let key: Arc<str> = match self.counts.get_key_value(key) {
            Some((existing, _)) => Arc::clone(existing),
            None => Arc::from(key),
        };
        *self.counts.entry(Arc::clone(&key)).or_insert(0) += 1;
        self.events.push_back(Event {
            timestamp: now,
            key,
        });
    }

    /// Drop every event at the front of the log whose timestamp is at or
    /// before `now - window`. Returns the number of events removed.
    ///
    /// Events stamped after `now` (clock skew) are kept, as is everything
    /// when `now - window` falls outside the representable range.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.window) else {
            return 0;
        };
        let mut removed = 0;

        while self.events.front().is_some_and(|e| e.timestamp <= cutoff) {
            let Some(event) = self.events.pop_front() else {
                break;
            };
            if let Some(count) = self.counts.get_mut(&event.key) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&event.key);
                }
            }
            removed += 1;
        }

        removed
    }

    /// Total retained events. With a sixty-second window this is the
    /// requests-per-minute figure.
    pub fn count_in_window(&self) -> usize {
        self.events.len()
    }

    /// Events newer than `now - burst`, scanned from the tail.
    pub fn count_in_burst_window(&self, now: DateTime<Utc>, burst: Duration) -> usize {
        let Some(cutoff) = now.checked_sub_signed(burst) else {
            return self.events.len();
        };
        self.events
            .iter()
            .rev()
            .take_while(|e| e.timestamp > cutoff)
            .count()
    }

    pub fn unique_key_count(&self) -> usize {
        self.counts.len()
    }

    pub fn count_for(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// The `n` busiest keys, highest count first. Ties are ordered by key so
    /// the result is stable between rebuilds.
    pub fn top_keys(&self, n: usize) -> Vec<TopKey> {
        let total = self.events.len();
        let mut ranked: Vec<(&Arc<str>, usize)> =
            self.counts.iter().map(|(k, &c)| (k, c)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        ranked
            .into_iter()
            .take(n)
            .map(|(key, count)| {
                let percent = if total == 0 {
                    0.0
                } else {
                    round_to(100.0 * count as f64 / total as f64, 1)
                };
                TopKey {
                    key: key.to_string(),
                    count: count as u64,
                    percent,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
