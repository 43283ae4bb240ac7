//! Maps the current rate and its deviation from baseline to a [`Level`].

use crate::detect::Level;

/// Absolute and relative thresholds. Either one crossing is enough to
/// escalate: a quiet service that jumps tenfold alerts even though its
/// absolute rate is low.
#[derive(Debug, Clone, Copy)]
pub struct LevelClassifier {
    pub high_rpm: u64,
    pub critical_rpm: u64,
    pub high_relative_change: f64,
    pub critical_relative_change: f64,
}

impl Default for LevelClassifier {
    fn default() -> Self {
        Self {
            high_rpm: 3000,
            critical_rpm: 5000,
            high_relative_change: 4.0,
            critical_relative_change: 8.0,
        }
    }
}

impl LevelClassifier {
    pub fn classify(&self, requests_per_minute: u64, relative_change: f64) -> (Level, &'static str) {
        let level = if requests_per_minute >= self.critical_rpm
            || relative_change >= self.critical_relative_change
        {
            Level::Critical
        } else if requests_per_minute >= self.high_rpm
            || relative_change >= self.high_relative_change
        {
            Level::High
        } else {
            Level::Normal
        };
        (level, level.label())
    }
}
