/// Exponentially smoothed estimate of the normal request rate.
///
/// A baseline of zero means "not yet seeded": the first update adopts the
/// observed rate as-is so a cold start does not look like a surge.
#[derive(Debug, Clone)]
pub struct BaselineEstimator {
    alpha: f64,
    baseline: f64,
}

impl BaselineEstimator {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            baseline: 0.0,
        }
    }

    /// Fold `current_rate` into the baseline and return the new value.
    pub fn update(&mut self, current_rate: f64) -> f64 {
        let current_rate = current_rate.max(0.0);
        self.baseline = if self.baseline == 0.0 {
            current_rate
        } else {
            self.baseline * (1.0 - self.alpha) + current_rate * self.alpha
        };
        self.baseline
    }

    pub fn value(&self) -> f64 {
        self.baseline
    }

    /// Fractional deviation of `current_rate` from the baseline, or zero
    /// while the baseline is unseeded.
    pub fn relative_change(&self, current_rate: f64) -> f64 {
        if self.baseline > 0.0 {
            (current_rate - self.baseline) / self.baseline.max(1.0)
        } else {
            0.0
        }
    }
}
