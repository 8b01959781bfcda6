//! Binomial proportion estimates with confidence intervals

use serde::{Deserialize, Serialize};

/// Two-sided z-score for a 95% confidence level
pub const DEFAULT_Z: f64 = 1.96;

/// A closed interval on the real line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
}

impl Interval {
    /// Create an interval; bounds are not reordered
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Whether the interval contains a value
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Whether the whole interval lies strictly above a bound
    pub fn lies_above(&self, bound: f64) -> bool {
        self.lower > bound
    }

    /// Interval width
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// A binomial proportion: successes out of trials
///
/// A zero-trial proportion is representable; its point estimate is defined
/// as 0 and both interval constructions return the maximally uninformative
/// `[0, 1]`. Callers that must distinguish "no data" handle it before
/// constructing the proportion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proportion {
    successes: u64,
    trials: u64,
}

impl Proportion {
    /// Create a proportion; `successes` must not exceed `trials`
    pub fn new(successes: u64, trials: u64) -> Self {
        debug_assert!(successes <= trials, "successes exceed trials");
        Self {
            successes: successes.min(trials),
            trials,
        }
    }

    /// Number of successes
    pub fn successes(&self) -> u64 {
        self.successes
    }

    /// Number of trials
    pub fn trials(&self) -> u64 {
        self.trials
    }

    /// Point estimate of the proportion
    pub fn point(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.successes as f64 / self.trials as f64
        }
    }

    /// Wilson score interval
    ///
    /// Well-behaved near 0 and 1, which is exactly where QBER and agreement
    /// estimates live.
    pub fn wilson(&self, z: f64) -> Interval {
        if self.trials == 0 {
            return Interval::new(0.0, 1.0);
        }
        let n = self.trials as f64;
        let p = self.point();
        let z2 = z * z;
        let denom = 1.0 + z2 / n;
        let center = (p + z2 / (2.0 * n)) / denom;
        let half = (z / denom) * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();
        Interval::new((center - half).max(0.0), (center + half).min(1.0))
    }

    /// Normal-approximation (Wald) interval, clamped to [0, 1]
    pub fn normal(&self, z: f64) -> Interval {
        if self.trials == 0 {
            return Interval::new(0.0, 1.0);
        }
        let n = self.trials as f64;
        let p = self.point();
        let half = z * (p * (1.0 - p) / n).sqrt();
        Interval::new((p - half).max(0.0), (p + half).min(1.0))
    }

    /// Whether the point estimate reaches a minimum
    pub fn meets_min(&self, min: f64) -> bool {
        self.point() >= min
    }

    /// Whether the point estimate stays strictly below a maximum
    pub fn below_max(&self, max: f64) -> bool {
        self.point() < max
    }
}
