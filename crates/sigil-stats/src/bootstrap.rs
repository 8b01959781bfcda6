//! Seeded percentile bootstrap
//!
//! Used where no closed-form interval exists, chiefly the CHSH S-value. The
//! resampling unit is whatever the caller passes as one sample (for CHSH,
//! one whole trial), so correlated components stay together across
//! resamples.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::proportion::Interval;

/// Abramowitz-Stegun 7.1.26 rational approximation, |error| < 1.5e-7
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Two-sided tail mass outside ±z under the standard normal
///
/// Converts the configured z-score into the percentile levels the bootstrap
/// cuts at, so both interval families answer to the same knob.
pub fn two_sided_alpha(z: f64) -> f64 {
    2.0 * (1.0 - normal_cdf(z))
}

/// Percentile bootstrap interval for an arbitrary statistic
///
/// Draws `resamples` resamples (with replacement, same size as the input),
/// evaluates the statistic on each, and cuts the empirical distribution at
/// the two-sided level implied by `z`. Returns `None` when there is nothing
/// to resample.
///
/// Determinism: the interval is a pure function of `(samples, resamples, z,
/// seed state of rng)`.
pub fn bootstrap_interval<T, F>(
    samples: &[T],
    resamples: usize,
    z: f64,
    rng: &mut ChaCha8Rng,
    statistic: F,
) -> Option<Interval>
where
    F: Fn(&[&T]) -> f64,
{
    if samples.is_empty() || resamples == 0 {
        return None;
    }

    let mut values = Vec::with_capacity(resamples);
    let mut scratch: Vec<&T> = Vec::with_capacity(samples.len());
    for _ in 0..resamples {
        scratch.clear();
        for _ in 0..samples.len() {
            scratch.push(&samples[rng.gen_range(0..samples.len())]);
        }
        values.push(statistic(&scratch));
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let alpha = two_sided_alpha(z);
    let last = values.len() - 1;
    let lower_idx = ((alpha / 2.0) * last as f64).floor() as usize;
    let upper_idx = (((1.0 - alpha / 2.0) * last as f64).ceil() as usize).min(last);
    Some(Interval::new(values[lower_idx], values[upper_idx]))
}
