//! Sigil Stats - statistical machinery behind protocol verdicts
//!
//! Every accept/reject decision in the protocol reduces to comparing an
//! estimate against a configured threshold. This crate supplies the
//! estimates: binomial proportions with Wilson and normal-approximation
//! confidence intervals, and a seeded percentile bootstrap for statistics
//! without a closed-form interval (the CHSH S-value).
//!
//! Two properties the callers rely on:
//!
//! - Point estimates are pure functions of the data; no RNG touches them.
//! - Interval computations that resample are driven by a caller-supplied
//!   seeded generator, so re-running with the same seed reproduces the
//!   interval bit for bit.

#![forbid(unsafe_code)]

/// Binomial proportions and analytic confidence intervals
pub mod proportion;

/// Seeded percentile bootstrap
pub mod bootstrap;

pub use bootstrap::{bootstrap_interval, two_sided_alpha};
pub use proportion::{Interval, Proportion, DEFAULT_Z};
