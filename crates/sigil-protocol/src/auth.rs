//! Challenge-response device authentication
//!
//! The gateway asks the device to reproduce its registered reference states:
//! one prepare-and-measure circuit per reference element, prepared and
//! measured in the reference basis. An honest device with the right identity
//! material reproduces the expected bit every round (up to channel noise); an
//! impostor without the reference cannot beat chance in the rounds whose
//! basis it guesses wrong.
//!
//! The engine is pure: [`AuthenticationEngine::plan`] emits the challenge
//! batch, [`AuthenticationEngine::evaluate`] turns the outcome histograms
//! into a verdict. The device identity is never mutated here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use sigil_core::{
    AuthenticationConfig, Circuit, CircuitBatch, DeviceIdentity, OutcomeCounts, ProtocolConfig,
    Result, SigilError, StatisticsConfig,
};
use sigil_stats::{Interval, Proportion};

use crate::Verdict;

/// Planned authentication challenge: one circuit per reference element
#[derive(Debug, Clone)]
pub struct AuthenticationPlan {
    /// Challenge circuits, in reference order
    pub batch: CircuitBatch,
}

/// Agreement statistics for one authentication challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementReport {
    /// Challenge rounds evaluated
    pub rounds: usize,
    /// Rounds whose decoded bit matched the reference
    pub matches: usize,
    /// Agreement rate
    pub agreement: f64,
    /// Wilson confidence interval on the agreement rate
    pub interval: Interval,
    /// Acceptance bound: agreement must reach 1 − threshold
    pub min_agreement: f64,
}

/// Outcome of the authentication phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationVerdict {
    /// Tagged decision
    pub verdict: Verdict,
    /// The statistics that produced it
    pub report: AgreementReport,
}

/// Authentication phase engine
#[derive(Debug, Clone)]
pub struct AuthenticationEngine {
    config: AuthenticationConfig,
    statistics: StatisticsConfig,
}

impl AuthenticationEngine {
    /// Build the engine from the protocol configuration
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            config: config.authentication.clone(),
            statistics: config.statistics.clone(),
        }
    }

    /// Build the challenge batch for a device
    ///
    /// Every reference element becomes one circuit that prepares the
    /// expected bit in the reference basis and measures in that same basis.
    pub fn plan(&self, identity: &DeviceIdentity) -> Result<AuthenticationPlan> {
        if identity.reference.is_empty() {
            return Err(SigilError::invalid_input(format!(
                "device {} has an empty reference sequence",
                identity.device_id
            )));
        }
        let circuits = identity
            .reference
            .iter()
            .map(|preparation| Circuit::PrepareMeasure {
                prepare: *preparation,
                measure_basis: preparation.basis,
            })
            .collect();
        Ok(AuthenticationPlan {
            batch: CircuitBatch::new(circuits),
        })
    }

    /// Evaluate challenge outcomes against the reference
    ///
    /// The outcome sequence must be exactly as long as the reference;
    /// anything else is a hard input error, not a statistical rejection.
    pub fn evaluate(
        &self,
        identity: &DeviceIdentity,
        outcomes: &[OutcomeCounts],
    ) -> Result<AuthenticationVerdict> {
        let rounds = identity.reference.len();
        if rounds == 0 {
            return Err(SigilError::invalid_input(
                "cannot evaluate an empty reference sequence",
            ));
        }
        if outcomes.len() != rounds {
            return Err(SigilError::invalid_input(format!(
                "challenge returned {} outcomes for {} reference rounds",
                outcomes.len(),
                rounds
            )));
        }

        let mut matches = 0usize;
        for (round, (preparation, counts)) in
            identity.reference.iter().zip(outcomes.iter()).enumerate()
        {
            let decoded = counts.majority_bit().ok_or_else(|| {
                SigilError::invalid_input(format!("empty histogram in challenge round {round}"))
            })?;
            if decoded == preparation.bit {
                matches += 1;
            }
        }

        let proportion = Proportion::new(matches as u64, rounds as u64);
        let min_agreement = 1.0 - self.config.threshold;
        let report = AgreementReport {
            rounds,
            matches,
            agreement: proportion.point(),
            interval: proportion.wilson(self.statistics.z),
            min_agreement,
        };
        let verdict = if proportion.meets_min(min_agreement) {
            Verdict::Accepted
        } else {
            Verdict::Rejected
        };
        debug!(
            device = %identity.device_id,
            matches,
            rounds,
            agreement = report.agreement,
            min_agreement,
            "authentication challenge evaluated"
        );
        Ok(AuthenticationVerdict { verdict, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::Basis;

    fn test_identity(rounds: usize) -> DeviceIdentity {
        DeviceIdentity::derive("Device01", "IIoT-SN-1001", "test-secret", rounds)
    }

    fn engine() -> AuthenticationEngine {
        AuthenticationEngine::new(&ProtocolConfig::default())
    }

    /// Histograms an honest device produces: all shots on the expected bit.
    fn honest_outcomes(identity: &DeviceIdentity, shots: u64) -> Vec<OutcomeCounts> {
        identity
            .reference
            .iter()
            .map(|preparation| {
                let mut counts = OutcomeCounts::new();
                counts.record(if preparation.bit { "1" } else { "0" }, shots);
                counts
            })
            .collect()
    }

    #[test]
    fn test_exact_reference_match_is_accepted() {
        let identity = test_identity(100);
        let outcomes = honest_outcomes(&identity, 1024);
        let verdict = engine().evaluate(&identity, &outcomes).unwrap();
        assert_eq!(verdict.verdict, Verdict::Accepted);
        assert_eq!(verdict.report.matches, 100);
        assert!((verdict.report.agreement - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_agreement_exactly_at_bound_is_accepted() {
        // threshold 0.05 over 100 rounds: 95 matches sit exactly on the bound.
        let identity = test_identity(100);
        let mut outcomes = honest_outcomes(&identity, 1024);
        for (preparation, counts) in identity.reference.iter().zip(outcomes.iter_mut()).take(5) {
            *counts = OutcomeCounts::new();
            counts.record(if preparation.bit { "0" } else { "1" }, 1024);
        }
        let verdict = engine().evaluate(&identity, &outcomes).unwrap();
        assert_eq!(verdict.verdict, Verdict::Accepted);
        assert!((verdict.report.agreement - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_agreement_below_bound_is_rejected() {
        let identity = test_identity(100);
        let mut outcomes = honest_outcomes(&identity, 1024);
        for (preparation, counts) in identity.reference.iter().zip(outcomes.iter_mut()).take(6) {
            *counts = OutcomeCounts::new();
            counts.record(if preparation.bit { "0" } else { "1" }, 1024);
        }
        let verdict = engine().evaluate(&identity, &outcomes).unwrap();
        assert_eq!(verdict.verdict, Verdict::Rejected);
        assert_eq!(verdict.report.matches, 94);
    }

    #[test]
    fn test_length_mismatch_is_an_input_error() {
        let identity = test_identity(100);
        let mut outcomes = honest_outcomes(&identity, 1024);
        outcomes.pop();
        let err = engine().evaluate(&identity, &outcomes).unwrap_err();
        assert!(matches!(err, SigilError::InvalidInput { .. }));
    }

    #[test]
    fn test_empty_reference_is_an_input_error() {
        let mut identity = test_identity(10);
        identity.reference.clear();
        assert!(engine().plan(&identity).is_err());
        assert!(engine().evaluate(&identity, &[]).is_err());
    }

    #[test]
    fn test_plan_prepares_and_measures_in_the_reference_basis() {
        let identity = test_identity(64);
        let plan = engine().plan(&identity).unwrap();
        assert_eq!(plan.batch.len(), 64);
        for (circuit, preparation) in plan.batch.iter().zip(identity.reference.iter()) {
            match circuit {
                Circuit::PrepareMeasure {
                    prepare,
                    measure_basis,
                } => {
                    assert_eq!(prepare, preparation);
                    assert_eq!(*measure_basis, preparation.basis);
                }
                Circuit::BellPair { .. } => panic!("authentication never plans Bell pairs"),
            }
        }
        assert!(identity
            .reference
            .iter()
            .any(|p| p.basis == Basis::Diagonal));
    }
}
