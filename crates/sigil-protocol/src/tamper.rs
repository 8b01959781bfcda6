//! Entanglement-based tamper detection
//!
//! The gateway and device share Bell pairs and measure them under the four
//! canonical CHSH setting combinations. The statistic
//! `S = E(a1,b1) − E(a1,b2) + E(a2,b1) + E(a2,b2)` stays within ±2 for any
//! classical (local hidden variable) source, so `S` above the classical
//! bound certifies that genuine entanglement survived the channel. Same-basis
//! fidelity catches degradation that CHSH alone can miss.
//!
//! The statistic decides only when its bootstrap confidence interval lies
//! entirely above the classical bound; a point estimate that merely grazes
//! the bound is not a violation.

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use sigil_core::{
    Circuit, CircuitBatch, DeviceSetting, EntanglementConfig, FidelityBasis, GatewaySetting,
    OutcomeCounts, ProtocolConfig, Result, SettingPair, SigilError, StatisticsConfig,
};
use sigil_stats::{bootstrap_interval, Interval};

use crate::Verdict;

/// Tsirelson's bound, the largest |S| quantum mechanics allows
pub const QUANTUM_BOUND: f64 = 2.0 * std::f64::consts::SQRT_2;

/// One Bell-pair trial: a setting combination and its outcome histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BellTrial {
    /// Setting combination the trial was measured under
    pub pair: SettingPair,
    /// Two-qubit outcome histogram, gateway bit first
    pub counts: OutcomeCounts,
}

/// Correlation of a two-qubit histogram: (same − different) / total
///
/// Counts only the four canonical labels; returns `None` when none of them
/// carry shots.
pub fn correlation(counts: &OutcomeCounts) -> Option<f64> {
    let same = counts.get("00") + counts.get("11");
    let diff = counts.get("01") + counts.get("10");
    let total = same + diff;
    if total == 0 {
        return None;
    }
    Some((same as f64 - diff as f64) / total as f64)
}

fn contribution_sign(pair: SettingPair) -> f64 {
    match (pair.gateway, pair.device) {
        (GatewaySetting::A1, DeviceSetting::B2) => -1.0,
        _ => 1.0,
    }
}

/// CHSH statistic over a set of trials
///
/// Shots are pooled per setting combination before the correlation is taken,
/// so repeated trials of a combination weigh by their shot counts. Returns
/// `None` when any of the four combinations has no shots, since S is
/// undefined on partial coverage.
pub fn chsh_s<'a, I>(trials: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a BellTrial>,
{
    let mut pooled: BTreeMap<SettingPair, (u64, u64)> = BTreeMap::new();
    for trial in trials {
        let same = trial.counts.get("00") + trial.counts.get("11");
        let diff = trial.counts.get("01") + trial.counts.get("10");
        let entry = pooled.entry(trial.pair).or_insert((0, 0));
        entry.0 += same;
        entry.1 += diff;
    }
    let mut s = 0.0;
    for pair in SettingPair::ALL {
        let (same, diff) = pooled.get(&pair).copied()?;
        let total = same + diff;
        if total == 0 {
            return None;
        }
        let correlation = (same as f64 - diff as f64) / total as f64;
        s += contribution_sign(pair) * correlation;
    }
    Some(s)
}

/// Pooled correlation of one setting combination, for audit records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    /// Setting combination
    pub pair: SettingPair,
    /// Pooled correlation across the combination's trials
    pub correlation: f64,
    /// Trials contributing to the pool
    pub trials: usize,
    /// Total shots in the pool
    pub shots: u64,
}

/// Per-combination correlations backing one CHSH statistic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correlations {
    /// One entry per measured setting combination, in canonical order
    pub pairs: Vec<PairCorrelation>,
}

impl Correlations {
    /// Correlation entry for a setting combination, if it was measured
    pub fn get(&self, pair: SettingPair) -> Option<&PairCorrelation> {
        self.pairs.iter().find(|entry| entry.pair == pair)
    }
}

/// CHSH statistic with its decision context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChshStatistic {
    /// Point estimate of S
    pub s: f64,
    /// Per-combination correlations behind the estimate
    pub correlations: Correlations,
    /// Bootstrap confidence interval; absent when resampling is disabled
    pub interval: Option<Interval>,
    /// Classical bound the statistic is tested against
    pub threshold: f64,
    /// Whether S and its interval clear the classical bound
    pub violates_classical_bound: bool,
}

/// Same-basis fidelity of one measurement basis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisFidelity {
    /// Measurement basis
    pub basis: FidelityBasis,
    /// Fraction of shots landing on correlated outcomes
    pub fidelity: f64,
    /// Shots behind the estimate
    pub shots: u64,
}

/// Same-basis fidelity across the measured bases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidelityReport {
    /// Per-basis estimates
    pub per_basis: Vec<BasisFidelity>,
    /// Mean of the per-basis estimates
    pub average: f64,
    /// Minimum acceptable average
    pub threshold: f64,
    /// Whether the average reached the threshold
    pub meets_threshold: bool,
}

/// Outcome of the tamper-check phase
///
/// `Inconclusive` means the data could not support a decision at all, for
/// example a setting combination with no shots. The orchestrator treats it
/// as a rejection; missing evidence never counts as safety.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperVerdict {
    /// Tagged decision
    pub verdict: Verdict,
    /// CHSH statistic, when computable
    pub chsh: Option<ChshStatistic>,
    /// Fidelity report, when computable
    pub fidelity: Option<FidelityReport>,
}

/// Planned tamper check
#[derive(Debug, Clone)]
pub struct TamperPlan {
    /// Setting combination per CHSH trial
    pub pairs: Vec<SettingPair>,
    /// Fidelity bases measured after the CHSH trials
    pub fidelity_bases: Vec<FidelityBasis>,
    /// Bell-pair circuits: CHSH trials first, fidelity circuits after
    pub batch: CircuitBatch,
}

impl TamperPlan {
    /// Number of histograms an evaluation expects
    pub fn expected_histograms(&self) -> usize {
        self.pairs.len() + self.fidelity_bases.len()
    }
}

/// Tamper-check phase engine
#[derive(Debug, Clone)]
pub struct TamperEngine {
    config: EntanglementConfig,
    statistics: StatisticsConfig,
}

impl TamperEngine {
    /// Build the engine from the protocol configuration
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            config: config.entanglement.clone(),
            statistics: config.statistics.clone(),
        }
    }

    /// Lay out the trial and fidelity circuits
    ///
    /// Trials cycle through the four setting combinations so coverage stays
    /// even. Fewer than four trials leaves a combination unmeasured and the
    /// evaluation inconclusive.
    pub fn plan(&self) -> TamperPlan {
        let pairs: Vec<SettingPair> = (0..self.config.trials)
            .map(|trial| SettingPair::ALL[trial % SettingPair::ALL.len()])
            .collect();
        let fidelity_bases = FidelityBasis::ALL.to_vec();
        let mut circuits: Vec<Circuit> = pairs
            .iter()
            .map(|pair| Circuit::BellPair {
                settings: pair.bell_settings(),
            })
            .collect();
        circuits.extend(fidelity_bases.iter().map(|basis| Circuit::BellPair {
            settings: basis.bell_settings(),
        }));
        TamperPlan {
            pairs,
            fidelity_bases,
            batch: CircuitBatch::new(circuits),
        }
    }

    /// Evaluate measured outcomes into a verdict
    ///
    /// `rng` drives only the bootstrap resampling of the CHSH interval.
    pub fn evaluate(
        &self,
        plan: &TamperPlan,
        outcomes: &[OutcomeCounts],
        rng: &mut ChaCha8Rng,
    ) -> Result<TamperVerdict> {
        if outcomes.len() != plan.expected_histograms() {
            return Err(SigilError::invalid_input(format!(
                "tamper check returned {} histograms for {} circuits",
                outcomes.len(),
                plan.expected_histograms()
            )));
        }
        if let Some(position) = outcomes.iter().position(|counts| counts.is_empty()) {
            return Err(SigilError::invalid_input(format!(
                "empty histogram at circuit {position}"
            )));
        }

        let split = plan.pairs.len();
        let trials: Vec<BellTrial> = plan
            .pairs
            .iter()
            .zip(&outcomes[..split])
            .map(|(pair, counts)| BellTrial {
                pair: *pair,
                counts: counts.clone(),
            })
            .collect();

        let chsh = self.chsh_statistic(&trials, rng);
        let fidelity = self.fidelity_report(&plan.fidelity_bases, &outcomes[split..]);
        let verdict = match (&chsh, &fidelity) {
            (Some(chsh), Some(fidelity)) => {
                if chsh.violates_classical_bound && fidelity.meets_threshold {
                    Verdict::Accepted
                } else {
                    Verdict::Rejected
                }
            }
            _ => Verdict::Inconclusive,
        };
        debug!(
            s = chsh.as_ref().map(|c| c.s).unwrap_or(f64::NAN),
            fidelity = fidelity.as_ref().map(|f| f.average).unwrap_or(f64::NAN),
            verdict = ?verdict,
            "tamper check evaluated"
        );
        Ok(TamperVerdict {
            verdict,
            chsh,
            fidelity,
        })
    }

    fn chsh_statistic(&self, trials: &[BellTrial], rng: &mut ChaCha8Rng) -> Option<ChshStatistic> {
        let s = chsh_s(trials)?;
        let correlations = pooled_correlations(trials);
        let interval = if self.statistics.resamples == 0 {
            None
        } else {
            // A resample can drop a whole setting combination; the full-sample
            // statistic stands in so the interval stays defined.
            bootstrap_interval(
                trials,
                self.statistics.resamples,
                self.statistics.z,
                rng,
                |sample| chsh_s(sample.iter().copied()).unwrap_or(s),
            )
        };
        let violates = s > self.config.chsh_threshold
            && interval.map_or(true, |ci| ci.lies_above(self.config.chsh_threshold));
        Some(ChshStatistic {
            s,
            correlations,
            interval,
            threshold: self.config.chsh_threshold,
            violates_classical_bound: violates,
        })
    }

    fn fidelity_report(
        &self,
        bases: &[FidelityBasis],
        outcomes: &[OutcomeCounts],
    ) -> Option<FidelityReport> {
        let mut per_basis = Vec::with_capacity(bases.len());
        for (basis, histogram) in bases.iter().zip(outcomes) {
            let same = histogram.get("00") + histogram.get("11");
            let total = same + histogram.get("01") + histogram.get("10");
            if total == 0 {
                return None;
            }
            per_basis.push(BasisFidelity {
                basis: *basis,
                fidelity: same as f64 / total as f64,
                shots: total,
            });
        }
        if per_basis.is_empty() {
            return None;
        }
        let average =
            per_basis.iter().map(|entry| entry.fidelity).sum::<f64>() / per_basis.len() as f64;
        Some(FidelityReport {
            per_basis,
            average,
            threshold: self.config.fidelity_threshold,
            meets_threshold: average >= self.config.fidelity_threshold,
        })
    }
}

fn pooled_correlations(trials: &[BellTrial]) -> Correlations {
    let pairs = SettingPair::ALL
        .iter()
        .filter_map(|pair| {
            let mut same = 0u64;
            let mut diff = 0u64;
            let mut count = 0usize;
            for trial in trials.iter().filter(|trial| trial.pair == *pair) {
                same += trial.counts.get("00") + trial.counts.get("11");
                diff += trial.counts.get("01") + trial.counts.get("10");
                count += 1;
            }
            let total = same + diff;
            if total == 0 {
                return None;
            }
            Some(PairCorrelation {
                pair: *pair,
                correlation: (same as f64 - diff as f64) / total as f64,
                trials: count,
                shots: total,
            })
        })
        .collect();
    Correlations { pairs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn engine() -> TamperEngine {
        TamperEngine::new(&ProtocolConfig::default())
    }

    fn correlated_counts(e: f64, shots: u64) -> OutcomeCounts {
        let same = ((1.0 + e) / 2.0 * shots as f64).round() as u64;
        let diff = shots - same;
        let mut counts = OutcomeCounts::new();
        counts.record("00", same / 2);
        counts.record("11", same - same / 2);
        counts.record("01", diff / 2);
        counts.record("10", diff - diff / 2);
        counts
    }

    /// Outcomes for an engine-built plan, with per-circuit correlations given
    /// by `chsh_e` for trials and `fidelity_e` for the fidelity circuits.
    fn outcomes_for(
        plan: &TamperPlan,
        shots: u64,
        chsh_e: impl Fn(SettingPair) -> f64,
        fidelity_e: impl Fn(FidelityBasis) -> f64,
    ) -> Vec<OutcomeCounts> {
        let mut outcomes: Vec<OutcomeCounts> = plan
            .pairs
            .iter()
            .map(|pair| correlated_counts(chsh_e(*pair), shots))
            .collect();
        outcomes.extend(
            plan.fidelity_bases
                .iter()
                .map(|basis| correlated_counts(fidelity_e(*basis), shots)),
        );
        outcomes
    }

    fn ideal_e(pair: SettingPair) -> f64 {
        let settings = pair.bell_settings();
        (settings.gateway_angle - settings.device_angle).cos()
    }

    #[test]
    fn test_ideal_source_reaches_the_quantum_bound() {
        let engine = engine();
        let plan = engine.plan();
        let outcomes = outcomes_for(&plan, 4096, ideal_e, |_| 0.98);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let verdict = engine.evaluate(&plan, &outcomes, &mut rng).unwrap();
        let chsh = verdict.chsh.unwrap();
        assert!((chsh.s - QUANTUM_BOUND).abs() < 0.01, "S = {}", chsh.s);
        assert!(chsh.violates_classical_bound);
        assert_eq!(verdict.verdict, Verdict::Accepted);
    }

    #[test]
    fn test_classically_correlated_source_stays_below_the_bound() {
        // Product correlations cos(g)·cos(d) are the signature of a
        // separable source: S collapses to √2 and XX fidelity to 1/2.
        let engine = engine();
        let plan = engine.plan();
        let classical = |pair: SettingPair| {
            let settings = pair.bell_settings();
            settings.gateway_angle.cos() * settings.device_angle.cos()
        };
        let classical_fidelity = |basis: FidelityBasis| {
            let settings = basis.bell_settings();
            settings.gateway_angle.cos() * settings.device_angle.cos()
        };
        let outcomes = outcomes_for(&plan, 4096, classical, classical_fidelity);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let verdict = engine.evaluate(&plan, &outcomes, &mut rng).unwrap();
        let chsh = verdict.chsh.unwrap();
        assert!(
            (chsh.s - std::f64::consts::SQRT_2).abs() < 0.01,
            "S = {}",
            chsh.s
        );
        assert!(!chsh.violates_classical_bound);
        let fidelity = verdict.fidelity.unwrap();
        assert!((fidelity.average - 0.75).abs() < 0.01);
        assert!(!fidelity.meets_threshold);
        assert_eq!(verdict.verdict, Verdict::Rejected);
    }

    #[test]
    fn test_borderline_violation_with_tight_interval_accepts() {
        // Identical per-combination histograms make the bootstrap
        // distribution degenerate, so the interval pins to S itself.
        let engine = engine();
        let plan = engine.plan();
        let outcomes = outcomes_for(
            &plan,
            4096,
            |pair| contribution_sign(pair) * 0.6225,
            |_| 0.98,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let verdict = engine.evaluate(&plan, &outcomes, &mut rng).unwrap();
        let chsh = verdict.chsh.unwrap();
        assert!((chsh.s - 2.49).abs() < 0.005, "S = {}", chsh.s);
        let interval = chsh.interval.unwrap();
        assert!(interval.lies_above(2.0));
        assert!(chsh.violates_classical_bound);
        assert_eq!(verdict.verdict, Verdict::Accepted);
    }

    #[test]
    fn test_sub_classical_statistic_rejects_despite_good_fidelity() {
        let engine = engine();
        let plan = engine.plan();
        let outcomes = outcomes_for(
            &plan,
            4096,
            |pair| contribution_sign(pair) * 0.45,
            |_| 0.98,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let verdict = engine.evaluate(&plan, &outcomes, &mut rng).unwrap();
        let chsh = verdict.chsh.unwrap();
        assert!((chsh.s - 1.8).abs() < 0.005, "S = {}", chsh.s);
        assert!(!chsh.violates_classical_bound);
        assert_eq!(verdict.verdict, Verdict::Rejected);
    }

    #[test]
    fn test_low_fidelity_rejects_despite_chsh_violation() {
        let engine = engine();
        let plan = engine.plan();
        let fidelity_e = |basis: FidelityBasis| match basis {
            FidelityBasis::ZZ => 1.0,
            FidelityBasis::XX => 0.0,
        };
        let outcomes = outcomes_for(&plan, 4096, ideal_e, fidelity_e);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let verdict = engine.evaluate(&plan, &outcomes, &mut rng).unwrap();
        assert!(verdict.chsh.unwrap().violates_classical_bound);
        let fidelity = verdict.fidelity.unwrap();
        assert!((fidelity.average - 0.75).abs() < 1e-9);
        assert!(!fidelity.meets_threshold);
        assert_eq!(verdict.verdict, Verdict::Rejected);
    }

    #[test]
    fn test_missing_setting_pair_is_inconclusive() {
        let engine = engine();
        let pairs = vec![SettingPair::ALL[0]; 8];
        let plan = TamperPlan {
            pairs: pairs.clone(),
            fidelity_bases: FidelityBasis::ALL.to_vec(),
            batch: CircuitBatch::default(),
        };
        let mut outcomes: Vec<OutcomeCounts> = pairs
            .iter()
            .map(|_| correlated_counts(0.7, 1024))
            .collect();
        outcomes.push(correlated_counts(0.98, 1024));
        outcomes.push(correlated_counts(0.98, 1024));
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let verdict = engine.evaluate(&plan, &outcomes, &mut rng).unwrap();
        assert_eq!(verdict.verdict, Verdict::Inconclusive);
        assert!(verdict.chsh.is_none());
        assert!(verdict.fidelity.is_some());
        assert!(!verdict.verdict.is_accepted());
    }

    #[test]
    fn test_uncounted_fidelity_labels_are_inconclusive() {
        let engine = engine();
        let plan = engine.plan();
        let mut outcomes = outcomes_for(&plan, 4096, ideal_e, |_| 0.98);
        let mut junk = OutcomeCounts::new();
        junk.record("0110", 4096);
        let last = outcomes.len() - 1;
        outcomes[last] = junk;
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let verdict = engine.evaluate(&plan, &outcomes, &mut rng).unwrap();
        assert_eq!(verdict.verdict, Verdict::Inconclusive);
        assert!(verdict.fidelity.is_none());
    }

    #[test]
    fn test_same_seed_reproduces_the_statistic() {
        let engine = engine();
        let plan = engine.plan();
        let outcomes = outcomes_for(&plan, 1024, ideal_e, |_| 0.97);
        let mut first_rng = ChaCha8Rng::seed_from_u64(21);
        let mut second_rng = ChaCha8Rng::seed_from_u64(21);
        let first = engine.evaluate(&plan, &outcomes, &mut first_rng).unwrap();
        let second = engine.evaluate(&plan, &outcomes, &mut second_rng).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_covers_all_pairs_evenly() {
        let engine = engine();
        let plan = engine.plan();
        assert_eq!(plan.pairs.len(), 50);
        assert_eq!(plan.fidelity_bases, FidelityBasis::ALL.to_vec());
        assert_eq!(plan.batch.len(), 52);
        for pair in SettingPair::ALL {
            let count = plan.pairs.iter().filter(|p| **p == pair).count();
            assert!((12..=13).contains(&count), "pair {pair}: {count} trials");
        }
        assert!(plan
            .batch
            .iter()
            .all(|circuit| matches!(circuit, Circuit::BellPair { .. })));
    }

    #[test]
    fn test_histogram_count_mismatch_is_an_input_error() {
        let engine = engine();
        let plan = engine.plan();
        let outcomes = outcomes_for(&plan, 1024, ideal_e, |_| 0.98);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let err = engine
            .evaluate(&plan, &outcomes[..outcomes.len() - 1], &mut rng)
            .unwrap_err();
        assert!(matches!(err, SigilError::InvalidInput { .. }));
    }

    #[test]
    fn test_empty_histogram_is_an_input_error() {
        let engine = engine();
        let plan = engine.plan();
        let mut outcomes = outcomes_for(&plan, 1024, ideal_e, |_| 0.98);
        outcomes[3] = OutcomeCounts::new();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let err = engine.evaluate(&plan, &outcomes, &mut rng).unwrap_err();
        assert!(matches!(err, SigilError::InvalidInput { .. }));
    }

    #[test]
    fn test_correlation_extremes() {
        let mut perfect = OutcomeCounts::new();
        perfect.record("00", 512);
        perfect.record("11", 512);
        assert!((correlation(&perfect).unwrap() - 1.0).abs() < 1e-12);

        let mut anti = OutcomeCounts::new();
        anti.record("01", 512);
        anti.record("10", 512);
        assert!((correlation(&anti).unwrap() + 1.0).abs() < 1e-12);

        assert!(correlation(&OutcomeCounts::new()).is_none());
    }

    proptest! {
        #[test]
        fn prop_chsh_magnitude_never_exceeds_four(
            shots in proptest::collection::vec((0u64..10_000, 0u64..10_000), 4)
        ) {
            let trials: Vec<BellTrial> = SettingPair::ALL
                .iter()
                .zip(&shots)
                .map(|(pair, (same, diff))| {
                    let mut counts = OutcomeCounts::new();
                    counts.record("00", *same);
                    counts.record("01", *diff);
                    BellTrial { pair: *pair, counts }
                })
                .collect();
            if let Some(s) = chsh_s(&trials) {
                prop_assert!(s.abs() <= 4.0 + 1e-9);
            }
        }
    }
}
