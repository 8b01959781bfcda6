//! BB84 key distribution
//!
//! The device transmits random bits in random bases; the gateway measures in
//! its own random bases. Sifting keeps the positions where the bases agree,
//! a random test fraction of the sifted bits is sacrificed to estimate the
//! quantum bit error rate, and the session continues only while the QBER
//! stays below the configured threshold. Revealed test bits never become key
//! material.
//!
//! Basis reconciliation is structural here: the plan fixes both parties'
//! bases before submission, and the backend never sees the gateway's bases
//! ahead of measurement, so no late choice can bias the sift.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use sigil_core::{
    Basis, Bb84Config, Circuit, CircuitBatch, OutcomeCounts, Preparation, ProtocolConfig,
    Provenance, RawOutcome, Result, SiftedBit, SigilError, StatisticsConfig,
};
use sigil_stats::{Interval, Proportion};

use crate::Verdict;

/// Ordered bits retained where both parties used the same basis
///
/// Every entry records the raw transmission index it came from, so each
/// sifted bit traces to exactly one raw outcome and order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiftedKeyMaterial {
    /// Retained bits in transmission order
    pub bits: Vec<SiftedBit>,
}

impl SiftedKeyMaterial {
    /// Number of retained bits
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether nothing survived the sift
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

/// Keep the positions where sender and receiver bases agree
///
/// Output order follows input order, and discarded positions leave no trace
/// beyond the gap in `source_index`.
pub fn sift(raw: &[RawOutcome]) -> SiftedKeyMaterial {
    let bits = raw
        .iter()
        .enumerate()
        .filter(|(_, outcome)| outcome.bases_match())
        .map(|(source_index, outcome)| SiftedBit {
            source_index,
            sent: outcome.sent.bit,
            measured: outcome.measured_bit,
        })
        .collect();
    SiftedKeyMaterial { bits }
}

/// QBER statistics for one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QberReport {
    /// Positions that survived the sift
    pub sifted_len: usize,
    /// Sifted bits revealed for error estimation
    pub test_size: usize,
    /// Revealed bits that disagreed
    pub errors: usize,
    /// Error rate point estimate
    pub qber: f64,
    /// Wilson confidence interval on the error rate
    pub interval: Interval,
    /// Rejection bound: QBER at or above this value fails the phase
    pub threshold: f64,
    /// Whether the point estimate stayed strictly below the bound
    pub within_threshold: bool,
}

/// Final key bits; redacted from Debug output and never serialized
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    bits: Vec<bool>,
}

impl KeyMaterial {
    fn new(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Key length in bits
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the key is empty
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Raw key bits
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial({} bits)", self.bits.len())
    }
}

/// Outcome of the key-distribution phase
#[derive(Debug, Clone)]
pub struct QkdVerdict {
    /// Tagged decision
    pub verdict: Verdict,
    /// The statistics that produced it
    pub report: QberReport,
    /// Final key material, present only on acceptance
    pub key: Option<KeyMaterial>,
}

/// Planned BB84 exchange
///
/// `batch` carries the transmissions for the backend; the basis and bit
/// vectors stay gateway-side for sifting and comparison after measurement.
#[derive(Debug, Clone)]
pub struct Bb84Plan {
    /// Bits the device encodes
    pub device_bits: Vec<bool>,
    /// Bases the device encodes in
    pub device_bases: Vec<Basis>,
    /// Bases the gateway measures in
    pub gateway_bases: Vec<Basis>,
    /// Transmission circuits, one per position
    pub batch: CircuitBatch,
}

impl Bb84Plan {
    /// Number of transmitted positions
    pub fn len(&self) -> usize {
        self.device_bits.len()
    }

    /// Whether the plan transmits nothing
    pub fn is_empty(&self) -> bool {
        self.device_bits.is_empty()
    }
}

/// Key-distribution phase engine
#[derive(Debug, Clone)]
pub struct KeyDistributionEngine {
    config: Bb84Config,
    statistics: StatisticsConfig,
}

impl KeyDistributionEngine {
    /// Build the engine from the protocol configuration
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            config: config.bb84.clone(),
            statistics: config.statistics.clone(),
        }
    }

    /// Raw positions to transmit for the configured key length
    ///
    /// Sifting keeps ~1/2, the test sample removes `test_fraction`, and
    /// privacy amplification halves what is left; a 1.2 margin absorbs
    /// sampling variance.
    pub fn raw_length(&self) -> usize {
        let yield_rate = 0.5 * (1.0 - self.config.test_fraction) * 0.5;
        ((self.config.key_length as f64) * 1.2 / yield_rate).ceil() as usize
    }

    /// Draw a fresh exchange plan
    ///
    /// Bits and bases are independent and uniform per position, on both
    /// sides.
    pub fn plan(&self, rng: &mut ChaCha8Rng) -> Bb84Plan {
        let length = self.raw_length();
        let mut device_bits = Vec::with_capacity(length);
        let mut device_bases = Vec::with_capacity(length);
        let mut gateway_bases = Vec::with_capacity(length);
        let mut circuits = Vec::with_capacity(length);
        for _ in 0..length {
            let bit = rng.gen_bool(0.5);
            let device_basis = Basis::sample(rng);
            let gateway_basis = Basis::sample(rng);
            device_bits.push(bit);
            device_bases.push(device_basis);
            gateway_bases.push(gateway_basis);
            circuits.push(Circuit::PrepareMeasure {
                prepare: Preparation::new(bit, device_basis),
                measure_basis: gateway_basis,
            });
        }
        Bb84Plan {
            device_bits,
            device_bases,
            gateway_bases,
            batch: CircuitBatch::new(circuits),
        }
    }

    /// Uniform, value-independent sample of sifted positions to reveal
    ///
    /// Returns sorted indices into the sifted sequence. At least one bit is
    /// revealed whenever the sift is non-empty.
    pub fn sample_test_indices(
        sifted_len: usize,
        test_fraction: f64,
        rng: &mut ChaCha8Rng,
    ) -> Vec<usize> {
        if sifted_len == 0 {
            return Vec::new();
        }
        let amount = ((sifted_len as f64) * test_fraction).floor() as usize;
        let amount = amount.clamp(1, sifted_len);
        let mut indices = rand::seq::index::sample(rng, sifted_len, amount).into_vec();
        indices.sort_unstable();
        indices
    }

    /// Evaluate measured outcomes into a verdict
    ///
    /// The first randomness drawn from `rng` is the test-position sample,
    /// which is the only random choice this evaluation makes.
    pub fn evaluate(
        &self,
        plan: &Bb84Plan,
        outcomes: &[OutcomeCounts],
        rng: &mut ChaCha8Rng,
    ) -> Result<QkdVerdict> {
        let raw = self.assemble_raw(plan, outcomes)?;
        let sifted = sift(&raw);
        if sifted.is_empty() {
            warn!("no positions survived sifting; rejecting the exchange");
            return Ok(QkdVerdict {
                verdict: Verdict::Rejected,
                report: QberReport {
                    sifted_len: 0,
                    test_size: 0,
                    errors: 0,
                    qber: 1.0,
                    interval: Interval::new(0.0, 1.0),
                    threshold: self.config.qber_threshold,
                    within_threshold: false,
                },
                key: None,
            });
        }

        let test_indices =
            Self::sample_test_indices(sifted.len(), self.config.test_fraction, rng);
        let mut revealed = vec![false; sifted.len()];
        for &index in &test_indices {
            revealed[index] = true;
        }
        let errors = test_indices
            .iter()
            .filter(|&&index| sifted.bits[index].sent != sifted.bits[index].measured)
            .count();

        let proportion = Proportion::new(errors as u64, test_indices.len() as u64);
        let within_threshold = proportion.below_max(self.config.qber_threshold);
        let report = QberReport {
            sifted_len: sifted.len(),
            test_size: test_indices.len(),
            errors,
            qber: proportion.point(),
            interval: proportion.wilson(self.statistics.z),
            threshold: self.config.qber_threshold,
            within_threshold,
        };
        debug!(
            sifted = report.sifted_len,
            tested = report.test_size,
            errors = report.errors,
            qber = report.qber,
            threshold = report.threshold,
            "error estimation complete"
        );

        if !within_threshold {
            return Ok(QkdVerdict {
                verdict: Verdict::Rejected,
                report,
                key: None,
            });
        }

        // Test bits are burned whatever the verdict; the key comes from the
        // unrevealed remainder of the device's bits.
        let remaining: Vec<bool> = sifted
            .bits
            .iter()
            .enumerate()
            .filter(|(index, _)| !revealed[*index])
            .map(|(_, bit)| bit.sent)
            .collect();
        let mut key_bits = amplify(&remaining);
        if key_bits.len() < self.config.key_length {
            warn!(
                available = key_bits.len(),
                requested = self.config.key_length,
                "amplified key shorter than requested length"
            );
        }
        key_bits.truncate(self.config.key_length);

        Ok(QkdVerdict {
            verdict: Verdict::Accepted,
            report,
            key: Some(KeyMaterial::new(key_bits)),
        })
    }

    /// Decode histograms into raw outcomes, pairing them with the plan
    fn assemble_raw(&self, plan: &Bb84Plan, outcomes: &[OutcomeCounts]) -> Result<Vec<RawOutcome>> {
        if outcomes.len() != plan.len() {
            return Err(SigilError::invalid_input(format!(
                "exchange returned {} outcomes for {} transmitted positions",
                outcomes.len(),
                plan.len()
            )));
        }
        plan.device_bits
            .iter()
            .zip(plan.device_bases.iter())
            .zip(plan.gateway_bases.iter())
            .zip(outcomes.iter())
            .enumerate()
            .map(|(position, (((bit, device_basis), gateway_basis), counts))| {
                let measured_bit = counts.majority_bit().ok_or_else(|| {
                    SigilError::invalid_input(format!("empty histogram at position {position}"))
                })?;
                Ok(RawOutcome {
                    sent: Preparation::new(*bit, *device_basis),
                    measured_basis: *gateway_basis,
                    measured_bit,
                    provenance: Provenance::Benign,
                })
            })
            .collect()
    }
}

/// Privacy amplification by decimation: keep every other bit
fn amplify(bits: &[bool]) -> Vec<bool> {
    bits.iter().copied().step_by(2).collect()
}
