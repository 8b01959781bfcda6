//! Analytic circuit simulator
//!
//! Outcome distributions are computed in closed form and histograms are
//! sampled shot by shot from a seeded generator, so runs are reproducible
//! and there is no state-vector machinery to maintain.
//!
//! Noise model: a depolarizing channel applied per circuit (probability
//! `depolarizing` of replacing the state with the maximally mixed one) and
//! an independent readout flip per measured qubit (probability `readout`).
//! For Bell pairs both effects act on the correlation directly:
//! `E = cos(Δ) · (1 − depolarizing) · (1 − 2·readout)²`.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use sigil_core::{BackendError, Circuit, CircuitBatch, ExecutionEffects, NoiseConfig, OutcomeCounts};

const IDEAL_NOISE: NoiseConfig = NoiseConfig {
    depolarizing: 0.0,
    readout: 0.0,
};

/// Seeded analytic simulator, ideal or noisy
pub struct SimulatorBackend {
    noise: NoiseConfig,
    rng: Mutex<ChaCha8Rng>,
    name: &'static str,
}

impl SimulatorBackend {
    /// Noise-free simulator seeded from entropy
    pub fn ideal() -> Self {
        Self::build(IDEAL_NOISE, ChaCha8Rng::from_entropy(), "simulator")
    }

    /// Noise-free simulator with a fixed seed
    pub fn ideal_seeded(seed: u64) -> Self {
        Self::build(IDEAL_NOISE, ChaCha8Rng::seed_from_u64(seed), "simulator")
    }

    /// Noisy simulator seeded from entropy
    pub fn noisy(noise: NoiseConfig) -> Self {
        Self::build(noise, ChaCha8Rng::from_entropy(), "noisy-simulator")
    }

    /// Noisy simulator with a fixed seed
    pub fn noisy_seeded(noise: NoiseConfig, seed: u64) -> Self {
        Self::build(noise, ChaCha8Rng::seed_from_u64(seed), "noisy-simulator")
    }

    fn build(noise: NoiseConfig, rng: ChaCha8Rng, name: &'static str) -> Self {
        Self {
            noise,
            rng: Mutex::new(rng),
            name,
        }
    }

    fn execute(&self, circuit: &Circuit, shots: u32, rng: &mut ChaCha8Rng) -> OutcomeCounts {
        match circuit {
            Circuit::PrepareMeasure {
                prepare,
                measure_basis,
            } => {
                let aligned = prepare.basis == *measure_basis;
                // Mismatched bases give a coin flip; depolarizing cannot
                // make that worse.
                let state_correct = if aligned {
                    1.0 - self.noise.depolarizing * 0.5
                } else {
                    0.5
                };
                let correct = state_correct * (1.0 - self.noise.readout)
                    + (1.0 - state_correct) * self.noise.readout;
                let p_one = if prepare.bit { correct } else { 1.0 - correct };
                sample_bit(rng, p_one, shots)
            }
            Circuit::BellPair { settings } => {
                let delta = settings.gateway_angle - settings.device_angle;
                let readout = 1.0 - 2.0 * self.noise.readout;
                let correlation = delta.cos() * (1.0 - self.noise.depolarizing) * readout * readout;
                sample_pair(rng, correlation, shots)
            }
        }
    }
}

#[async_trait]
impl ExecutionEffects for SimulatorBackend {
    async fn submit(
        &self,
        batch: &CircuitBatch,
        shots: u32,
    ) -> Result<Vec<OutcomeCounts>, BackendError> {
        if shots == 0 {
            return Err(BackendError::InvalidCircuit {
                reason: "shots must be positive".to_string(),
            });
        }
        let mut rng = self.rng.lock();
        trace!(circuits = batch.len(), shots, backend = self.name, "executing batch");
        Ok(batch
            .iter()
            .map(|circuit| self.execute(circuit, shots, &mut rng))
            .collect())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Sample a single-qubit histogram with the given probability of `"1"`
pub(crate) fn sample_bit(rng: &mut ChaCha8Rng, p_one: f64, shots: u32) -> OutcomeCounts {
    let p_one = p_one.clamp(0.0, 1.0);
    let mut ones = 0u64;
    for _ in 0..shots {
        if rng.gen_bool(p_one) {
            ones += 1;
        }
    }
    let mut counts = OutcomeCounts::new();
    if ones > 0 {
        counts.record("1", ones);
    }
    if u64::from(shots) > ones {
        counts.record("0", u64::from(shots) - ones);
    }
    counts
}

/// Sample a two-qubit histogram with the given correlation
///
/// Outcome probabilities are `(1 + E) / 4` for the correlated labels and
/// `(1 − E) / 4` for the anticorrelated ones.
pub(crate) fn sample_pair(rng: &mut ChaCha8Rng, correlation: f64, shots: u32) -> OutcomeCounts {
    let correlation = correlation.clamp(-1.0, 1.0);
    let p_same = (1.0 + correlation) / 4.0;
    let p_diff = (1.0 - correlation) / 4.0;
    let cumulative = [p_same, p_same + p_diff, p_same + p_diff + p_diff];
    let mut bins = [0u64; 4];
    for _ in 0..shots {
        let draw = rng.gen::<f64>();
        let bin = if draw < cumulative[0] {
            0
        } else if draw < cumulative[1] {
            1
        } else if draw < cumulative[2] {
            2
        } else {
            3
        };
        bins[bin] += 1;
    }
    let mut counts = OutcomeCounts::new();
    for (label, bin) in ["00", "01", "10", "11"].iter().zip(bins) {
        if bin > 0 {
            counts.record(*label, bin);
        }
    }
    counts
}
