//! Simulated channel adversaries
//!
//! Adversaries are decorators over an inner execution backend. They corrupt
//! the submitted circuits or the returned histograms the way a real channel
//! attack would corrupt transmissions, and the protocol layers see nothing
//! but ordinary outcome statistics. Detection is therefore purely
//! statistical, exactly as it would be against a live attacker.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use sigil_core::{
    BackendError, Basis, Circuit, CircuitBatch, ExecutionEffects, OutcomeCounts, Preparation,
    SigilError,
};

use crate::simulator::sample_pair;

/// Intercept-resend eavesdropper on prepare-and-measure transmissions
///
/// Eve measures each intercepted qubit in a randomly chosen basis and
/// re-prepares what she observed. When her basis matches the sender's the
/// state passes unharmed; when it does not, the re-prepared state carries a
/// random bit in the wrong basis. Full interception raises the sifted error
/// rate to 1/4, which both the authentication agreement and the QBER
/// threshold catch with wide margins.
///
/// `skipping` models an eavesdropper who joins the channel late: the first
/// `n` prepare-and-measure circuits pass untouched. Bell-pair circuits are
/// never touched by this attack.
pub struct InterceptResendAttack {
    inner: Arc<dyn ExecutionEffects>,
    intercept_fraction: f64,
    skip_circuits: usize,
    seen: Mutex<usize>,
    rng: Mutex<ChaCha8Rng>,
}

impl InterceptResendAttack {
    /// Intercept every transmission from the first circuit on
    pub fn new(inner: Arc<dyn ExecutionEffects>, seed: u64) -> Self {
        Self {
            inner,
            intercept_fraction: 1.0,
            skip_circuits: 0,
            seen: Mutex::new(0),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Intercept only this fraction of transmissions
    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.intercept_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Leave the first `circuits` prepare-and-measure circuits untouched
    pub fn skipping(mut self, circuits: usize) -> Self {
        self.skip_circuits = circuits;
        self
    }

    fn intercept(&self, batch: &CircuitBatch) -> CircuitBatch {
        let mut seen = self.seen.lock();
        let mut rng = self.rng.lock();
        let mut intercepted = 0usize;
        let circuits = batch
            .iter()
            .map(|circuit| match circuit {
                Circuit::PrepareMeasure {
                    prepare,
                    measure_basis,
                } => {
                    let position = *seen;
                    *seen += 1;
                    if position < self.skip_circuits
                        || !rng.gen_bool(self.intercept_fraction)
                    {
                        return circuit.clone();
                    }
                    intercepted += 1;
                    let eve_basis = Basis::sample(&mut *rng);
                    if eve_basis == prepare.basis {
                        // Eve reads the bit faithfully and re-prepares it.
                        circuit.clone()
                    } else {
                        let eve_bit = rng.gen_bool(0.5);
                        Circuit::PrepareMeasure {
                            prepare: Preparation::new(eve_bit, eve_basis),
                            measure_basis: *measure_basis,
                        }
                    }
                }
                Circuit::BellPair { .. } => circuit.clone(),
            })
            .collect();
        debug!(intercepted, total = batch.len(), "eavesdropper processed batch");
        CircuitBatch::new(circuits)
    }
}

#[async_trait]
impl ExecutionEffects for InterceptResendAttack {
    async fn submit(
        &self,
        batch: &CircuitBatch,
        shots: u32,
    ) -> Result<Vec<OutcomeCounts>, BackendError> {
        let corrupted = self.intercept(batch);
        self.inner.submit(&corrupted, shots).await
    }

    fn name(&self) -> &'static str {
        "intercept-resend"
    }
}

/// Entanglement-breaking source substitution
///
/// Bell-pair circuits are served from a classical source that emits
/// Z-correlated pairs instead of entangled ones, so the measured correlation
/// factorizes into `cos(g) · cos(d)`. CHSH then tops out at √2 and the
/// X-basis fidelity collapses to 1/2, while Z-basis measurements look
/// perfect. Prepare-and-measure circuits pass through untouched, so the
/// attack survives authentication and key distribution and is caught by the
/// tamper check.
pub struct EntanglementBreakAttack {
    inner: Arc<dyn ExecutionEffects>,
    rng: Mutex<ChaCha8Rng>,
}

impl EntanglementBreakAttack {
    /// Substitute the classical source for every Bell pair
    pub fn new(inner: Arc<dyn ExecutionEffects>, seed: u64) -> Self {
        Self {
            inner,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl ExecutionEffects for EntanglementBreakAttack {
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
        let mut produced: Vec<Option<OutcomeCounts>> = vec![None; batch.len()];
        let mut forwarded = Vec::new();
        let mut forwarded_positions = Vec::new();
        {
            let mut rng = self.rng.lock();
            for (position, circuit) in batch.iter().enumerate() {
                match circuit {
                    Circuit::BellPair { settings } => {
                        let correlation =
                            settings.gateway_angle.cos() * settings.device_angle.cos();
                        produced[position] = Some(sample_pair(&mut rng, correlation, shots));
                    }
                    other => {
                        forwarded.push(other.clone());
                        forwarded_positions.push(position);
                    }
                }
            }
        }
        if !forwarded.is_empty() {
            let outcomes = self
                .inner
                .submit(&CircuitBatch::new(forwarded), shots)
                .await?;
            if outcomes.len() != forwarded_positions.len() {
                return Err(BackendError::Fault {
                    reason: "inner backend dropped histograms".to_string(),
                });
            }
            for (position, counts) in forwarded_positions.into_iter().zip(outcomes) {
                produced[position] = Some(counts);
            }
        }
        produced
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| BackendError::Fault {
                    reason: "histogram slot left unfilled".to_string(),
                })
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "entanglement-break"
    }
}

/// Selectable simulated adversary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adversary {
    /// Intercept-resend eavesdropper on transmissions
    InterceptResend,
    /// Classical substitution of the entanglement source
    EntanglementBreak,
}

impl Adversary {
    /// Wrap a backend with this adversary
    pub fn wrap(self, inner: Arc<dyn ExecutionEffects>, seed: u64) -> Arc<dyn ExecutionEffects> {
        match self {
            Self::InterceptResend => Arc::new(InterceptResendAttack::new(inner, seed)),
            Self::EntanglementBreak => Arc::new(EntanglementBreakAttack::new(inner, seed)),
        }
    }
}

impl fmt::Display for Adversary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InterceptResend => write!(f, "eavesdrop"),
            Self::EntanglementBreak => write!(f, "tamper"),
        }
    }
}

impl FromStr for Adversary {
    type Err = SigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eavesdrop" | "intercept-resend" => Ok(Self::InterceptResend),
            "tamper" | "entanglement-break" => Ok(Self::EntanglementBreak),
            other => Err(SigilError::invalid_input(format!(
                "unknown adversary '{other}' (expected eavesdrop or tamper)"
            ))),
        }
    }
}
