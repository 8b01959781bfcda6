//! Protocol configuration
//!
//! One [`ProtocolConfig`] value is constructed at process start (defaults,
//! then TOML overrides), validated once, and passed by reference to the
//! orchestrator. Nothing in the workspace reads ambient global state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, SigilError};

/// Challenge-response authentication parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationConfig {
    /// Challenge rounds derived at registration
    pub rounds: usize,
    /// Maximum tolerated disagreement rate; accept at agreement ≥ 1 − threshold
    pub threshold: f64,
    /// Shots per challenge round
    pub shots: u32,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            rounds: 100,
            threshold: 0.05,
            shots: 1024,
        }
    }
}

/// BB84 key-distribution parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bb84Config {
    /// Target final key length in bits
    pub key_length: usize,
    /// Reject when the observed QBER reaches this value
    pub qber_threshold: f64,
    /// Fraction of sifted bits revealed for error estimation
    pub test_fraction: f64,
    /// Shots per transmitted position
    pub shots: u32,
}

impl Default for Bb84Config {
    fn default() -> Self {
        Self {
            key_length: 256,
            qber_threshold: 0.11,
            test_fraction: 0.5,
            shots: 1024,
        }
    }
}

/// Entanglement tamper-check parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntanglementConfig {
    /// CHSH trials, each with an independently chosen setting pair
    pub trials: usize,
    /// Shots per Bell-pair circuit
    pub shots: u32,
    /// Classical bound; entanglement is confirmed only above it
    pub chsh_threshold: f64,
    /// Minimum average same-basis fidelity
    pub fidelity_threshold: f64,
}

impl Default for EntanglementConfig {
    fn default() -> Self {
        Self {
            trials: 50,
            shots: 4096,
            chsh_threshold: 2.0,
            fidelity_threshold: 0.85,
        }
    }
}

/// Which execution backend the factory constructs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Ideal analytic simulator
    Simulator,
    /// Simulator with depolarizing and readout noise
    Noisy,
    /// Externally provided hardware backend
    Hardware,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulator => write!(f, "simulator"),
            Self::Noisy => write!(f, "noisy"),
            Self::Hardware => write!(f, "hardware"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = SigilError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simulator" => Ok(Self::Simulator),
            "noisy" => Ok(Self::Noisy),
            "hardware" => Ok(Self::Hardware),
            other => Err(SigilError::config(format!(
                "unknown execution mode '{other}' (expected simulator, noisy, or hardware)"
            ))),
        }
    }
}

/// Noise parameters for the noisy simulator mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Depolarizing probability per circuit
    pub depolarizing: f64,
    /// Readout flip probability per measured qubit
    pub readout: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            depolarizing: 0.03,
            readout: 0.01,
        }
    }
}

/// Backend execution parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Backend selection
    pub mode: ExecutionMode,
    /// Timeout applied to every backend call
    pub timeout_ms: u64,
    /// Maximum retries of a job submission after transient unavailability
    pub max_retries: u32,
    /// Base delay of the exponential backoff between retries
    pub retry_base_ms: u64,
    /// Largest number of circuits submitted as one job
    pub max_job_circuits: usize,
    /// Noise parameters, used only in `noisy` mode
    pub noise: NoiseConfig,
    /// Seed for all protocol and simulator randomness; `None` draws one at
    /// session start and records it
    pub seed: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Simulator,
            timeout_ms: 30_000,
            max_retries: 3,
            retry_base_ms: 100,
            max_job_circuits: 512,
            noise: NoiseConfig::default(),
            seed: None,
        }
    }
}

/// Statistical estimation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Bootstrap resamples per confidence interval
    pub resamples: usize,
    /// Two-sided z-score for confidence intervals (1.96 ≈ 95%)
    pub z: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            resamples: 1000,
            z: 1.96,
        }
    }
}

/// Complete protocol configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Authentication phase parameters
    pub authentication: AuthenticationConfig,
    /// BB84 phase parameters
    pub bb84: Bb84Config,
    /// Tamper-check phase parameters
    pub entanglement: EntanglementConfig,
    /// Backend execution parameters
    pub execution: ExecutionConfig,
    /// Statistical estimation parameters
    pub statistics: StatisticsConfig,
}

fn check_unit_open(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(SigilError::config(format!(
            "{name} must lie strictly between 0 and 1, got {value}"
        )))
    }
}

fn check_positive(name: &str, value: u64) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(SigilError::config(format!("{name} must be positive")))
    }
}

impl ProtocolConfig {
    /// Validate every section, rejecting out-of-range values
    pub fn validate(&self) -> Result<()> {
        check_positive("authentication.rounds", self.authentication.rounds as u64)?;
        check_unit_open("authentication.threshold", self.authentication.threshold)?;
        check_positive("authentication.shots", u64::from(self.authentication.shots))?;

        check_positive("bb84.key_length", self.bb84.key_length as u64)?;
        check_unit_open("bb84.qber_threshold", self.bb84.qber_threshold)?;
        check_unit_open("bb84.test_fraction", self.bb84.test_fraction)?;
        check_positive("bb84.shots", u64::from(self.bb84.shots))?;

        check_positive("entanglement.trials", self.entanglement.trials as u64)?;
        check_positive("entanglement.shots", u64::from(self.entanglement.shots))?;
        if self.entanglement.chsh_threshold <= 0.0 {
            return Err(SigilError::config("entanglement.chsh_threshold must be positive"));
        }
        if self.entanglement.fidelity_threshold <= 0.0 || self.entanglement.fidelity_threshold > 1.0
        {
            return Err(SigilError::config(
                "entanglement.fidelity_threshold must lie in (0, 1]",
            ));
        }

        check_positive("execution.timeout_ms", self.execution.timeout_ms)?;
        check_positive("execution.max_job_circuits", self.execution.max_job_circuits as u64)?;
        if !(0.0..1.0).contains(&self.execution.noise.depolarizing) {
            return Err(SigilError::config("execution.noise.depolarizing must lie in [0, 1)"));
        }
        if !(0.0..0.5).contains(&self.execution.noise.readout) {
            return Err(SigilError::config("execution.noise.readout must lie in [0, 0.5)"));
        }

        check_positive("statistics.resamples", self.statistics.resamples as u64)?;
        if self.statistics.z <= 0.0 {
            return Err(SigilError::config("statistics.z must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        ProtocolConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_values_match_deployment_profile() {
        let config = ProtocolConfig::default();
        assert_eq!(config.authentication.rounds, 100);
        assert!((config.authentication.threshold - 0.05).abs() < 1e-12);
        assert_eq!(config.bb84.key_length, 256);
        assert!((config.bb84.qber_threshold - 0.11).abs() < 1e-12);
        assert!((config.bb84.test_fraction - 0.5).abs() < 1e-12);
        assert_eq!(config.entanglement.trials, 50);
        assert_eq!(config.entanglement.shots, 4096);
        assert!((config.entanglement.chsh_threshold - 2.0).abs() < 1e-12);
        assert!((config.entanglement.fidelity_threshold - 0.85).abs() < 1e-12);
        assert_eq!(config.statistics.resamples, 1000);
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        let mut config = ProtocolConfig::default();
        config.bb84.qber_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(SigilError::Config { .. })
        ));
    }

    #[test]
    fn test_zero_trials_are_rejected() {
        let mut config = ProtocolConfig::default();
        config.entanglement.trials = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("noisy".parse::<ExecutionMode>().unwrap(), ExecutionMode::Noisy);
        assert!("annealer".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_partial_overrides_keep_defaults() {
        let json = r#"{"bb84": {"key_length": 128}}"#;
        let config: ProtocolConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.bb84.key_length, 128);
        assert!((config.bb84.qber_threshold - 0.11).abs() < 1e-12);
        assert_eq!(config.authentication.rounds, 100);
    }
}
