//! Execution backends and the identity store
//!
//! The analytic simulator is the reference backend: it computes exact
//! outcome distributions for both circuit shapes and samples histograms
//! from a seeded generator, ideally or under a depolarizing-plus-readout
//! noise model. Simulated adversaries are decorators over any backend, so
//! the protocol crates stay free of attack branches: a corrupted channel
//! looks exactly like an honest one that happens to return bad statistics.
//!
//! Backend selection is a single factory keyed on the configured execution
//! mode. Hardware backends are injected by the embedding application;
//! nothing here fabricates one.

#![forbid(unsafe_code)]

pub mod attack;
pub mod identity;
pub mod simulator;

pub use attack::{Adversary, EntanglementBreakAttack, InterceptResendAttack};
pub use identity::MemoryIdentityStore;
pub use simulator::SimulatorBackend;

use std::sync::Arc;

use sigil_core::{ExecutionConfig, ExecutionEffects, ExecutionMode, Result, SigilError};

/// Construct the execution backend for a configured mode
///
/// `simulator` and `noisy` are self-contained. `hardware` has no built-in
/// client; embedders construct their own [`ExecutionEffects`] implementation
/// and pass it to the orchestrator directly instead of going through this
/// factory.
pub fn backend_for_mode(config: &ExecutionConfig) -> Result<Arc<dyn ExecutionEffects>> {
    match config.mode {
        ExecutionMode::Simulator => Ok(match config.seed {
            Some(seed) => Arc::new(SimulatorBackend::ideal_seeded(seed)),
            None => Arc::new(SimulatorBackend::ideal()),
        }),
        ExecutionMode::Noisy => Ok(match config.seed {
            Some(seed) => Arc::new(SimulatorBackend::noisy_seeded(config.noise, seed)),
            None => Arc::new(SimulatorBackend::noisy(config.noise)),
        }),
        ExecutionMode::Hardware => Err(SigilError::config(
            "hardware mode has no built-in backend; pass an ExecutionEffects \
             implementation to the orchestrator directly",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_simulator_backends() {
        let mut config = ExecutionConfig::default();
        config.seed = Some(1);
        let backend = backend_for_mode(&config).unwrap();
        assert_eq!(backend.name(), "simulator");

        config.mode = ExecutionMode::Noisy;
        let backend = backend_for_mode(&config).unwrap();
        assert_eq!(backend.name(), "noisy-simulator");
    }

    #[test]
    fn test_hardware_mode_requires_injection() {
        let mut config = ExecutionConfig::default();
        config.mode = ExecutionMode::Hardware;
        let err = backend_for_mode(&config).unwrap_err();
        assert!(matches!(err, SigilError::Config { .. }));
    }
}
