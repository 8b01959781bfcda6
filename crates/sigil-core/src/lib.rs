//! Sigil Core - shared foundation for the quantum device-security protocol
//!
//! This crate provides the data model, configuration, error taxonomy, and
//! effect interfaces shared by every other Sigil crate. It contains no
//! decision logic and no I/O: the protocol engines live in `sigil-protocol`,
//! and effect implementations (simulators, identity stores) live in
//! `sigil-backend`.
//!
//! # Contents
//!
//! - Identifiers: [`DeviceId`], [`SessionId`]
//! - Measurement model: [`Basis`], [`Preparation`], [`RawOutcome`],
//!   [`OutcomeCounts`]
//! - Circuit descriptions consumed by execution backends: [`Circuit`],
//!   [`CircuitBatch`], the canonical CHSH setting pairs
//! - Device identity and its deterministic derivation: [`DeviceIdentity`]
//! - Configuration: [`ProtocolConfig`] and its sections
//! - Effect interfaces: [`ExecutionEffects`], [`IdentityEffects`]
//! - Unified error handling: [`SigilError`]

#![forbid(unsafe_code)]

/// Device and session identifiers
pub mod identifiers;

/// Bases, preparations, raw outcomes, and outcome histograms
pub mod outcome;

/// Circuit descriptions and canonical measurement settings
pub mod circuit;

/// Device identity and reference-state derivation
pub mod identity;

/// Protocol configuration sections and validation
pub mod config;

/// Pure effect interfaces (no implementations)
pub mod effects;

/// Unified error handling
pub mod errors;

pub use circuit::{
    BellSettings, Circuit, CircuitBatch, DeviceSetting, FidelityBasis, GatewaySetting, SettingPair,
};
pub use config::{
    AuthenticationConfig, Bb84Config, EntanglementConfig, ExecutionConfig, ExecutionMode,
    NoiseConfig, ProtocolConfig, StatisticsConfig,
};
pub use effects::{BackendError, ExecutionEffects, IdentityEffects, IdentityError};
pub use errors::{Result, SigilError};
pub use identifiers::{DeviceId, SessionId};
pub use identity::DeviceIdentity;
pub use outcome::{Basis, OutcomeCounts, Preparation, Provenance, RawOutcome, SiftedBit};
