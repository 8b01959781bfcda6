//! CLI configuration file
//!
//! A single TOML file carries the protocol parameter tables (flattened, so
//! `[authentication]`, `[bb84]`, `[entanglement]`, `[execution]`, and
//! `[statistics]` sit at the top level) plus the device registry. A missing
//! file falls back to defaults with the five-device demo registry.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sigil_core::{DeviceIdentity, ProtocolConfig};

/// Provisioning secret used when the config file does not set one
pub const DEMO_SECRET: &str = "manufacturing-secret";

/// On-disk configuration: protocol settings plus the device registry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Protocol parameter tables
    #[serde(flatten)]
    pub protocol: ProtocolConfig,
    /// Registered devices; empty means the demo registry
    pub devices: Vec<DeviceEntry>,
    /// Shared provisioning secret for the registry
    pub secret: Option<String>,
}

/// One registry row
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    /// Human-readable label, also the device identifier source
    pub label: String,
    /// Manufacturer serial number
    pub serial: String,
}

impl FileConfig {
    /// Materialize the registry into derived identities
    ///
    /// Reference lengths follow the configured authentication round count, so
    /// identities must be re-derived after changing `authentication.rounds`.
    pub fn identities(&self) -> Vec<DeviceIdentity> {
        let secret = self.secret.as_deref().unwrap_or(DEMO_SECRET);
        let rounds = self.protocol.authentication.rounds;
        if self.devices.is_empty() {
            return demo_identities(secret, rounds);
        }
        self.devices
            .iter()
            .map(|entry| DeviceIdentity::derive(&entry.label, &entry.serial, secret, rounds))
            .collect()
    }
}

fn demo_identities(secret: &str, rounds: usize) -> Vec<DeviceIdentity> {
    (1..=5)
        .map(|index| {
            DeviceIdentity::derive(
                &format!("Device{index:02}"),
                &format!("IIoT-SN-{}", 1000 + index),
                secret,
                rounds,
            )
        })
        .collect()
}

/// Load and validate the config file; absent files yield the defaults
pub fn load(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: FileConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    config.protocol.validate()?;
    Ok(config)
}
