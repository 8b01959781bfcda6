//! Circuit descriptions submitted to execution backends
//!
//! Circuits are logical descriptions, not gate lists: compilation to any
//! particular hardware is the backend's concern. Two shapes cover the whole
//! protocol: single-qubit prepare-and-measure rounds (authentication, BB84)
//! and Bell pairs with per-party measurement rotations (tamper detection).

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;

use crate::outcome::{Basis, Preparation};

/// Per-party measurement rotations for one Bell-pair circuit
///
/// Each side applies `Ry(angle)` to its half of a |Φ+⟩ pair and measures in
/// Z, so the ideal correlation is `E(g, d) = cos(g − d)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BellSettings {
    /// Gateway-side rotation angle in radians
    pub gateway_angle: f64,
    /// Device-side rotation angle in radians
    pub device_angle: f64,
}

/// A logical circuit an execution backend can run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Circuit {
    /// Encode a bit in a basis, then measure in a (possibly different) basis
    PrepareMeasure {
        /// State the device transmits
        prepare: Preparation,
        /// Basis the gateway measures in
        measure_basis: Basis,
    },
    /// Entangled pair with local rotations, both halves measured in Z
    BellPair {
        /// Rotation angles for the two parties
        settings: BellSettings,
    },
}

/// An ordered batch of circuits submitted as one logical request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBatch {
    /// Circuits in submission order
    pub circuits: Vec<Circuit>,
}

impl CircuitBatch {
    /// Create a batch from circuits
    pub fn new(circuits: Vec<Circuit>) -> Self {
        Self { circuits }
    }

    /// Number of circuits in the batch
    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    /// Whether the batch holds no circuits
    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    /// Iterate over circuits in order
    pub fn iter(&self) -> impl Iterator<Item = &Circuit> {
        self.circuits.iter()
    }
}

impl From<Vec<Circuit>> for CircuitBatch {
    fn from(circuits: Vec<Circuit>) -> Self {
        Self::new(circuits)
    }
}

/// Gateway-side CHSH measurement setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GatewaySetting {
    /// First gateway angle
    A1,
    /// Second gateway angle
    A2,
}

impl GatewaySetting {
    /// Rotation angle in radians
    pub fn angle(&self) -> f64 {
        match self {
            Self::A1 => 0.0,
            Self::A2 => FRAC_PI_2,
        }
    }
}

/// Device-side CHSH measurement setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceSetting {
    /// First device angle
    B1,
    /// Second device angle
    B2,
}

impl DeviceSetting {
    /// Rotation angle in radians
    pub fn angle(&self) -> f64 {
        match self {
            Self::B1 => FRAC_PI_4,
            Self::B2 => 3.0 * FRAC_PI_4,
        }
    }
}

/// One of the four canonical CHSH setting combinations
///
/// The angle set {0, π/2} × {π/4, 3π/4} lets an ideal |Φ+⟩ source reach the
/// quantum bound 2√2 for the S combination the tamper engine computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettingPair {
    /// Gateway setting
    pub gateway: GatewaySetting,
    /// Device setting
    pub device: DeviceSetting,
}

impl SettingPair {
    /// All four canonical combinations, in a fixed order
    pub const ALL: [SettingPair; 4] = [
        SettingPair {
            gateway: GatewaySetting::A1,
            device: DeviceSetting::B1,
        },
        SettingPair {
            gateway: GatewaySetting::A1,
            device: DeviceSetting::B2,
        },
        SettingPair {
            gateway: GatewaySetting::A2,
            device: DeviceSetting::B1,
        },
        SettingPair {
            gateway: GatewaySetting::A2,
            device: DeviceSetting::B2,
        },
    ];

    /// Rotation angles for this combination
    pub fn bell_settings(&self) -> BellSettings {
        BellSettings {
            gateway_angle: self.gateway.angle(),
            device_angle: self.device.angle(),
        }
    }
}

impl fmt::Display for SettingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gateway = match self.gateway {
            GatewaySetting::A1 => "a1",
            GatewaySetting::A2 => "a2",
        };
        let device = match self.device {
            DeviceSetting::B1 => "b1",
            DeviceSetting::B2 => "b2",
        };
        write!(f, "{gateway}-{device}")
    }
}

/// Same-basis Bell measurement used for fidelity estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FidelityBasis {
    /// Both parties measure in Z
    ZZ,
    /// Both parties measure in X
    XX,
}

impl FidelityBasis {
    /// Both fidelity bases, in a fixed order
    pub const ALL: [FidelityBasis; 2] = [FidelityBasis::ZZ, FidelityBasis::XX];

    /// Rotation angles realizing the same-basis measurement
    pub fn bell_settings(&self) -> BellSettings {
        match self {
            Self::ZZ => BellSettings {
                gateway_angle: 0.0,
                device_angle: 0.0,
            },
            Self::XX => BellSettings {
                gateway_angle: FRAC_PI_2,
                device_angle: FRAC_PI_2,
            },
        }
    }
}

impl fmt::Display for FidelityBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZZ => write!(f, "zz"),
            Self::XX => write!(f, "xx"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_setting_pairs_are_distinct() {
        for (i, a) in SettingPair::ALL.iter().enumerate() {
            for b in SettingPair::ALL.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_ideal_correlations_at_canonical_angles() {
        // cos(g − d) per pair; the a1-b2 pair is the anticorrelated one.
        for pair in SettingPair::ALL {
            let settings = pair.bell_settings();
            let e = (settings.gateway_angle - settings.device_angle).cos();
            let expected = match (pair.gateway, pair.device) {
                (GatewaySetting::A1, DeviceSetting::B2) => -std::f64::consts::FRAC_1_SQRT_2,
                _ => std::f64::consts::FRAC_1_SQRT_2,
            };
            assert!((e - expected).abs() < 1e-12, "pair {pair}: E = {e}");
        }
    }

    #[test]
    fn test_fidelity_bases_use_equal_angles() {
        for basis in FidelityBasis::ALL {
            let settings = basis.bell_settings();
            assert!((settings.gateway_angle - settings.device_angle).abs() < 1e-12);
        }
    }

    #[test]
    fn test_batch_accessors() {
        let batch = CircuitBatch::new(vec![Circuit::BellPair {
            settings: FidelityBasis::ZZ.bell_settings(),
        }]);
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
    }
}
