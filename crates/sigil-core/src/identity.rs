//! Device identity and reference-state derivation
//!
//! A device's authentication reference is an ordered sequence of
//! (basis, expected-bit) pairs derived from its serial number and a
//! manufacturer secret. The derivation is deterministic, so the gateway's
//! identity store and the device firmware can agree on the reference without
//! ever transmitting it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identifiers::DeviceId;
use crate::outcome::{Basis, Preparation};

/// Registered identity of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable identifier derived from the label
    pub device_id: DeviceId,
    /// Human-readable registry label
    pub label: String,
    /// Manufacturer serial number
    pub serial: String,
    /// Ordered reference preparations the device must reproduce
    pub reference: Vec<Preparation>,
    /// Challenge freshness counter, owned and bumped by the identity store
    pub challenge_counter: u64,
}

impl DeviceIdentity {
    /// Derive an identity from registry inputs
    ///
    /// Expands SHA-256(serial, secret, counter) blocks into `rounds`
    /// reference elements, two bits per element: the low bit selects the
    /// basis, the high bit the expected value.
    pub fn derive(label: &str, serial: &str, secret: &str, rounds: usize) -> Self {
        let mut reference = Vec::with_capacity(rounds);
        let mut counter: u32 = 0;
        'expand: while reference.len() < rounds {
            let mut hasher = Sha256::new();
            hasher.update(serial.as_bytes());
            hasher.update(b":");
            hasher.update(secret.as_bytes());
            hasher.update(counter.to_be_bytes());
            let block = hasher.finalize();
            for byte in block {
                for shift in [0u8, 2, 4, 6] {
                    if reference.len() == rounds {
                        break 'expand;
                    }
                    let pair = (byte >> shift) & 0b11;
                    let basis = if pair & 0b01 == 0 {
                        Basis::Rectilinear
                    } else {
                        Basis::Diagonal
                    };
                    reference.push(Preparation::new(pair & 0b10 != 0, basis));
                }
            }
            counter += 1;
        }

        Self {
            device_id: DeviceId::from_label(label),
            label: label.to_string(),
            serial: serial.to_string(),
            reference,
            challenge_counter: 0,
        }
    }

    /// Number of challenge rounds the reference supports
    pub fn reference_len(&self) -> usize {
        self.reference.len()
    }

    /// Short serial digest safe to put in logs and records
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.serial.as_bytes());
        hex::encode(&digest[..8])
    }
}
