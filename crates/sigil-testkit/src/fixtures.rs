//! Identity fixtures shared across protocol tests

use sigil_core::DeviceIdentity;

/// Manufacturer secret every fixture identity is derived under
pub const TEST_SECRET: &str = "manufacturing-secret";

/// Identity for a fixture device, serial derived from its label
pub fn test_identity(label: &str, rounds: usize) -> DeviceIdentity {
    DeviceIdentity::derive(label, &format!("SN-{label}"), TEST_SECRET, rounds)
}

/// The five-device demo registry: Device01 through Device05
pub fn demo_identities(rounds: usize) -> Vec<DeviceIdentity> {
    (1..=5)
        .map(|index| {
            DeviceIdentity::derive(
                &format!("Device{index:02}"),
                &format!("IIoT-SN-{}", 1000 + index),
                TEST_SECRET,
                rounds,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_registry_has_distinct_references() {
        let identities = demo_identities(32);
        assert_eq!(identities.len(), 5);
        for (i, a) in identities.iter().enumerate() {
            for b in identities.iter().skip(i + 1) {
                assert_ne!(a.device_id, b.device_id);
                assert_ne!(a.reference, b.reference);
            }
        }
    }

    #[test]
    fn test_fixture_identity_matches_its_label() {
        let identity = test_identity("gateway-bench", 8);
        assert_eq!(identity.label, "gateway-bench");
        assert_eq!(identity.reference_len(), 8);
    }
}
