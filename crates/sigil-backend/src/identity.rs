//! In-memory identity store
//!
//! Keeps device registrations behind the identity effect interface. Each
//! successful lookup bumps the device's challenge freshness counter, so two
//! sessions for the same device never share a counter value.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

use sigil_core::{DeviceId, DeviceIdentity, IdentityEffects, IdentityError};

/// Registry of device identities held in memory
#[derive(Default)]
pub struct MemoryIdentityStore {
    devices: Mutex<BTreeMap<DeviceId, DeviceIdentity>>,
}

impl MemoryIdentityStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with registrations
    pub fn with_devices(identities: impl IntoIterator<Item = DeviceIdentity>) -> Self {
        let store = Self::new();
        for identity in identities {
            store.register(identity);
        }
        store
    }

    /// Register a device, replacing any previous registration
    pub fn register(&self, identity: DeviceIdentity) {
        debug!(device = %identity.device_id, label = %identity.label, "device registered");
        self.devices.lock().insert(identity.device_id, identity);
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    /// Whether the store holds no registrations
    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }
}

#[async_trait]
impl IdentityEffects for MemoryIdentityStore {
    async fn lookup(&self, device: DeviceId) -> Result<DeviceIdentity, IdentityError> {
        let mut devices = self.devices.lock();
        let identity = devices.get_mut(&device).ok_or_else(|| IdentityError::NotFound {
            device: device.to_string(),
        })?;
        identity.challenge_counter += 1;
        Ok(identity.clone())
    }
}
