//! Identity store effect interface
//!
//! The store owns device registrations and the per-device challenge
//! freshness counter. The protocol core only reads identities; it never
//! writes back.

use async_trait::async_trait;
use std::sync::Arc;

use crate::identifiers::DeviceId;
use crate::identity::DeviceIdentity;

/// Identity store errors
#[derive(Debug, Clone, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum IdentityError {
    /// No registration exists for the device
    #[error("Unknown device: {device}")]
    NotFound {
        /// Identifier that failed to resolve
        device: String,
    },
    /// The store itself failed
    #[error("Identity store failure: {reason}")]
    Store {
        /// Description of the failure
        reason: String,
    },
}

/// Device identity lookup interface
#[async_trait]
pub trait IdentityEffects: Send + Sync {
    /// Resolve a device registration
    ///
    /// Each successful lookup bumps the device's freshness counter; the
    /// returned snapshot carries the bumped value.
    async fn lookup(&self, device: DeviceId) -> Result<DeviceIdentity, IdentityError>;
}

#[async_trait]
impl<T: IdentityEffects + ?Sized> IdentityEffects for Arc<T> {
    async fn lookup(&self, device: DeviceId) -> Result<DeviceIdentity, IdentityError> {
        (**self).lookup(device).await
    }
}
