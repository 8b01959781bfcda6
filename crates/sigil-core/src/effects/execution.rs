//! Execution backend effect interface
//!
//! A backend accepts a batch of logical circuits and returns one outcome
//! histogram per circuit, in submission order. Shot scheduling, compilation,
//! and queueing are backend concerns; the protocol only sees histograms.

use async_trait::async_trait;
use std::sync::Arc;

use crate::circuit::CircuitBatch;
use crate::outcome::OutcomeCounts;

/// Execution backend errors
#[derive(Debug, Clone, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum BackendError {
    /// Backend temporarily unreachable; the submission may be retried
    #[error("Backend unavailable: {reason}")]
    Unavailable {
        /// Reason the backend is unavailable
        reason: String,
    },
    /// Backend failed mid-job or returned malformed results; fatal for the session
    #[error("Backend fault: {reason}")]
    Fault {
        /// Description of the fault
        reason: String,
    },
    /// Backend rejected the submitted circuits
    #[error("Rejected circuit: {reason}")]
    InvalidCircuit {
        /// Reason the circuits were rejected
        reason: String,
    },
}

/// Circuit execution interface
///
/// Contract: a successful reply holds exactly one histogram per submitted
/// circuit, each with `shots` total counts. An empty batch yields an empty
/// reply, which is distinct from unavailability.
#[async_trait]
pub trait ExecutionEffects: Send + Sync {
    /// Execute every circuit in the batch `shots` times
    async fn submit(
        &self,
        batch: &CircuitBatch,
        shots: u32,
    ) -> Result<Vec<OutcomeCounts>, BackendError>;

    /// Short backend name for logs and records
    fn name(&self) -> &'static str {
        "execution-backend"
    }
}

impl std::fmt::Debug for dyn ExecutionEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEffects")
            .field("name", &self.name())
            .finish()
    }
}

#[async_trait]
impl<T: ExecutionEffects + ?Sized> ExecutionEffects for Arc<T> {
    async fn submit(
        &self,
        batch: &CircuitBatch,
        shots: u32,
    ) -> Result<Vec<OutcomeCounts>, BackendError> {
        (**self).submit(batch, shots).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
