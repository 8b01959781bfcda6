//! Pure effect interfaces
//!
//! Traits only; implementations live in `sigil-backend` (production and
//! simulation) and `sigil-testkit` (scripted mocks). The orchestrator is
//! written against these traits and never names an implementation.

/// Circuit execution backend interface
pub mod execution;

/// Device identity store interface
pub mod identity;

pub use execution::{BackendError, ExecutionEffects};
pub use identity::{IdentityEffects, IdentityError};
