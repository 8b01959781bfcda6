//! Test support: backend doubles and identity fixtures
//!
//! Everything here implements the same effect interfaces production code
//! runs against, so orchestrator and protocol tests can script backend
//! behavior precisely: canned histogram responses, permanent or transient
//! unavailability, and calls that never return.

#![forbid(unsafe_code)]

pub mod backends;
pub mod fixtures;

pub use backends::{FailingBackend, FlakyBackend, HangingBackend, ScriptedBackend};
pub use fixtures::{demo_identities, test_identity, TEST_SECRET};
