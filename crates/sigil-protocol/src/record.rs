//! Per-session audit records
//!
//! Every session, whatever its outcome, produces one [`SessionRecord`]: the
//! device, the execution context, the seed that makes the run reproducible,
//! the per-phase statistics that were actually computed, and the verdict.
//! Key material itself never enters a record; only its length does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sigil_core::{DeviceId, ExecutionMode, SessionId};

use crate::auth::AuthenticationVerdict;
use crate::bb84::QberReport;
use crate::session::SecurityVerdict;
use crate::tamper::TamperVerdict;

/// Wall-clock duration of each phase, in milliseconds
///
/// A phase that never ran to a verdict stays `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    /// Authentication phase duration
    pub authentication_ms: Option<u64>,
    /// Key-distribution phase duration
    pub key_distribution_ms: Option<u64>,
    /// Tamper-check phase duration
    pub tamper_check_ms: Option<u64>,
    /// Whole-session duration
    pub total_ms: u64,
}

/// Audit record of one protocol session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier
    pub session: SessionId,
    /// Device the session ran for
    pub device: DeviceId,
    /// Registered device label, when the device was resolved
    pub label: Option<String>,
    /// Log-safe serial digest, when the device was resolved
    pub fingerprint: Option<String>,
    /// Freshness counter the challenge was derived under
    pub challenge_counter: Option<u64>,
    /// Execution mode the session ran in
    pub mode: ExecutionMode,
    /// Name of the backend that executed the circuits
    pub backend: String,
    /// Seed driving all protocol and simulator randomness
    pub seed: u64,
    /// When the session was opened
    pub started_at: DateTime<Utc>,
    /// When the session reached its terminal phase
    pub finished_at: DateTime<Utc>,
    /// Overall outcome
    pub verdict: SecurityVerdict,
    /// Per-phase durations
    pub timings: PhaseTimings,
    /// Authentication statistics, when the phase ran to a verdict
    pub authentication: Option<AuthenticationVerdict>,
    /// QBER statistics, when the phase ran to a verdict
    pub key_distribution: Option<QberReport>,
    /// Length of the delivered key in bits, on secure completion only
    pub final_key_bits: Option<usize>,
    /// Tamper-check statistics, when the phase ran to a verdict
    pub tamper: Option<TamperVerdict>,
    /// Human-readable failure detail on aborted sessions
    pub abort_detail: Option<String>,
}
