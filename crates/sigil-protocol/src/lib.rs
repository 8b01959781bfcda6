//! Sigil Protocol - the three-phase decision engine
//!
//! A session walks one device through three phases, in a fixed order, with
//! hard gates between them:
//!
//! 1. **Authentication** ([`auth`]): challenge the device to reproduce its
//!    registered reference states; accept at agreement ≥ 1 − threshold.
//! 2. **Key distribution** ([`bb84`]): BB84 exchange, basis sifting, QBER
//!    estimation over a sacrificial test sample; reject at QBER ≥ threshold.
//! 3. **Tamper check** ([`tamper`]): CHSH Bell test plus same-basis fidelity;
//!    the channel is trusted only above the classical bound.
//!
//! The [`orchestrator`] owns sequencing, backend submission (with chunking,
//! timeout, and bounded retry), and the session state machine in
//! [`session`]. Engines are pure: they plan circuit batches and evaluate
//! outcome histograms, and never perform I/O themselves. Statistical
//! threshold failures are verdicts, not errors; every rejection carries the
//! report that produced it, and [`record::SessionRecord`] serializes one
//! audit row per session.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Challenge-response authentication engine
pub mod auth;

/// BB84 key distribution engine
pub mod bb84;

/// Entanglement-based tamper detection engine
pub mod tamper;

/// Session phases and the transition state machine
pub mod session;

/// Async protocol driver
pub mod orchestrator;

/// Per-session audit record
pub mod record;

pub use auth::{AgreementReport, AuthenticationEngine, AuthenticationPlan, AuthenticationVerdict};
pub use bb84::{
    sift, Bb84Plan, KeyDistributionEngine, KeyMaterial, QberReport, QkdVerdict, SiftedKeyMaterial,
};
pub use orchestrator::{Orchestrator, SessionOutcome};
pub use record::{PhaseTimings, SessionRecord};
pub use session::{AbortReason, CompletionStatus, SecurityVerdict, Session, SessionPhase};
pub use tamper::{
    chsh_s, correlation, BellTrial, ChshStatistic, Correlations, FidelityReport, TamperEngine,
    TamperPlan, TamperVerdict, QUANTUM_BOUND,
};

/// Tagged outcome of one phase's statistical decision
///
/// `Inconclusive` marks data from which the phase statistic cannot be
/// computed at all; the orchestrator treats it as a failure to confirm, never
/// as acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// The phase statistic cleared its threshold
    Accepted,
    /// The phase statistic failed its threshold
    Rejected,
    /// The statistic could not be computed from the data
    Inconclusive,
}

impl Verdict {
    /// Whether the phase passed
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}
