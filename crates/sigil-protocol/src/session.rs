//! Session lifecycle
//!
//! A session walks the three protocol phases in a fixed order and ends in
//! exactly one terminal state. Rejections map to the phase that produced
//! them: a failed challenge aborts authentication, an excessive QBER aborts
//! key distribution, and a failed tamper check completes the session with a
//! negative verdict. Backend errors abort from any active phase.
//!
//! [`Session`] is a plain value; the orchestrator drives it and refuses
//! illegal transitions, so a terminal session can never be revived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use sigil_core::{DeviceId, Result, SessionId, SigilError};

/// Why a session ended before producing a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The device is not registered
    UnknownDevice,
    /// The challenge-response agreement fell below the acceptance bound
    AuthFailed,
    /// The observed QBER reached the rejection threshold
    ChannelInsecure,
    /// The execution backend failed or timed out
    BackendError,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDevice => write!(f, "unknown-device"),
            Self::AuthFailed => write!(f, "authentication-failed"),
            Self::ChannelInsecure => write!(f, "channel-insecure"),
            Self::BackendError => write!(f, "backend-error"),
        }
    }
}

/// How a session that ran all three phases ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Every phase passed; the key is fit for use
    Secure,
    /// The tamper check failed; the key is discarded
    Rejected,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secure => write!(f, "secure"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Overall session outcome, recorded once the session is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityVerdict {
    /// All three phases passed
    Secure,
    /// The protocol completed but the tamper check failed
    Rejected,
    /// The session ended early
    Aborted(AbortReason),
}

impl fmt::Display for SecurityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secure => write!(f, "secure"),
            Self::Rejected => write!(f, "rejected"),
            Self::Aborted(reason) => write!(f, "aborted:{reason}"),
        }
    }
}

/// Phase of the protocol state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Created, device not yet resolved
    Idle,
    /// Challenge-response authentication in flight
    Authenticating,
    /// BB84 exchange in flight
    KeyDistributing,
    /// CHSH tamper check in flight
    TamperChecking,
    /// All phases ran to completion
    Complete(CompletionStatus),
    /// The session ended early
    Aborted(AbortReason),
}

impl SessionPhase {
    /// Whether this phase ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Aborted(_))
    }

    /// Whether the machine admits moving from this phase to `next`
    pub fn can_transition_to(&self, next: &SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, next) {
            (Complete(_) | Aborted(_), _) => false,
            (Idle, Authenticating) => true,
            (Idle, Aborted(AbortReason::UnknownDevice)) => true,
            (Authenticating, KeyDistributing) => true,
            (Authenticating, Aborted(AbortReason::AuthFailed)) => true,
            (KeyDistributing, TamperChecking) => true,
            (KeyDistributing, Aborted(AbortReason::ChannelInsecure)) => true,
            (TamperChecking, Complete(_)) => true,
            (_, Aborted(AbortReason::BackendError)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::KeyDistributing => write!(f, "key-distributing"),
            Self::TamperChecking => write!(f, "tamper-checking"),
            Self::Complete(status) => write!(f, "complete:{status}"),
            Self::Aborted(reason) => write!(f, "aborted:{reason}"),
        }
    }
}

/// One protocol run for one device
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    device: DeviceId,
    phase: SessionPhase,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Open a session for a device
    pub fn new(device: DeviceId) -> Self {
        Self {
            id: SessionId::new(),
            device,
            phase: SessionPhase::Idle,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Device the session runs for
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Current phase
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// When the session was opened
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the session reached a terminal phase
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Whether the session reached a terminal phase
    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move to the next phase
    ///
    /// An illegal transition is an internal error: phase sequencing is the
    /// orchestrator's own invariant, never an input condition.
    pub fn advance(&mut self, next: SessionPhase) -> Result<()> {
        if !self.phase.can_transition_to(&next) {
            return Err(SigilError::internal(format!(
                "illegal session transition from {} to {next}",
                self.phase
            )));
        }
        self.phase = next;
        if self.phase.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        debug!(session = %self.id, phase = %self.phase, "session advanced");
        Ok(())
    }

    /// Outcome of a terminal session; `None` while phases are still running
    pub fn verdict(&self) -> Option<SecurityVerdict> {
        match self.phase {
            SessionPhase::Complete(CompletionStatus::Secure) => Some(SecurityVerdict::Secure),
            SessionPhase::Complete(CompletionStatus::Rejected) => Some(SecurityVerdict::Rejected),
            SessionPhase::Aborted(reason) => Some(SecurityVerdict::Aborted(reason)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_phases() -> Vec<SessionPhase> {
        use SessionPhase::*;
        vec![
            Idle,
            Authenticating,
            KeyDistributing,
            TamperChecking,
            Complete(CompletionStatus::Secure),
            Complete(CompletionStatus::Rejected),
            Aborted(AbortReason::UnknownDevice),
            Aborted(AbortReason::AuthFailed),
            Aborted(AbortReason::ChannelInsecure),
            Aborted(AbortReason::BackendError),
        ]
    }

    #[test]
    fn test_happy_path_runs_in_order() {
        let mut session = Session::new(DeviceId::new());
        assert_eq!(*session.phase(), SessionPhase::Idle);
        session.advance(SessionPhase::Authenticating).unwrap();
        session.advance(SessionPhase::KeyDistributing).unwrap();
        session.advance(SessionPhase::TamperChecking).unwrap();
        session
            .advance(SessionPhase::Complete(CompletionStatus::Secure))
            .unwrap();
        assert!(session.is_finished());
        assert_eq!(session.verdict(), Some(SecurityVerdict::Secure));
        assert!(session.finished_at().is_some());
    }

    #[test]
    fn test_exactly_twelve_transitions_are_legal() {
        let mut legal = 0;
        for from in all_phases() {
            for to in all_phases() {
                if from.can_transition_to(&to) {
                    legal += 1;
                }
            }
        }
        assert_eq!(legal, 12);
    }

    #[test]
    fn test_terminal_phases_admit_no_transitions() {
        for from in all_phases().into_iter().filter(SessionPhase::is_terminal) {
            for to in all_phases() {
                assert!(!from.can_transition_to(&to), "{from} must not reach {to}");
            }
        }
    }

    #[test]
    fn test_backend_error_aborts_from_every_active_phase() {
        for from in all_phases() {
            let expected = !from.is_terminal();
            assert_eq!(
                from.can_transition_to(&SessionPhase::Aborted(AbortReason::BackendError)),
                expected,
                "from {from}"
            );
        }
    }

    #[test]
    fn test_rejections_bind_to_their_phases() {
        use SessionPhase::*;
        assert!(!Idle.can_transition_to(&Aborted(AbortReason::AuthFailed)));
        assert!(!Idle.can_transition_to(&Aborted(AbortReason::ChannelInsecure)));
        assert!(!Authenticating.can_transition_to(&Aborted(AbortReason::ChannelInsecure)));
        assert!(!Authenticating.can_transition_to(&Aborted(AbortReason::UnknownDevice)));
        assert!(!KeyDistributing.can_transition_to(&Aborted(AbortReason::AuthFailed)));
        assert!(!TamperChecking.can_transition_to(&Aborted(AbortReason::ChannelInsecure)));
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        use SessionPhase::*;
        assert!(!Idle.can_transition_to(&KeyDistributing));
        assert!(!Idle.can_transition_to(&TamperChecking));
        assert!(!Authenticating.can_transition_to(&TamperChecking));
        assert!(!Authenticating.can_transition_to(&Complete(CompletionStatus::Secure)));
        assert!(!KeyDistributing.can_transition_to(&Complete(CompletionStatus::Secure)));
    }

    #[test]
    fn test_advance_refuses_illegal_transition() {
        let mut session = Session::new(DeviceId::new());
        let err = session
            .advance(SessionPhase::TamperChecking)
            .unwrap_err();
        assert!(matches!(err, SigilError::Internal { .. }));
        assert_eq!(*session.phase(), SessionPhase::Idle);
        assert!(session.verdict().is_none());
    }

    #[test]
    fn test_aborted_session_reports_its_reason() {
        let mut session = Session::new(DeviceId::new());
        session.advance(SessionPhase::Authenticating).unwrap();
        session
            .advance(SessionPhase::Aborted(AbortReason::AuthFailed))
            .unwrap();
        assert_eq!(
            session.verdict(),
            Some(SecurityVerdict::Aborted(AbortReason::AuthFailed))
        );
        assert!(session.is_finished());
    }

    #[test]
    fn test_display_labels_are_stable() {
        assert_eq!(SessionPhase::Idle.to_string(), "idle");
        assert_eq!(SessionPhase::KeyDistributing.to_string(), "key-distributing");
        assert_eq!(
            SessionPhase::Complete(CompletionStatus::Secure).to_string(),
            "complete:secure"
        );
        assert_eq!(
            SessionPhase::Aborted(AbortReason::ChannelInsecure).to_string(),
            "aborted:channel-insecure"
        );
        assert_eq!(
            SecurityVerdict::Aborted(AbortReason::BackendError).to_string(),
            "aborted:backend-error"
        );
    }

    #[test]
    fn test_verdicts_serialize_in_snake_case() {
        let json = serde_json::to_string(&SecurityVerdict::Secure).unwrap();
        assert_eq!(json, r#""secure""#);
        let json =
            serde_json::to_string(&SecurityVerdict::Aborted(AbortReason::ChannelInsecure)).unwrap();
        assert_eq!(json, r#"{"aborted":"channel_insecure"}"#);
    }
}
