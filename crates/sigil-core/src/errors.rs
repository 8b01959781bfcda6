//! Unified error system for Sigil
//!
//! A single error type covers every fallible operation in the workspace.
//! Statistical threshold failures are deliberately not errors: they are
//! verdicts carried in phase reports, so callers can audit the numbers that
//! produced a rejection.

use serde::{Deserialize, Serialize};

use crate::effects::{BackendError, IdentityError};

/// Unified error type for all Sigil operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum SigilError {
    /// Malformed or inconsistent input data
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the malformed input
        message: String,
    },

    /// Configuration value rejected at validation
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the rejected value
        message: String,
    },

    /// Requested resource does not exist
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was not found
        message: String,
    },

    /// Execution backend is temporarily unreachable; eligible for bounded retry
    #[error("Backend unavailable: {message}")]
    BackendUnavailable {
        /// Reason the backend is unavailable
        message: String,
    },

    /// Execution backend returned malformed results or failed mid-job
    #[error("Backend fault: {message}")]
    BackendFault {
        /// Description of the fault
        message: String,
    },

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl SigilError {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Create a backend fault error
    pub fn backend_fault(message: impl Into<String>) -> Self {
        Self::BackendFault {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a bounded retry of the failed operation is permitted
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

/// Standard Result type for Sigil operations
pub type Result<T> = std::result::Result<T, SigilError>;

impl From<BackendError> for SigilError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable { reason } => Self::backend_unavailable(reason),
            BackendError::Fault { reason } => Self::backend_fault(reason),
            BackendError::InvalidCircuit { reason } => Self::invalid_input(reason),
        }
    }
}

impl From<IdentityError> for SigilError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::NotFound { device } => {
                Self::not_found(format!("device {device} is not registered"))
            }
            IdentityError::Store { reason } => Self::backend_fault(reason),
        }
    }
}

impl From<std::io::Error> for SigilError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}
