//! Error types for the receiver control core

use fm_protocol::{AcceptanceCode, Frequency, ProtocolError};
use thiserror::Error;

/// Errors surfaced by coordinator and facade operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReceiverError {
    /// The link is absent or has not reported attachment
    #[error("receiver link not attached")]
    NotReady,

    /// The link refused the command
    #[error("command rejected: {0}")]
    Rejected(AcceptanceCode),

    /// No confirming event arrived before the deadline
    #[error("no reply within {waited_ms}ms")]
    Timeout {
        /// How long the operation waited
        waited_ms: u64,
    },

    /// The link detached while the operation was pending
    #[error("receiver link lost")]
    LinkLost,

    /// Another operation is already in flight
    #[error("another operation is in flight")]
    Busy,

    /// The command needs the radio powered on
    #[error("radio is off")]
    RadioOff,

    /// A tune completed on a different frequency than requested
    #[error("tuned to {actual} instead of {expected}")]
    FrequencyMismatch {
        /// Frequency that was requested
        expected: Frequency,
        /// Frequency the status event reported
        actual: Frequency,
    },

    /// The confirming event arrived but reported a different outcome
    #[error("operation not confirmed: {0}")]
    Unconfirmed(String),

    /// A parameter was rejected before reaching the link
    #[error("invalid parameter: {0}")]
    InvalidParameter(#[from] ProtocolError),
}

impl ReceiverError {
    /// Acceptance code reported for this error at the facade boundary
    pub fn status(&self) -> AcceptanceCode {
        match self {
            Self::Rejected(code) => *code,
            Self::Timeout { .. } | Self::FrequencyMismatch { .. } | Self::Unconfirmed(_) => {
                AcceptanceCode::Fail
            }
            Self::NotReady | Self::LinkLost => AcceptanceCode::ServerFail,
            Self::Busy | Self::RadioOff => AcceptanceCode::IllegalCommand,
            Self::InvalidParameter(_) => AcceptanceCode::IllegalParameters,
        }
    }
}

/// Result alias for receiver operations
pub type Result<T> = std::result::Result<T, ReceiverError>;
