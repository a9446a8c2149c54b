//! Error types for FM receiver command construction and code decoding

use thiserror::Error;

/// Errors raised while building commands or decoding wire codes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A wire code did not map to any known value
    #[error("unknown {kind} code: 0x{code:02X}")]
    UnknownCode {
        /// Which code table was consulted
        kind: &'static str,
        /// The offending value
        code: u32,
    },

    /// A command parameter is outside its permitted range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A frequency does not sit on the configured band grid
    #[error("frequency {0} is outside the band or off the channel grid")]
    InvalidFrequency(u32),
}

impl ProtocolError {
    pub(crate) fn unknown(kind: &'static str, code: u32) -> Self {
        Self::UnknownCode { kind, code }
    }
}
