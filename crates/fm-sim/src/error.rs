//! Simulator errors

use fm_protocol::Frequency;
use thiserror::Error;

/// Errors configuring a simulated receiver
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Station frequency outside the simulated band
    #[error("station {0} outside band")]
    OutOfBand(Frequency),

    /// Station frequency between channels
    #[error("station {0} not on the channel grid")]
    OffGrid(Frequency),

    /// Two stations on one channel
    #[error("station {0} already present")]
    Duplicate(Frequency),
}
