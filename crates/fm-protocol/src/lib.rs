//! FM Receiver Protocol Library
//!
//! This crate defines the vocabulary shared by everything that talks to a
//! Broadcom FM receiver through its service link:
//!
//! - **Codes**: acceptance codes, scan modes, audio and RDS settings as they
//!   appear on the wire
//! - **Commands**: the typed [`ReceiverCommand`] set and the event each one
//!   waits for
//! - **Events**: asynchronous [`ReceiverEvent`] reports and their
//!   correlation [`EventTag`]s
//! - **Band**: [`BandConfiguration`] and channel/frequency arithmetic
//! - **Link**: the [`ReceiverLink`] / [`LinkListener`] contract implemented
//!   by transports and simulators
//!
//! # Example
//!
//! ```rust
//! use fm_protocol::{BandConfiguration, Frequency, Region};
//!
//! let band = BandConfiguration::for_region(Region::Na);
//! let channel = band.channel_of(Frequency::from_mhz(95.3));
//! assert_eq!(channel, 39);
//! assert_eq!(band.frequency_of(channel), Frequency(9530));
//! ```

pub mod band;
pub mod codes;
pub mod command;
pub mod error;
pub mod event;
pub mod link;

pub use band::{BandConfiguration, Frequency};
pub use codes::{
    AcceptanceCode, AfMode, AudioMode, AudioPath, Deemphasis, FunctionalityMask, NflLevel,
    RdsCondition, RdsDataType, RdsFeatures, RdsMode, Region, ScanDirection, ScanMethod, ScanMode,
    StepSize, MIN_SIGNAL_STRENGTH_DEFAULT, SIGNAL_POLL_INTERVAL_DEFAULT_MS, SNR_THRESHOLD_MAX,
    SNR_THRESHOLD_MIN, VOLUME_MAX,
};
pub use command::ReceiverCommand;
pub use error::ProtocolError;
pub use event::{EventTag, ReceiverEvent};
pub use link::{LinkListener, LinkNotification, ReceiverLink};
