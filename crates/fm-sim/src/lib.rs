//! FM Receiver Simulation Library
//!
//! Receiver links for exercising the control core without hardware:
//!
//! - **VirtualReceiver**: a chip model with stations, seeks that wrap at the
//!   band edge, abortable seeks and RDS text
//! - **ScriptedLink**: a test double that records submissions and replays
//!   scripted events
//!
//! Both deliver notifications from their own thread, the way a real link
//! does.
//!
//! # Example
//!
//! ```rust
//! use fm_protocol::Frequency;
//! use fm_sim::{Station, VirtualReceiver, VirtualReceiverConfig};
//!
//! let receiver = VirtualReceiver::new(VirtualReceiverConfig::default());
//! receiver
//!     .add_station(Station::new(Frequency(9730), -60).with_ps("WXYZ"))
//!     .unwrap();
//! assert!(!receiver.is_powered());
//! ```

mod courier;
pub mod error;
pub mod receiver;
pub mod scripted;

pub use error::SimError;
pub use receiver::{Station, VirtualReceiver, VirtualReceiverConfig};
pub use scripted::ScriptedLink;
