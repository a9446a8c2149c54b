//! FM Receiver Control Core
//!
//! Blocking control of a Broadcom FM receiver over an asynchronous
//! [`ReceiverLink`](fm_protocol::ReceiverLink):
//!
//! - **Demultiplexer**: folds link events into [`ReceiverState`] and wakes
//!   the one waiter each event answers
//! - **Coordinator**: one operation in flight, waiter installed before
//!   submit, 5 s deadline, late replies absorbed after a timeout
//! - **Auto-scan**: upward sweep collecting station channels
//! - **Facade**: [`FmRadio`], the application-facing API
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use fm_protocol::Frequency;
//! use fm_receiver::{FmRadio, ReceiverConfig};
//! use fm_sim::{Station, VirtualReceiver, VirtualReceiverConfig};
//!
//! let receiver = Arc::new(VirtualReceiver::new(VirtualReceiverConfig {
//!     stations: vec![Station::new(Frequency(9530), -55).with_ps("KXYZ")],
//!     ..VirtualReceiverConfig::default()
//! }));
//!
//! let radio = FmRadio::new(receiver, ReceiverConfig::default()).unwrap();
//! radio.open().unwrap();
//! radio.power_up(Frequency(8750)).unwrap();
//!
//! let result = radio.auto_scan().unwrap();
//! assert_eq!(result.channels(), &[39]);
//! ```

pub mod config;
pub mod coordinator;
mod demux;
pub mod error;
pub mod radio;
pub mod scan;
pub mod state;
mod waiter;

pub use config::{ConfigError, ReceiverConfig};
pub use coordinator::{Coordinator, Session, DEFAULT_COMMAND_TIMEOUT};
pub use error::{ReceiverError, Result};
pub use radio::{AntennaStatus, FmRadio, RdsSupport};
pub use scan::{AutoScan, ScanResult, ScanStop};
pub use state::{RdsPending, ReceiverState, RDS_EVENT_PS, RDS_EVENT_RT};
