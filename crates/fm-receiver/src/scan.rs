//! Auto-scan engine
//!
//! Sweeps the band upward from its low bound with repeated seeks, collecting
//! the channel number of every station found. The sweep ends when a seek
//! makes no progress (the tuner wrapped or was aborted), reaches the high
//! bound, fails, or a stop is requested.

use std::sync::atomic::{AtomicBool, Ordering};

use fm_protocol::{
    BandConfiguration, Frequency, ReceiverCommand, ReceiverEvent, ScanDirection, ScanMethod,
    ScanMode, MIN_SIGNAL_STRENGTH_DEFAULT,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::coordinator::Session;
use crate::error::ReceiverError;

/// Why a sweep ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStop {
    /// A seek returned at or below the previous station
    NoProgress,
    /// A seek reached the high bound
    BandEdge,
    /// A stop was requested
    Cancelled,
    /// A command failed
    Failed(ReceiverError),
}

/// Stations found by one sweep, in ascending frequency order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// Channel numbers relative to the band's low bound
    pub channels: Vec<u16>,
    /// Frequencies the channels were derived from
    pub frequencies: Vec<Frequency>,
    #[serde(skip)]
    pub stop: ScanStop,
}

impl ScanResult {
    fn new() -> Self {
        Self {
            channels: Vec::new(),
            frequencies: Vec::new(),
            stop: ScanStop::NoProgress,
        }
    }

    /// Whether no station was found
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of stations found
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Channel numbers found
    pub fn channels(&self) -> &[u16] {
        &self.channels
    }
}

/// Parameters for one sweep
#[derive(Debug, Clone, Copy)]
pub struct AutoScan<'a> {
    band: BandConfiguration,
    min_signal: u8,
    method: ScanMethod,
    cancel: &'a AtomicBool,
}

impl<'a> AutoScan<'a> {
    pub fn new(band: BandConfiguration, cancel: &'a AtomicBool) -> Self {
        Self {
            band,
            min_signal: MIN_SIGNAL_STRENGTH_DEFAULT,
            method: ScanMethod::Normal,
            cancel,
        }
    }

    /// Minimum signal strength passed to each seek
    pub fn min_signal(mut self, min_signal: u8) -> Self {
        self.min_signal = min_signal;
        self
    }

    /// Seek algorithm
    pub fn method(mut self, method: ScanMethod) -> Self {
        self.method = method;
        self
    }

    /// Run the sweep inside `session`
    pub fn run(&self, session: &mut Session<'_>) -> ScanResult {
        let mut result = ScanResult::new();
        if let Err(e) = session.tune(self.band.low) {
            info!(error = %e, "scan could not tune to band start");
            result.stop = ScanStop::Failed(e);
            return result;
        }

        let seek = ReceiverCommand::Seek {
            mode: ScanMode::Seek {
                direction: ScanDirection::Up,
                method: self.method,
            },
            min_signal: self.min_signal,
        };
        let mut previous = self.band.low;
        loop {
            if self.cancel.load(Ordering::Acquire) {
                result.stop = ScanStop::Cancelled;
                break;
            }
            let found = match session.execute(&seek) {
                Ok(Some(ReceiverEvent::SeekComplete {
                    frequency,
                    success: true,
                    ..
                })) => frequency,
                Ok(_) => previous,
                Err(e) => {
                    debug!(error = %e, "seek failed, ending scan");
                    result.stop = ScanStop::Failed(e);
                    break;
                }
            };

            if found <= previous {
                debug!(%found, %previous, "seek made no progress");
                result.stop = if self.cancel.load(Ordering::Acquire) {
                    ScanStop::Cancelled
                } else {
                    ScanStop::NoProgress
                };
                break;
            }
            if found >= self.band.high {
                debug!(%found, "seek reached band edge");
                result.stop = ScanStop::BandEdge;
                break;
            }

            let channel = self.band.channel_of(found);
            info!(%found, channel, "station found");
            result.channels.push(channel);
            result.frequencies.push(found);
            previous = found;
        }
        info!(stations = result.len(), stop = ?result.stop, "scan finished");
        result
    }
}
