//! Asynchronous events delivered by the receiver link

use crate::band::Frequency;
use crate::codes::{AudioMode, AudioPath, RdsDataType, RdsMode, Region};

/// Correlation tag linking a command to the event that confirms it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventTag {
    /// Status report
    Status,
    /// Seek finished or aborted
    SeekComplete,
    /// RDS decoder mode changed
    RdsMode,
    /// RDS text; never awaited
    RdsData,
    /// Audio mode changed
    AudioMode,
    /// Audio routing changed
    AudioPath,
    /// Noise floor estimate ready
    NoiseFloor,
    /// Periodic audio quality sample
    LiveQuality,
    /// World region changed
    WorldRegion,
    /// Volume changed
    Volume,
    /// Matches every event except RDS data
    Any,
}

impl EventTag {
    /// Whether a waiter holding this tag accepts an event carrying `event_tag`
    pub fn accepts(self, event_tag: EventTag) -> bool {
        if event_tag == EventTag::RdsData {
            return false;
        }
        self == EventTag::Any || self == event_tag
    }
}

/// An event reported by the FM receiver service
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReceiverEvent {
    /// Full receiver status
    Status {
        frequency: Frequency,
        rssi: i32,
        snr: i32,
        radio_on: bool,
        program_type: u8,
        program_service: Option<String>,
        radio_text: Option<String>,
        program_type_name: Option<String>,
        muted: bool,
    },

    /// A seek finished; `frequency` is where the tuner stopped
    SeekComplete {
        frequency: Frequency,
        rssi: i32,
        snr: i32,
        success: bool,
    },

    /// RDS decoder mode report
    RdsMode { mode: RdsMode, af_enabled: bool },

    /// Decoded RDS text
    RdsData {
        data_type: RdsDataType,
        index: u16,
        text: String,
    },

    /// Audio mode report
    AudioMode { mode: AudioMode },

    /// Audio path report
    AudioPath { path: AudioPath },

    /// Noise floor estimate (an RSSI)
    NoiseFloor { level: i32 },

    /// Live audio quality sample
    LiveQuality { rssi: i32, snr: i32 },

    /// World region report
    WorldRegion { region: Region },

    /// Volume report
    Volume { status: u8, volume: u8 },
}

impl ReceiverEvent {
    /// Correlation tag for this event
    pub fn tag(&self) -> EventTag {
        match self {
            Self::Status { .. } => EventTag::Status,
            Self::SeekComplete { .. } => EventTag::SeekComplete,
            Self::RdsMode { .. } => EventTag::RdsMode,
            Self::RdsData { .. } => EventTag::RdsData,
            Self::AudioMode { .. } => EventTag::AudioMode,
            Self::AudioPath { .. } => EventTag::AudioPath,
            Self::NoiseFloor { .. } => EventTag::NoiseFloor,
            Self::LiveQuality { .. } => EventTag::LiveQuality,
            Self::WorldRegion { .. } => EventTag::WorldRegion,
            Self::Volume { .. } => EventTag::Volume,
        }
    }

    /// Frequency carried by the event, if any
    pub fn frequency(&self) -> Option<Frequency> {
        match self {
            Self::Status { frequency, .. } | Self::SeekComplete { frequency, .. } => {
                Some(*frequency)
            }
            _ => None,
        }
    }

    /// Minimal status report, handy for simulators and tests
    pub fn status(frequency: Frequency, radio_on: bool) -> Self {
        Self::Status {
            frequency,
            rssi: 0,
            snr: 0,
            radio_on,
            program_type: 0,
            program_service: None,
            radio_text: None,
            program_type_name: None,
            muted: false,
        }
    }

    /// Successful seek report
    pub fn seek_complete(frequency: Frequency) -> Self {
        Self::SeekComplete {
            frequency,
            rssi: 0,
            snr: 0,
            success: true,
        }
    }
}
