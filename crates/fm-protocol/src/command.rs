//! Commands submitted to the receiver link
//!
//! Each [`ReceiverCommand`] names the event tag that confirms it. Commands
//! the service executes silently (step size, SNR threshold, live polling)
//! report no tag and are complete once accepted.

use std::time::Duration;

use crate::band::Frequency;
use crate::codes::{
    AfMode, AudioMode, AudioPath, Deemphasis, FunctionalityMask, NflLevel, RdsCondition,
    RdsFeatures, RdsMode, Region, ScanDirection, ScanMethod, ScanMode, StepSize,
    SNR_THRESHOLD_MAX,
};
use crate::error::ProtocolError;
use crate::event::EventTag;

/// A typed command for the FM receiver service
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReceiverCommand {
    /// Power the radio on with the given functionality
    TurnOn { functionality: FunctionalityMask },

    /// Power the radio off
    TurnOff,

    /// Tune to a frequency
    Tune { frequency: Frequency },

    /// Request a status event
    GetStatus,

    /// Mute or unmute audio
    Mute { mute: bool },

    /// Seek for the next station
    Seek { mode: ScanMode, min_signal: u8 },

    /// Seek for the next station satisfying an RDS condition
    SeekRds {
        mode: ScanMode,
        min_signal: u8,
        condition: RdsCondition,
        value: u8,
    },

    /// Seek within an explicit range, optionally collecting several channels
    SeekCombo {
        start: Frequency,
        end: Frequency,
        min_signal: u8,
        direction: ScanDirection,
        method: ScanMethod,
        multi_channel: bool,
        rds_condition: RdsCondition,
        rds_value: u8,
    },

    /// Abort an in-progress seek
    AbortSeek,

    /// Configure the RDS decoder and AF following
    SetRdsMode {
        mode: RdsMode,
        features: RdsFeatures,
        af: AfMode,
        af_threshold: u8,
    },

    /// Select stereo/mono behavior
    SetAudioMode { mode: AudioMode },

    /// Route audio output
    SetAudioPath { path: AudioPath },

    /// Set the seek step size
    SetStepSize { step: StepSize },

    /// Set output volume (0..=255)
    SetVolume { volume: u8 },

    /// Select the world region and deemphasis
    SetWorldRegion {
        region: Region,
        deemphasis: Deemphasis,
    },

    /// Estimate the noise floor
    EstimateNoiseFloor { level: NflLevel },

    /// Enable or disable periodic audio quality reports
    SetLiveAudioPolling { enabled: bool, interval_ms: u32 },

    /// Set the SNR threshold used by subsequent tunes (0..=31)
    SetSnrThreshold { threshold: u8 },
}

impl ReceiverCommand {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::TurnOn { .. } => "turn-on",
            Self::TurnOff => "turn-off",
            Self::Tune { .. } => "tune",
            Self::GetStatus => "get-status",
            Self::Mute { .. } => "mute",
            Self::Seek { .. } => "seek",
            Self::SeekRds { .. } => "seek-rds",
            Self::SeekCombo { .. } => "seek-combo",
            Self::AbortSeek => "abort-seek",
            Self::SetRdsMode { .. } => "set-rds-mode",
            Self::SetAudioMode { .. } => "set-audio-mode",
            Self::SetAudioPath { .. } => "set-audio-path",
            Self::SetStepSize { .. } => "set-step-size",
            Self::SetVolume { .. } => "set-volume",
            Self::SetWorldRegion { .. } => "set-world-region",
            Self::EstimateNoiseFloor { .. } => "estimate-noise-floor",
            Self::SetLiveAudioPolling { .. } => "set-live-audio-polling",
            Self::SetSnrThreshold { .. } => "set-snr-threshold",
        }
    }

    /// Event tag that confirms this command, if any
    pub fn awaited_event(&self) -> Option<EventTag> {
        match self {
            Self::TurnOn { .. }
            | Self::TurnOff
            | Self::Tune { .. }
            | Self::GetStatus
            | Self::Mute { .. } => Some(EventTag::Status),
            Self::Seek { .. } | Self::SeekRds { .. } | Self::SeekCombo { .. } | Self::AbortSeek => {
                Some(EventTag::SeekComplete)
            }
            Self::SetRdsMode { .. } => Some(EventTag::RdsMode),
            Self::SetAudioMode { .. } => Some(EventTag::AudioMode),
            Self::SetAudioPath { .. } => Some(EventTag::AudioPath),
            Self::SetVolume { .. } => Some(EventTag::Volume),
            Self::SetWorldRegion { .. } => Some(EventTag::WorldRegion),
            Self::EstimateNoiseFloor { .. } => Some(EventTag::NoiseFloor),
            Self::SetStepSize { .. }
            | Self::SetLiveAudioPolling { .. }
            | Self::SetSnrThreshold { .. } => None,
        }
    }

    /// Whether the radio must already be on for this command
    pub fn requires_radio_on(&self) -> bool {
        !matches!(self, Self::TurnOn { .. })
    }

    /// Whether this command moves the tuner
    pub fn is_seek(&self) -> bool {
        matches!(
            self,
            Self::Seek { .. } | Self::SeekRds { .. } | Self::SeekCombo { .. }
        )
    }

    /// Check parameter ranges before the command reaches the link
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::SetSnrThreshold { threshold } if *threshold > SNR_THRESHOLD_MAX => {
                Err(ProtocolError::InvalidParameter(format!(
                    "SNR threshold {} above {}",
                    threshold, SNR_THRESHOLD_MAX
                )))
            }
            Self::SetLiveAudioPolling {
                enabled: true,
                interval_ms: 0,
            } => Err(ProtocolError::InvalidParameter(
                "live polling interval must be non-zero".into(),
            )),
            Self::SeekCombo { start, end, .. } if start == end => Err(
                ProtocolError::InvalidParameter("seek range start equals end".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Polling interval as a [`Duration`], for live polling commands
    pub fn poll_interval(&self) -> Option<Duration> {
        match self {
            Self::SetLiveAudioPolling {
                enabled: true,
                interval_ms,
            } => Some(Duration::from_millis(u64::from(*interval_ms))),
            _ => None,
        }
    }
}
