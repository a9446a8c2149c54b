//! Receiver state tracking and RDS cache

use fm_protocol::{
    AudioMode, AudioPath, BandConfiguration, Frequency, RdsDataType, RdsMode, ReceiverEvent,
    Region,
};
use serde::Serialize;
use tracing::{debug, warn};

/// `read_rds` value when a new Program Service name is ready
pub const RDS_EVENT_PS: u16 = 0x0008;

/// `read_rds` value when new Radio Text is ready
pub const RDS_EVENT_RT: u16 = 0x0040;

/// RDS text updates not yet reported through `read_rds`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RdsPending {
    /// A PS update is waiting
    pub ps: bool,
    /// An RT update is waiting
    pub rt: bool,
}

impl RdsPending {
    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        !self.ps && !self.rt
    }

    /// Report and clear one pending update, PS first
    pub fn take_next(&mut self) -> u16 {
        if self.ps {
            self.ps = false;
            RDS_EVENT_PS
        } else if self.rt {
            self.rt = false;
            RDS_EVENT_RT
        } else {
            0
        }
    }
}

/// Last known state of the receiver, as reported by link events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceiverState {
    /// Link reported attachment and has not detached since
    pub link_attached: bool,
    /// Most recent status reported the radio on
    pub radio_on: bool,
    /// Last known in-band tuned frequency
    pub tuned_frequency: Option<Frequency>,
    pub rssi: i32,
    pub snr: i32,
    pub audio_mode: AudioMode,
    pub audio_path: AudioPath,
    pub volume: Option<u8>,
    pub world_region: Option<Region>,
    /// Last noise floor estimate
    pub noise_floor: Option<i32>,
    pub muted: bool,
    pub rds_mode: RdsMode,
    pub af_enabled: bool,
    /// Program Service name (up to 8 characters)
    pub rds_program_service: Option<String>,
    /// Radio Text (up to 64 characters)
    pub rds_radio_text: Option<String>,
    pub rds_program_type: Option<u8>,
    pub rds_program_type_name: Option<String>,
    /// Updates waiting to be drained by `read_rds`
    pub rds_pending: RdsPending,
}

impl ReceiverState {
    /// Fold one event into the state
    pub fn apply(&mut self, event: &ReceiverEvent, band: &BandConfiguration) {
        match event {
            ReceiverEvent::Status {
                frequency,
                rssi,
                snr,
                radio_on,
                program_type,
                program_service,
                radio_text,
                program_type_name,
                muted,
            } => {
                self.radio_on = *radio_on;
                self.set_frequency(*frequency, band);
                self.rssi = *rssi;
                self.snr = *snr;
                self.muted = *muted;
                if self.rds_mode.is_on() {
                    self.rds_program_type = Some(*program_type);
                    if let Some(ps) = non_empty(program_service) {
                        self.rds_program_service = Some(ps);
                    }
                    if let Some(rt) = non_empty(radio_text) {
                        self.rds_radio_text = Some(rt);
                    }
                    if let Some(ptyn) = non_empty(program_type_name) {
                        self.rds_program_type_name = Some(ptyn);
                    }
                }
            }
            ReceiverEvent::SeekComplete {
                frequency,
                rssi,
                snr,
                success,
            } => {
                if *success {
                    self.set_frequency(*frequency, band);
                    self.rssi = *rssi;
                    self.snr = *snr;
                }
            }
            ReceiverEvent::RdsMode { mode, af_enabled } => {
                self.rds_mode = *mode;
                self.af_enabled = *af_enabled;
                if !mode.is_on() {
                    self.rds_pending = RdsPending::default();
                }
            }
            ReceiverEvent::RdsData {
                data_type, text, ..
            } => self.apply_rds_data(*data_type, text),
            ReceiverEvent::AudioMode { mode } => self.audio_mode = *mode,
            ReceiverEvent::AudioPath { path } => self.audio_path = *path,
            ReceiverEvent::NoiseFloor { level } => self.noise_floor = Some(*level),
            ReceiverEvent::LiveQuality { rssi, snr } => {
                self.rssi = *rssi;
                self.snr = *snr;
            }
            ReceiverEvent::WorldRegion { region } => self.world_region = Some(*region),
            ReceiverEvent::Volume { volume, .. } => self.volume = Some(*volume),
        }
    }

    fn apply_rds_data(&mut self, data_type: RdsDataType, text: &str) {
        if !self.rds_mode.is_on() {
            debug!(?data_type, "dropping RDS data while decoder is off");
            return;
        }
        match data_type {
            RdsDataType::Ps => {
                self.rds_program_service = Some(text.to_string());
                self.rds_pending.ps = true;
            }
            RdsDataType::Rt => {
                self.rds_radio_text = Some(text.to_string());
                self.rds_pending.rt = true;
            }
            RdsDataType::Ptyn => self.rds_program_type_name = Some(text.to_string()),
            RdsDataType::Pty => {
                if let Ok(pty) = text.trim().parse() {
                    self.rds_program_type = Some(pty);
                }
            }
            RdsDataType::Other(code) => debug!(code, "ignoring RDS data type"),
        }
    }

    fn set_frequency(&mut self, frequency: Frequency, band: &BandConfiguration) {
        if band.contains(frequency) {
            self.tuned_frequency = Some(frequency);
        } else {
            warn!(%frequency, "ignoring out-of-band frequency report");
        }
    }

    /// Drain one pending RDS update; 0 when RDS is off or nothing is pending
    pub fn take_rds_event(&mut self) -> u16 {
        if !self.rds_mode.is_on() {
            return 0;
        }
        self.rds_pending.take_next()
    }

    /// Reset everything, as after a link detach
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Format the tuned frequency for display
    pub fn frequency_display(&self) -> String {
        match self.tuned_frequency {
            Some(freq) => freq.to_string(),
            None => "---".to_string(),
        }
    }
}

fn non_empty(text: &Option<String>) -> Option<String> {
    text.as_deref()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
