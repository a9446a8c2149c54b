//! Public receiver facade
//!
//! [`FmRadio`] is the blocking API applications use. Each method is one
//! coordinator session plus argument adaptation and a check that the
//! confirming event reports the requested outcome. RDS accessors read the
//! cached state and never block on the link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fm_protocol::{
    AfMode, AudioMode, AudioPath, BandConfiguration, Frequency, NflLevel, ProtocolError,
    RdsCondition, RdsFeatures, RdsMode, ReceiverCommand, ReceiverEvent, ReceiverLink, Region, ScanDirection,
    ScanMode, StepSize,
};
use tracing::{debug, info};

use crate::config::{ConfigError, ReceiverConfig};
use crate::coordinator::{Coordinator, Session};
use crate::error::{ReceiverError, Result};
use crate::scan::{AutoScan, ScanResult};
use crate::state::ReceiverState;

/// Answer to `is_rds_support`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdsSupport {
    NotSupported = 0,
    Supported = 1,
}

impl RdsSupport {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Answer to `switch_antenna`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntennaStatus {
    Switched = 0,
    Failed = 1,
    NotSupported = 2,
}

impl AntennaStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Blocking control API for one FM receiver
pub struct FmRadio {
    coordinator: Coordinator,
    config: ReceiverConfig,
    scan_cancel: AtomicBool,
}

impl FmRadio {
    /// Wrap `link`; call [`open`](Self::open) before anything else.
    ///
    /// The configuration is validated first, so a hand-built band with a
    /// zero step or inverted limits is refused here.
    pub fn new(link: Arc<dyn ReceiverLink>, config: ReceiverConfig) -> Result<Self> {
        config.validate().map_err(|e| match e {
            ConfigError::Invalid(e) => ReceiverError::InvalidParameter(e),
            other => {
                ReceiverError::InvalidParameter(ProtocolError::InvalidParameter(other.to_string()))
            }
        })?;
        let coordinator = Coordinator::new(link, config.band(), config.command_timeout());
        Ok(Self {
            coordinator,
            config,
            scan_cancel: AtomicBool::new(false),
        })
    }

    /// Configuration the radio was built with
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Band currently used for validation and channel numbers
    pub fn band(&self) -> BandConfiguration {
        self.coordinator.band()
    }

    /// Attach to the link, waiting for it to report ready
    pub fn open(&self) -> Result<()> {
        self.coordinator.attach()?;
        info!("receiver opened");
        Ok(())
    }

    /// Detach from the link; any pending operation fails with `LinkLost`
    pub fn close(&self) {
        self.scan_cancel.store(true, Ordering::Release);
        self.coordinator.detach();
        info!("receiver closed");
    }

    /// Whether the link is attached
    pub fn is_open(&self) -> bool {
        self.coordinator.is_attached()
    }

    /// Power on, tune to `frequency`, route audio and set volume
    pub fn power_up(&self, frequency: Frequency) -> Result<()> {
        self.band().check(frequency)?;
        let mut session = self.coordinator.session()?;

        let on = ReceiverCommand::TurnOn {
            functionality: self.config.functionality,
        };
        match awaited(&mut session, &on)? {
            ReceiverEvent::Status { radio_on: true, .. } => {}
            _ => return Err(unconfirmed(&on)),
        }

        session.tune(frequency)?;

        let path = ReceiverCommand::SetAudioPath {
            path: self.config.audio_path,
        };
        match awaited(&mut session, &path)? {
            ReceiverEvent::AudioPath { path } if path == self.config.audio_path => {}
            _ => return Err(unconfirmed(&path)),
        }

        let volume = ReceiverCommand::SetVolume {
            volume: self.config.volume,
        };
        match awaited(&mut session, &volume)? {
            ReceiverEvent::Volume { volume, .. } if volume == self.config.volume => {}
            _ => return Err(unconfirmed(&volume)),
        }

        info!(%frequency, "receiver powered up");
        Ok(())
    }

    /// Power off and confirm the radio reports off
    pub fn power_down(&self) -> Result<()> {
        self.scan_cancel.store(true, Ordering::Release);
        let off = ReceiverCommand::TurnOff;
        match self.run(&off)? {
            ReceiverEvent::Status {
                radio_on: false, ..
            } => {
                info!("receiver powered down");
                Ok(())
            }
            _ => Err(unconfirmed(&off)),
        }
    }

    /// Tune to `frequency`; fails unless the receiver confirms that exact frequency
    pub fn tune(&self, frequency: Frequency) -> Result<()> {
        self.band().check(frequency)?;
        self.coordinator.session()?.tune(frequency)?;
        Ok(())
    }

    /// Last confirmed tuned frequency
    pub fn tuned_frequency(&self) -> Option<Frequency> {
        self.coordinator.with_state(|state| state.tuned_frequency)
    }

    /// Seek from the current frequency.
    ///
    /// Returns `None` when the receiver stopped where it started.
    pub fn seek(&self, direction: ScanDirection) -> Result<Option<Frequency>> {
        let mut session = self.coordinator.session()?;
        let start = session.snapshot().tuned_frequency;
        let command = self.seek_command(direction);
        seek_result(&mut session, &command, start)
    }

    /// Tune to `frequency`, then seek from there
    pub fn seek_from(
        &self,
        frequency: Frequency,
        direction: ScanDirection,
    ) -> Result<Option<Frequency>> {
        self.band().check(frequency)?;
        let mut session = self.coordinator.session()?;
        session.tune(frequency)?;
        let command = self.seek_command(direction);
        seek_result(&mut session, &command, Some(frequency))
    }

    /// Seek for a station whose RDS data satisfies `condition`
    pub fn seek_rds(
        &self,
        direction: ScanDirection,
        condition: RdsCondition,
        value: u8,
    ) -> Result<Option<Frequency>> {
        let mut session = self.coordinator.session()?;
        let start = session.snapshot().tuned_frequency;
        let command = ReceiverCommand::SeekRds {
            mode: self.scan_mode(direction),
            min_signal: self.config.min_signal_strength,
            condition,
            value,
        };
        seek_result(&mut session, &command, start)
    }

    /// Seek within `start..=end` only
    pub fn seek_range(
        &self,
        start: Frequency,
        end: Frequency,
        direction: ScanDirection,
    ) -> Result<Option<Frequency>> {
        let band = self.band();
        band.check(start)?;
        band.check(end)?;
        let mut session = self.coordinator.session()?;
        let from = session.snapshot().tuned_frequency;
        let command = ReceiverCommand::SeekCombo {
            start,
            end,
            min_signal: self.config.min_signal_strength,
            direction,
            method: self.config.scan_method,
            multi_channel: false,
            rds_condition: RdsCondition::None,
            rds_value: 0,
        };
        seek_result(&mut session, &command, from)
    }

    /// Sweep the band upward and return the channels found.
    ///
    /// Errors only when the scan cannot start; failures during the sweep end
    /// it with whatever was collected.
    pub fn auto_scan(&self) -> Result<ScanResult> {
        let mut session = self.coordinator.session()?;
        self.scan_cancel.store(false, Ordering::Release);
        let band = self.band();
        info!(low = %band.low, high = %band.high, "starting auto scan");
        let result = AutoScan::new(band, &self.scan_cancel)
            .min_signal(self.config.min_signal_strength)
            .method(self.config.scan_method)
            .run(&mut session);
        Ok(result)
    }

    /// Stop a running scan.
    ///
    /// Sends `AbortSeek` without waiting; the seek in flight returns and
    /// the scan ends on its next step.
    pub fn stop_scan(&self) -> Result<()> {
        self.scan_cancel.store(true, Ordering::Release);
        debug!("stop scan requested");
        self.coordinator
            .submit_unawaited(&ReceiverCommand::AbortSeek)
    }

    /// Turn the RDS decoder on (PS and RT, AF off) or off
    pub fn set_rds(&self, on: bool) -> Result<()> {
        let mode = if on { RdsMode::Default } else { RdsMode::Off };
        self.set_rds_mode(mode, RdsFeatures::PS | RdsFeatures::RT, AfMode::Off)
    }

    /// Enable RDS with alternate frequency following; returns the current channel
    pub fn active_af(&self) -> Result<u16> {
        let features = RdsFeatures::PS
            | RdsFeatures::RT
            | RdsFeatures::TP
            | RdsFeatures::PTY
            | RdsFeatures::PTYN;
        self.set_rds_mode(RdsMode::Default, features, AfMode::On)?;
        let band = self.band();
        self.tuned_frequency()
            .map(|f| band.channel_of(f))
            .ok_or_else(|| ReceiverError::Unconfirmed("no tuned frequency".into()))
    }

    fn set_rds_mode(&self, mode: RdsMode, features: RdsFeatures, af: AfMode) -> Result<()> {
        let command = ReceiverCommand::SetRdsMode {
            mode,
            features,
            af,
            af_threshold: self.config.af_threshold,
        };
        match self.run(&command)? {
            ReceiverEvent::RdsMode { mode: reported, .. } if reported == mode => Ok(()),
            _ => Err(unconfirmed(&command)),
        }
    }

    /// Report and clear one pending RDS update: `0x0008` PS, `0x0040` RT, 0 none
    pub fn read_rds(&self) -> u16 {
        self.coordinator.with_state(|state| {
            if state.link_attached {
                state.take_rds_event()
            } else {
                0
            }
        })
    }

    /// Cached Program Service name
    pub fn get_ps(&self) -> Option<String> {
        self.rds_text(|state| state.rds_program_service.clone())
    }

    /// Cached Radio Text
    pub fn get_lr_text(&self) -> Option<String> {
        self.rds_text(|state| state.rds_radio_text.clone())
    }

    fn rds_text(&self, read: impl FnOnce(&ReceiverState) -> Option<String>) -> Option<String> {
        self.coordinator.with_state(|state| {
            if state.link_attached && state.rds_mode.is_on() {
                read(state)
            } else {
                None
            }
        })
    }

    /// Mute or unmute audio
    pub fn set_mute(&self, mute: bool) -> Result<()> {
        let command = ReceiverCommand::Mute { mute };
        match self.run(&command)? {
            ReceiverEvent::Status { muted, .. } if muted == mute => Ok(()),
            _ => Err(unconfirmed(&command)),
        }
    }

    pub fn is_rds_support(&self) -> RdsSupport {
        RdsSupport::Supported
    }

    pub fn switch_antenna(&self, _antenna: u8) -> AntennaStatus {
        AntennaStatus::NotSupported
    }

    pub fn set_audio_mode(&self, mode: AudioMode) -> Result<()> {
        let command = ReceiverCommand::SetAudioMode { mode };
        match self.run(&command)? {
            ReceiverEvent::AudioMode { mode: reported } if reported == mode => Ok(()),
            _ => Err(unconfirmed(&command)),
        }
    }

    pub fn set_audio_path(&self, path: AudioPath) -> Result<()> {
        let command = ReceiverCommand::SetAudioPath { path };
        match self.run(&command)? {
            ReceiverEvent::AudioPath { path: reported } if reported == path => Ok(()),
            _ => Err(unconfirmed(&command)),
        }
    }

    pub fn set_volume(&self, volume: u8) -> Result<()> {
        let command = ReceiverCommand::SetVolume { volume };
        match self.run(&command)? {
            ReceiverEvent::Volume {
                volume: reported, ..
            } if reported == volume => Ok(()),
            _ => Err(unconfirmed(&command)),
        }
    }

    /// Switch region; the band follows unless the config pins one
    pub fn set_world_region(&self, region: Region) -> Result<()> {
        let command = ReceiverCommand::SetWorldRegion {
            region,
            deemphasis: BandConfiguration::for_region(region).deemphasis,
        };
        match self.run(&command)? {
            ReceiverEvent::WorldRegion { region: reported } if reported == region => {
                if self.config.band.is_none() {
                    self.coordinator
                        .set_band(BandConfiguration::for_region(region));
                }
                info!(region = region.name(), "world region set");
                Ok(())
            }
            _ => Err(unconfirmed(&command)),
        }
    }

    /// Estimate the noise floor; returns the RSSI reported
    pub fn estimate_noise_floor(&self, level: NflLevel) -> Result<i32> {
        let command = ReceiverCommand::EstimateNoiseFloor { level };
        match self.run(&command)? {
            ReceiverEvent::NoiseFloor { level } => Ok(level),
            _ => Err(unconfirmed(&command)),
        }
    }

    /// Start or stop periodic audio quality reports
    pub fn set_live_audio_polling(&self, enabled: bool, interval: Duration) -> Result<()> {
        let interval_ms = u32::try_from(interval.as_millis()).unwrap_or(u32::MAX);
        self.coordinator
            .execute(&ReceiverCommand::SetLiveAudioPolling {
                enabled,
                interval_ms,
            })
            .map(|_| ())
    }

    pub fn set_snr_threshold(&self, threshold: u8) -> Result<()> {
        self.coordinator
            .execute(&ReceiverCommand::SetSnrThreshold { threshold })
            .map(|_| ())
    }

    pub fn set_step_size(&self, step: StepSize) -> Result<()> {
        self.coordinator
            .execute(&ReceiverCommand::SetStepSize { step })
            .map(|_| ())
    }

    /// Ask for a fresh status report and return the updated state
    pub fn refresh_status(&self) -> Result<ReceiverState> {
        self.run(&ReceiverCommand::GetStatus)?;
        Ok(self.coordinator.snapshot())
    }

    /// Copy of the tracked receiver state
    pub fn snapshot(&self) -> ReceiverState {
        self.coordinator.snapshot()
    }

    fn run(&self, command: &ReceiverCommand) -> Result<ReceiverEvent> {
        let mut session = self.coordinator.session()?;
        awaited(&mut session, command)
    }

    fn scan_mode(&self, direction: ScanDirection) -> ScanMode {
        ScanMode::Seek {
            direction,
            method: self.config.scan_method,
        }
    }

    fn seek_command(&self, direction: ScanDirection) -> ReceiverCommand {
        ReceiverCommand::Seek {
            mode: self.scan_mode(direction),
            min_signal: self.config.min_signal_strength,
        }
    }
}

fn awaited(session: &mut Session<'_>, command: &ReceiverCommand) -> Result<ReceiverEvent> {
    session
        .execute(command)?
        .ok_or_else(|| unconfirmed(command))
}

fn seek_result(
    session: &mut Session<'_>,
    command: &ReceiverCommand,
    start: Option<Frequency>,
) -> Result<Option<Frequency>> {
    match awaited(session, command)? {
        ReceiverEvent::SeekComplete {
            frequency,
            success: true,
            ..
        } if Some(frequency) != start => {
            debug!(%frequency, "seek found station");
            Ok(Some(frequency))
        }
        _ => {
            debug!("seek found no new station");
            Ok(None)
        }
    }
}

fn unconfirmed(command: &ReceiverCommand) -> ReceiverError {
    ReceiverError::Unconfirmed(format!("{} not confirmed", command.name()))
}
