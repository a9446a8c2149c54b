//! Virtual FM receiver
//!
//! Models the service side of a receiver link: power, tuning, seeks that
//! wrap at the band edge, abortable seeks, RDS text for tuned stations and
//! the acceptance codes the real service returns. Events are delivered on
//! a courier thread after a configurable latency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use fm_protocol::{
    AcceptanceCode, AfMode, AudioMode, AudioPath, BandConfiguration, Frequency, LinkListener,
    LinkNotification, RdsCondition, RdsDataType, RdsMode, ReceiverCommand, ReceiverEvent,
    ReceiverLink, Region, ScanDirection, ScanMode, StepSize,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::courier::{CancelGuard, Courier};
use crate::error::SimError;

/// A broadcast the virtual receiver can pick up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub frequency: Frequency,
    /// Signal strength in dBm
    pub rssi: i32,
    pub snr: i32,
    #[serde(default)]
    pub program_service: Option<String>,
    #[serde(default)]
    pub radio_text: Option<String>,
    #[serde(default)]
    pub program_type: u8,
    #[serde(default)]
    pub traffic_program: bool,
}

impl Station {
    pub fn new(frequency: Frequency, rssi: i32) -> Self {
        Self {
            frequency,
            rssi,
            snr: 25,
            program_service: None,
            radio_text: None,
            program_type: 0,
            traffic_program: false,
        }
    }

    pub fn with_ps(mut self, ps: impl Into<String>) -> Self {
        self.program_service = Some(ps.into());
        self
    }

    pub fn with_rt(mut self, rt: impl Into<String>) -> Self {
        self.radio_text = Some(rt.into());
        self
    }

    pub fn with_pty(mut self, pty: u8) -> Self {
        self.program_type = pty;
        self
    }

    pub fn with_tp(mut self) -> Self {
        self.traffic_program = true;
        self
    }

    /// Strong enough for a seek with this minimum signal strength
    fn audible(&self, min_signal: u8) -> bool {
        self.rssi >= -i32::from(min_signal)
    }
}

/// Configuration for creating a virtual receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualReceiverConfig {
    /// Band the receiver starts in
    pub band: BandConfiguration,
    /// Stations on the air
    pub stations: Vec<Station>,
    /// Delay before ordinary events are delivered
    pub event_latency_ms: u64,
    /// Delay before a seek completes
    pub seek_latency_ms: u64,
    /// RSSI reported where no station transmits
    pub noise_floor: i32,
}

impl Default for VirtualReceiverConfig {
    fn default() -> Self {
        Self {
            band: BandConfiguration::default(),
            stations: Vec::new(),
            event_latency_ms: 2,
            seek_latency_ms: 10,
            noise_floor: -110,
        }
    }
}

struct SeekInFlight {
    start: Frequency,
    due: Instant,
}

struct Chip {
    listener: Option<Arc<dyn LinkListener>>,
    courier: Option<Courier>,
    band: BandConfiguration,
    stations: Vec<Station>,
    event_latency: Duration,
    seek_latency: Duration,
    noise_floor: i32,

    powered: bool,
    frequency: Frequency,
    muted: bool,
    rds_mode: RdsMode,
    af: AfMode,
    audio_mode: AudioMode,
    audio_path: AudioPath,
    volume: u8,
    step: StepSize,
    snr_threshold: u8,
    live_polling: Option<Duration>,

    seek: Option<SeekInFlight>,
    seek_epoch: Arc<AtomicU64>,
    silent: bool,
    history: Vec<ReceiverCommand>,
}

/// A simulated receiver implementing [`ReceiverLink`]
pub struct VirtualReceiver {
    chip: Mutex<Chip>,
}

impl VirtualReceiver {
    pub fn new(config: VirtualReceiverConfig) -> Self {
        let mut stations = config.stations;
        stations.sort_by_key(|s| s.frequency);
        Self {
            chip: Mutex::new(Chip {
                listener: None,
                courier: None,
                band: config.band,
                stations,
                event_latency: Duration::from_millis(config.event_latency_ms),
                seek_latency: Duration::from_millis(config.seek_latency_ms),
                noise_floor: config.noise_floor,
                powered: false,
                frequency: config.band.low,
                muted: false,
                rds_mode: RdsMode::Off,
                af: AfMode::Off,
                audio_mode: AudioMode::default(),
                audio_path: AudioPath::None,
                volume: 0,
                step: StepSize::default(),
                snr_threshold: 0,
                live_polling: None,
                seek: None,
                seek_epoch: Arc::new(AtomicU64::new(0)),
                silent: false,
                history: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Chip> {
        self.chip.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Put a station on the air
    pub fn add_station(&self, station: Station) -> Result<(), SimError> {
        let mut chip = self.lock();
        if !chip.band.contains(station.frequency) {
            return Err(SimError::OutOfBand(station.frequency));
        }
        if !chip.band.is_valid(station.frequency) {
            return Err(SimError::OffGrid(station.frequency));
        }
        if chip.station_at(station.frequency).is_some() {
            return Err(SimError::Duplicate(station.frequency));
        }
        chip.stations.push(station);
        chip.stations.sort_by_key(|s| s.frequency);
        Ok(())
    }

    /// Take a station off the air
    pub fn remove_station(&self, frequency: Frequency) -> bool {
        let mut chip = self.lock();
        let before = chip.stations.len();
        chip.stations.retain(|s| s.frequency != frequency);
        chip.stations.len() != before
    }

    /// Change the RDS text a station broadcasts; re-emitted if tuned with RDS on
    pub fn update_station_text(
        &self,
        frequency: Frequency,
        ps: Option<String>,
        rt: Option<String>,
    ) -> bool {
        let mut chip = self.lock();
        let Some(station) = chip.stations.iter_mut().find(|s| s.frequency == frequency) else {
            return false;
        };
        station.program_service = ps;
        station.radio_text = rt;
        if chip.powered && chip.frequency == frequency && chip.rds_mode.is_on() {
            for event in chip.rds_events() {
                chip.send_event(event, chip.event_latency);
            }
        }
        true
    }

    /// Accept commands but never answer them
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Simulate the service going away
    pub fn drop_service(&self) {
        warn!("virtual receiver service dropped");
        self.lock().shut_down();
    }

    pub fn is_powered(&self) -> bool {
        self.lock().powered
    }

    pub fn frequency(&self) -> Frequency {
        self.lock().frequency
    }

    pub fn rds_mode(&self) -> RdsMode {
        self.lock().rds_mode
    }

    pub fn af_enabled(&self) -> bool {
        self.lock().af == AfMode::On
    }

    pub fn audio_mode(&self) -> AudioMode {
        self.lock().audio_mode
    }

    pub fn audio_path(&self) -> AudioPath {
        self.lock().audio_path
    }

    pub fn volume(&self) -> u8 {
        self.lock().volume
    }

    pub fn step_size(&self) -> StepSize {
        self.lock().step
    }

    pub fn snr_threshold(&self) -> u8 {
        self.lock().snr_threshold
    }

    /// Every command submitted so far, accepted or not
    pub fn history(&self) -> Vec<ReceiverCommand> {
        self.lock().history.clone()
    }

    /// One-line summary for logs
    pub fn state_summary(&self) -> String {
        let chip = self.lock();
        format!(
            "{} {} rds={:?} vol={} stations={}",
            if chip.powered { "on" } else { "off" },
            chip.frequency,
            chip.rds_mode,
            chip.volume,
            chip.stations.len()
        )
    }
}

impl ReceiverLink for VirtualReceiver {
    fn attach(&self, listener: Arc<dyn LinkListener>) -> AcceptanceCode {
        let mut chip = self.lock();
        if chip.courier.is_none() {
            match Courier::spawn("fm-sim-delivery") {
                Ok(courier) => chip.courier = Some(courier),
                Err(e) => {
                    warn!("could not start delivery thread: {}", e);
                    return AcceptanceCode::ServerFail;
                }
            }
        }
        chip.listener = Some(listener);
        info!("virtual receiver attached");
        let latency = chip.event_latency;
        chip.send(LinkNotification::Attached, latency, None);
        AcceptanceCode::Ok
    }

    fn detach(&self) {
        self.lock().shut_down();
    }

    fn submit(&self, command: &ReceiverCommand) -> AcceptanceCode {
        let mut chip = self.lock();
        chip.history.push(command.clone());
        if chip.listener.is_none() {
            return AcceptanceCode::ServerFail;
        }
        if !chip.powered && command.requires_radio_on() {
            return AcceptanceCode::IllegalCommand;
        }
        if command.validate().is_err() {
            return AcceptanceCode::IllegalParameters;
        }
        debug!(command = command.name(), "virtual receiver executing");
        chip.execute(command)
    }
}

impl Chip {
    fn execute(&mut self, command: &ReceiverCommand) -> AcceptanceCode {
        match command {
            ReceiverCommand::TurnOn { functionality } => {
                let region = functionality.region();
                if region != self.band.region {
                    self.set_region(region, BandConfiguration::for_region(region));
                }
                self.powered = true;
                self.send_event(self.status(), self.event_latency);
            }
            ReceiverCommand::TurnOff => {
                self.cancel_seek();
                self.powered = false;
                self.rds_mode = RdsMode::Off;
                self.live_polling = None;
                self.send_event(self.status(), self.event_latency);
            }
            ReceiverCommand::Tune { frequency } => {
                if !self.band.is_valid(*frequency) {
                    return AcceptanceCode::IllegalParameters;
                }
                self.cancel_seek();
                self.frequency = *frequency;
                self.send_event(self.status(), self.event_latency);
                self.after_retune(self.event_latency, None);
            }
            ReceiverCommand::GetStatus => self.send_event(self.status(), self.event_latency),
            ReceiverCommand::Mute { mute } => {
                self.muted = *mute;
                self.send_event(self.status(), self.event_latency);
            }
            ReceiverCommand::Seek { mode, min_signal } => {
                let target = self.seek_target(*mode, *min_signal, |_| true);
                self.start_seek(target);
            }
            ReceiverCommand::SeekRds {
                mode,
                min_signal,
                condition,
                value,
            } => {
                let (condition, value) = (*condition, *value);
                let target = self.seek_target(*mode, *min_signal, |s| {
                    rds_condition_met(s, condition, value)
                });
                self.start_seek(target);
            }
            ReceiverCommand::SeekCombo {
                start,
                end,
                min_signal,
                direction,
                rds_condition,
                rds_value,
                ..
            } => {
                if !self.band.contains(*start) || !self.band.contains(*end) {
                    return AcceptanceCode::IllegalParameters;
                }
                let (lo, hi) = if start <= end { (*start, *end) } else { (*end, *start) };
                let (condition, value) = (*rds_condition, *rds_value);
                let candidates = self.stations.iter().filter(|s| {
                    s.audible(*min_signal)
                        && lo <= s.frequency
                        && s.frequency <= hi
                        && rds_condition_met(s, condition, value)
                });
                let target = match direction {
                    ScanDirection::Up => candidates.map(|s| s.frequency).min(),
                    ScanDirection::Down => candidates.map(|s| s.frequency).max(),
                };
                self.start_seek(target);
            }
            ReceiverCommand::AbortSeek => {
                if let Some(start) = self.cancel_seek() {
                    debug!(%start, "seek aborted");
                    self.frequency = start;
                    let event = self.seek_complete(start, false);
                    self.send_event(event, self.event_latency);
                }
            }
            ReceiverCommand::SetRdsMode { mode, af, .. } => {
                self.rds_mode = *mode;
                self.af = *af;
                let event = ReceiverEvent::RdsMode {
                    mode: *mode,
                    af_enabled: *af == AfMode::On,
                };
                self.send_event(event, self.event_latency);
                if mode.is_on() {
                    for event in self.rds_events() {
                        self.send_event(event, self.event_latency);
                    }
                }
            }
            ReceiverCommand::SetAudioMode { mode } => {
                self.audio_mode = *mode;
                self.send_event(ReceiverEvent::AudioMode { mode: *mode }, self.event_latency);
            }
            ReceiverCommand::SetAudioPath { path } => {
                self.audio_path = *path;
                self.send_event(ReceiverEvent::AudioPath { path: *path }, self.event_latency);
            }
            ReceiverCommand::SetStepSize { step } => self.step = *step,
            ReceiverCommand::SetVolume { volume } => {
                self.volume = *volume;
                let event = ReceiverEvent::Volume {
                    status: 0,
                    volume: *volume,
                };
                self.send_event(event, self.event_latency);
            }
            ReceiverCommand::SetWorldRegion { region, deemphasis } => {
                let mut band = BandConfiguration::for_region(*region);
                band.deemphasis = *deemphasis;
                self.set_region(*region, band);
                self.send_event(
                    ReceiverEvent::WorldRegion { region: *region },
                    self.event_latency,
                );
            }
            ReceiverCommand::EstimateNoiseFloor { .. } => {
                let event = ReceiverEvent::NoiseFloor {
                    level: self.noise_floor,
                };
                self.send_event(event, self.event_latency);
            }
            ReceiverCommand::SetLiveAudioPolling { .. } => {
                self.live_polling = command.poll_interval();
                if let Some(interval) = self.live_polling {
                    self.send_event(self.live_quality(), interval);
                }
            }
            ReceiverCommand::SetSnrThreshold { threshold } => self.snr_threshold = *threshold,
        }
        AcceptanceCode::Ok
    }

    fn set_region(&mut self, region: Region, band: BandConfiguration) {
        info!(region = region.name(), "virtual receiver region changed");
        self.band = band;
        if !self.band.contains(self.frequency) {
            self.frequency = self.band.low;
        }
    }

    fn station_at(&self, frequency: Frequency) -> Option<&Station> {
        self.stations.iter().find(|s| s.frequency == frequency)
    }

    fn status(&self) -> ReceiverEvent {
        let station = self.station_at(self.frequency);
        let rds = station.filter(|_| self.rds_mode.is_on());
        ReceiverEvent::Status {
            frequency: self.frequency,
            rssi: station.map_or(self.noise_floor, |s| s.rssi),
            snr: station.map_or(0, |s| s.snr),
            radio_on: self.powered,
            program_type: rds.map_or(0, |s| s.program_type),
            program_service: rds.and_then(|s| s.program_service.clone()),
            radio_text: rds.and_then(|s| s.radio_text.clone()),
            program_type_name: None,
            muted: self.muted,
        }
    }

    fn seek_complete(&self, frequency: Frequency, success: bool) -> ReceiverEvent {
        let station = self.station_at(frequency);
        ReceiverEvent::SeekComplete {
            frequency,
            rssi: station.map_or(self.noise_floor, |s| s.rssi),
            snr: station.map_or(0, |s| s.snr),
            success,
        }
    }

    fn live_quality(&self) -> ReceiverEvent {
        let station = self.station_at(self.frequency);
        ReceiverEvent::LiveQuality {
            rssi: station.map_or(self.noise_floor, |s| s.rssi),
            snr: station.map_or(0, |s| s.snr),
        }
    }

    /// RDS groups for the tuned station, if RDS is on
    fn rds_events(&self) -> Vec<ReceiverEvent> {
        let Some(station) = self.station_at(self.frequency) else {
            return Vec::new();
        };
        if !self.rds_mode.is_on() {
            return Vec::new();
        }
        let mut events = vec![ReceiverEvent::RdsData {
            data_type: RdsDataType::Pty,
            index: 0,
            text: station.program_type.to_string(),
        }];
        if let Some(ps) = &station.program_service {
            events.push(ReceiverEvent::RdsData {
                data_type: RdsDataType::Ps,
                index: 0,
                text: ps.clone(),
            });
        }
        if let Some(rt) = &station.radio_text {
            events.push(ReceiverEvent::RdsData {
                data_type: RdsDataType::Rt,
                index: 0,
                text: rt.clone(),
            });
        }
        events
    }

    fn seek_target(
        &self,
        mode: ScanMode,
        min_signal: u8,
        accept: impl Fn(&Station) -> bool,
    ) -> Option<Frequency> {
        let from = self.frequency;
        let band = self.band;
        let candidates = self
            .stations
            .iter()
            .filter(|s| s.audible(min_signal) && band.contains(s.frequency) && accept(s));
        match mode {
            ScanMode::Full => candidates.max_by_key(|s| s.rssi).map(|s| s.frequency),
            // Nothing ahead: the tuner wraps and stops at the opposite band edge
            ScanMode::Seek {
                direction: ScanDirection::Up,
                ..
            } => Some(
                candidates
                    .map(|s| s.frequency)
                    .filter(|f| *f > from)
                    .min()
                    .unwrap_or(band.low),
            ),
            ScanMode::Seek {
                direction: ScanDirection::Down,
                ..
            } => Some(
                candidates
                    .map(|s| s.frequency)
                    .filter(|f| *f < from)
                    .max()
                    .unwrap_or(band.high),
            ),
        }
    }

    fn start_seek(&mut self, target: Option<Frequency>) {
        self.cancel_seek();
        let start = self.frequency;
        let (frequency, success) = match target {
            Some(frequency) => (frequency, true),
            None => (start, false),
        };
        self.frequency = frequency;
        self.seek = Some(SeekInFlight {
            start,
            due: Instant::now() + self.seek_latency,
        });
        debug!(%start, %frequency, success, "seek scheduled");

        let guard = CancelGuard::new(self.seek_epoch.clone());
        let event = self.seek_complete(frequency, success);
        self.send(
            LinkNotification::Event(event),
            self.seek_latency,
            Some(guard.clone()),
        );
        if success {
            self.after_retune(self.seek_latency, Some(guard));
        }
    }

    /// Cancel a seek still in progress, returning where it started
    fn cancel_seek(&mut self) -> Option<Frequency> {
        let seek = self.seek.take()?;
        if seek.due <= Instant::now() {
            return None;
        }
        self.seek_epoch.fetch_add(1, Ordering::AcqRel);
        Some(seek.start)
    }

    // RDS and live quality for the newly tuned station
    fn after_retune(&self, delay: Duration, guard: Option<CancelGuard>) {
        for event in self.rds_events() {
            self.send(LinkNotification::Event(event), delay, guard.clone());
        }
        if let Some(interval) = self.live_polling {
            self.send(
                LinkNotification::Event(self.live_quality()),
                delay + interval,
                guard,
            );
        }
    }

    fn send_event(&self, event: ReceiverEvent, delay: Duration) {
        self.send(LinkNotification::Event(event), delay, None);
    }

    fn send(&self, notification: LinkNotification, delay: Duration, guard: Option<CancelGuard>) {
        if self.silent && matches!(notification, LinkNotification::Event(_)) {
            return;
        }
        let (Some(listener), Some(courier)) = (&self.listener, &self.courier) else {
            return;
        };
        match guard {
            Some(guard) => courier.send_guarded(listener, notification, delay, guard),
            None => courier.send(listener, notification, delay),
        }
    }

    fn shut_down(&mut self) {
        self.cancel_seek();
        if self.listener.is_some() {
            self.send(LinkNotification::Detached, Duration::ZERO, None);
            info!("virtual receiver detached");
        }
        self.listener = None;
        self.courier = None;
        self.powered = false;
        self.rds_mode = RdsMode::Off;
        self.live_polling = None;
    }
}

fn rds_condition_met(station: &Station, condition: RdsCondition, value: u8) -> bool {
    match condition {
        RdsCondition::None => true,
        RdsCondition::Pty => station.program_type == value,
        RdsCondition::Tp => station.traffic_program,
    }
}
