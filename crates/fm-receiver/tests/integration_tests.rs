//! Integration tests for the FM receiver control core
//!
//! These tests drive [`FmRadio`] end to end against the simulated links:
//! - Tuning, seeking and band wrap on a virtual receiver
//! - Auto-scan results and cancellation
//! - One operation in flight, timeouts and late replies
//! - Link loss while an operation is pending
//! - RDS text drained through `read_rds`

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fm_protocol::{
    AcceptanceCode, AfMode, AudioMode, Frequency, NflLevel, RdsCondition, ReceiverCommand, ReceiverEvent,
    ReceiverLink, Region, ScanDirection, StepSize,
};
use fm_receiver::{FmRadio, ReceiverConfig, ReceiverError, ScanStop, RDS_EVENT_PS, RDS_EVENT_RT};
use fm_sim::{ScriptedLink, Station, VirtualReceiver, VirtualReceiverConfig};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Stations on channels 2, 8, 39, 69 and 102 of the North American band
    pub fn demo_stations() -> Vec<Station> {
        vec![
            Station::new(Frequency(8790), -62).with_ps("KQED"),
            Station::new(Frequency(8910), -70),
            Station::new(Frequency(9530), -48)
                .with_ps("WXYZ")
                .with_rt("Morning drive"),
            Station::new(Frequency(10130), -80),
            Station::new(Frequency(10790), -66),
        ]
    }

    pub fn virtual_receiver(stations: Vec<Station>) -> Arc<VirtualReceiver> {
        Arc::new(VirtualReceiver::new(VirtualReceiverConfig {
            stations,
            ..VirtualReceiverConfig::default()
        }))
    }

    pub fn config_with_timeout(timeout_ms: u64) -> ReceiverConfig {
        ReceiverConfig {
            command_timeout_ms: timeout_ms,
            ..ReceiverConfig::default()
        }
    }

    /// Open the link and power up at `frequency`
    pub fn powered(link: Arc<dyn ReceiverLink>, config: ReceiverConfig, frequency: Frequency) -> FmRadio {
        let radio = FmRadio::new(link, config).unwrap();
        radio.open().unwrap();
        radio.power_up(frequency).unwrap();
        radio
    }

    /// Answers the way a cooperative receiver would
    pub fn echo(command: &ReceiverCommand) -> Vec<ReceiverEvent> {
        match command {
            ReceiverCommand::TurnOn { .. } => vec![ReceiverEvent::status(Frequency(8750), true)],
            ReceiverCommand::TurnOff => vec![ReceiverEvent::status(Frequency(8750), false)],
            ReceiverCommand::Tune { frequency } => vec![ReceiverEvent::status(*frequency, true)],
            ReceiverCommand::GetStatus => vec![ReceiverEvent::status(Frequency(9730), true)],
            ReceiverCommand::SetAudioPath { path } => vec![ReceiverEvent::AudioPath { path: *path }],
            ReceiverCommand::SetVolume { volume } => vec![ReceiverEvent::Volume {
                status: 0,
                volume: *volume,
            }],
            ReceiverCommand::SetRdsMode { mode, af, .. } => vec![ReceiverEvent::RdsMode {
                mode: *mode,
                af_enabled: *af == AfMode::On,
            }],
            _ => Vec::new(),
        }
    }

    pub fn scripted_link() -> Arc<ScriptedLink> {
        let link = Arc::new(ScriptedLink::new());
        link.respond_with(echo);
        link
    }

    /// Poll `condition` until it holds or two seconds pass
    pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

// ============================================================================
// Tuning Tests
// ============================================================================

mod tuning_tests {
    use super::*;

    #[test]
    fn tune_confirms_requested_frequency() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(8750));

        radio.tune(Frequency(9730)).unwrap();

        assert_eq!(radio.tuned_frequency(), Some(Frequency(9730)));
        assert_eq!(receiver.frequency(), Frequency(9730));
    }

    #[test]
    fn tune_reported_elsewhere_is_mismatch() {
        let link = helpers::scripted_link();
        link.respond_with(|command| match command {
            ReceiverCommand::Tune {
                frequency: Frequency(9730),
            } => vec![ReceiverEvent::status(Frequency(9750), true)],
            other => helpers::echo(other),
        });
        let radio = helpers::powered(link.clone(), ReceiverConfig::default(), Frequency(8750));

        let err = radio.tune(Frequency(9730)).unwrap_err();

        assert_eq!(
            err,
            ReceiverError::FrequencyMismatch {
                expected: Frequency(9730),
                actual: Frequency(9750),
            }
        );
        assert_eq!(err.status(), AcceptanceCode::Fail);
    }

    #[test]
    fn off_grid_frequency_never_reaches_link() {
        let link = helpers::scripted_link();
        let radio = helpers::powered(link.clone(), ReceiverConfig::default(), Frequency(8750));
        let before = link.submission_count();

        let err = radio.tune(Frequency(9740)).unwrap_err();
        assert_eq!(err.status(), AcceptanceCode::IllegalParameters);
        let err = radio.tune(Frequency(12000)).unwrap_err();
        assert_eq!(err.status(), AcceptanceCode::IllegalParameters);

        assert_eq!(link.submission_count(), before);
    }

    #[test]
    fn tune_before_power_up_is_illegal_command() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = FmRadio::new(receiver.clone(), ReceiverConfig::default()).unwrap();
        radio.open().unwrap();

        let err = radio.tune(Frequency(9730)).unwrap_err();

        assert_eq!(err, ReceiverError::RadioOff);
        assert_eq!(err.status(), AcceptanceCode::IllegalCommand);
        assert!(receiver.history().is_empty());
    }

    #[test]
    fn operations_before_open_are_not_ready() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = FmRadio::new(receiver, ReceiverConfig::default()).unwrap();

        assert_eq!(radio.power_up(Frequency(8750)), Err(ReceiverError::NotReady));
        assert_eq!(radio.read_rds(), 0);
        assert_eq!(radio.get_ps(), None);
    }

    #[test]
    fn seek_up_finds_next_station() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(8750));

        assert_eq!(radio.seek(ScanDirection::Up), Ok(Some(Frequency(8790))));
        assert_eq!(radio.seek(ScanDirection::Up), Ok(Some(Frequency(8910))));
        assert_eq!(radio.seek(ScanDirection::Down), Ok(Some(Frequency(8790))));
    }

    #[test]
    fn seek_past_top_station_wraps_to_band_start() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(10790));

        assert_eq!(radio.seek(ScanDirection::Up), Ok(Some(Frequency(8750))));
        assert_eq!(radio.tuned_frequency(), Some(Frequency(8750)));
    }

    #[test]
    fn seek_from_tunes_first() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(8750));

        let found = radio
            .seek_from(Frequency(9610), ScanDirection::Up)
            .unwrap();

        assert_eq!(found, Some(Frequency(10130)));
    }

    #[test]
    fn seek_range_stays_inside_bounds() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(8750));

        let found = radio
            .seek_range(Frequency(9010), Frequency(9990), ScanDirection::Up)
            .unwrap();

        assert_eq!(found, Some(Frequency(9530)));
    }

    #[test]
    fn seek_rds_skips_stations_without_traffic_flag() {
        let mut stations = helpers::demo_stations();
        stations.push(Station::new(Frequency(9930), -58).with_tp());
        let receiver = helpers::virtual_receiver(stations);
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(8750));

        let found = radio
            .seek_rds(ScanDirection::Up, RdsCondition::Tp, 0)
            .unwrap();

        assert_eq!(found, Some(Frequency(9930)));
    }
}

// ============================================================================
// Auto-Scan Tests
// ============================================================================

mod scan_tests {
    use super::*;

    #[test]
    fn scan_collects_every_station_in_order() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(8750));

        let result = radio.auto_scan().unwrap();

        assert_eq!(result.channels(), &[2, 8, 39, 69, 102]);
        assert_eq!(result.frequencies.first(), Some(&Frequency(8790)));
        assert_eq!(result.stop, ScanStop::NoProgress);
    }

    #[test]
    fn empty_band_scans_to_nothing() {
        let receiver = helpers::virtual_receiver(Vec::new());
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(9730));

        let result = radio.auto_scan().unwrap();

        assert!(result.is_empty());
        assert_eq!(radio.tuned_frequency(), Some(Frequency(8750)));
    }

    #[test]
    fn stations_below_min_signal_are_skipped() {
        let mut stations = helpers::demo_stations();
        stations.push(Station::new(Frequency(9930), -120));
        let receiver = helpers::virtual_receiver(stations);
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(8750));

        let result = radio.auto_scan().unwrap();

        assert_eq!(result.len(), 5);
        assert!(!result.frequencies.contains(&Frequency(9930)));
    }

    #[test]
    fn stop_scan_ends_sweep_and_frees_receiver() {
        let receiver = Arc::new(VirtualReceiver::new(VirtualReceiverConfig {
            stations: helpers::demo_stations(),
            seek_latency_ms: 300,
            ..VirtualReceiverConfig::default()
        }));
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(8750));

        let result = thread::scope(|s| {
            let scan = s.spawn(|| radio.auto_scan());
            assert!(helpers::wait_until(|| receiver
                .history()
                .iter()
                .any(|c| matches!(c, ReceiverCommand::Seek { .. }))));
            radio.stop_scan().unwrap();
            scan.join().unwrap().unwrap()
        });

        assert_eq!(result.stop, ScanStop::Cancelled);
        assert!(result.is_empty());
        assert!(receiver.history().contains(&ReceiverCommand::AbortSeek));

        radio.tune(Frequency(9530)).unwrap();
    }
}

// ============================================================================
// Coordination Tests
// ============================================================================

mod coordination_tests {
    use super::*;

    #[test]
    fn second_caller_is_busy_and_submits_nothing() {
        let link = helpers::scripted_link();
        let radio = helpers::powered(link.clone(), helpers::config_with_timeout(2000), Frequency(8750));
        link.set_latency(Duration::from_millis(200));
        let before = link.submission_count();

        thread::scope(|s| {
            let first = s.spawn(|| radio.tune(Frequency(9730)));
            assert!(link.wait_for_submissions(before + 1, Duration::from_secs(2)));

            let err = radio.tune(Frequency(9750)).unwrap_err();
            assert_eq!(err, ReceiverError::Busy);
            assert_eq!(err.status(), AcceptanceCode::IllegalCommand);
            assert_eq!(link.submission_count(), before + 1);

            assert_eq!(first.join().unwrap(), Ok(()));
        });

        assert_eq!(radio.tuned_frequency(), Some(Frequency(9730)));
    }

    #[test]
    fn timeout_then_next_call_succeeds() {
        let link = helpers::scripted_link();
        let radio = helpers::powered(link.clone(), helpers::config_with_timeout(100), Frequency(8750));

        link.set_latency(Duration::from_millis(300));
        let err = radio.tune(Frequency(9730)).unwrap_err();
        assert!(matches!(err, ReceiverError::Timeout { .. }));
        assert_eq!(err.status(), AcceptanceCode::Fail);

        link.set_latency(Duration::ZERO);
        radio.tune(Frequency(9750)).unwrap();
        assert_eq!(radio.tuned_frequency(), Some(Frequency(9750)));

        // The late 97.30 report lands on the timed-out submission
        thread::sleep(Duration::from_millis(350));
        assert_eq!(radio.refresh_status().unwrap().tuned_frequency, Some(Frequency(9730)));
    }

    #[test]
    fn status_after_unanswered_tune_returns_promptly() {
        let link = helpers::scripted_link();
        let radio = helpers::powered(link.clone(), helpers::config_with_timeout(500), Frequency(8750));
        link.respond_with(|command| match command {
            ReceiverCommand::Tune {
                frequency: Frequency(9730),
            } => Vec::new(),
            other => helpers::echo(other),
        });

        let err = radio.tune(Frequency(9730)).unwrap_err();
        assert!(matches!(err, ReceiverError::Timeout { .. }));

        let started = Instant::now();
        let state = radio.refresh_status().unwrap();
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(state.tuned_frequency, Some(Frequency(9730)));

        // Later calls are not held up either
        let started = Instant::now();
        radio.refresh_status().unwrap();
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn stop_scan_with_radio_off_submits_nothing() {
        let link = helpers::scripted_link();
        let radio = FmRadio::new(link.clone(), ReceiverConfig::default()).unwrap();
        radio.open().unwrap();

        let err = radio.stop_scan().unwrap_err();

        assert_eq!(err, ReceiverError::RadioOff);
        assert_eq!(err.status(), AcceptanceCode::IllegalCommand);
        assert_eq!(link.submission_count(), 0);
    }

    #[test]
    fn silent_receiver_times_out_and_recovers() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), helpers::config_with_timeout(100), Frequency(8750));

        receiver.set_silent(true);
        let started = Instant::now();
        let err = radio.tune(Frequency(9530)).unwrap_err();
        assert!(matches!(err, ReceiverError::Timeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(100));

        receiver.set_silent(false);
        radio.tune(Frequency(9730)).unwrap();
        assert_eq!(radio.tuned_frequency(), Some(Frequency(9730)));
    }

    #[test]
    fn rejected_command_reports_code_verbatim() {
        let link = helpers::scripted_link();
        let radio = helpers::powered(link.clone(), ReceiverConfig::default(), Frequency(8750));
        link.set_acceptance("set-volume", AcceptanceCode::IllegalParameters);

        let err = radio.set_volume(10).unwrap_err();

        assert_eq!(err, ReceiverError::Rejected(AcceptanceCode::IllegalParameters));
        assert_eq!(err.status(), AcceptanceCode::IllegalParameters);
        radio.tune(Frequency(9730)).unwrap();
    }

    #[test]
    fn unsolicited_events_update_state_only() {
        let link = helpers::scripted_link();
        let radio = helpers::powered(link.clone(), ReceiverConfig::default(), Frequency(8750));

        link.inject(ReceiverEvent::status(Frequency(10130), true));
        assert!(helpers::wait_until(|| radio.tuned_frequency() == Some(Frequency(10130))));

        radio.tune(Frequency(9730)).unwrap();
        assert_eq!(radio.tuned_frequency(), Some(Frequency(9730)));
    }
}

// ============================================================================
// Link Loss Tests
// ============================================================================

mod link_loss_tests {
    use super::*;

    #[test]
    fn detach_fails_pending_operation() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(8750));
        receiver.set_silent(true);
        let before = receiver.history().len();

        let started = Instant::now();
        let result = thread::scope(|s| {
            let pending = s.spawn(|| radio.tune(Frequency(9530)));
            assert!(helpers::wait_until(|| receiver.history().len() > before));
            receiver.drop_service();
            pending.join().unwrap()
        });

        assert_eq!(result, Err(ReceiverError::LinkLost));
        assert_eq!(ReceiverError::LinkLost.status(), AcceptanceCode::ServerFail);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn detach_clears_state() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(9530));
        radio.set_rds(true).unwrap();

        receiver.drop_service();
        assert!(helpers::wait_until(|| !radio.is_open()));

        assert_eq!(radio.tuned_frequency(), None);
        assert_eq!(radio.read_rds(), 0);
        assert_eq!(radio.get_ps(), None);
        assert_eq!(radio.tune(Frequency(9730)), Err(ReceiverError::NotReady));
    }

    #[test]
    fn close_drops_events_still_in_flight() {
        let receiver = Arc::new(VirtualReceiver::new(VirtualReceiverConfig {
            stations: helpers::demo_stations(),
            event_latency_ms: 150,
            ..VirtualReceiverConfig::default()
        }));
        let radio = helpers::powered(receiver.clone(), helpers::config_with_timeout(2000), Frequency(9730));
        let before = receiver.history().len();

        let result = thread::scope(|s| {
            let pending = s.spawn(|| radio.refresh_status());
            assert!(helpers::wait_until(|| receiver.history().len() > before));
            radio.close();
            pending.join().unwrap()
        });
        assert!(matches!(result, Err(ReceiverError::LinkLost)));

        // The status queued before close is delivered after it
        thread::sleep(Duration::from_millis(400));
        let state = radio.snapshot();
        assert!(!state.link_attached);
        assert!(!state.radio_on);
        assert_eq!(state.tuned_frequency, None);
        assert_eq!(radio.refresh_status(), Err(ReceiverError::NotReady));
    }

    #[test]
    fn close_then_reopen() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(8750));

        radio.close();
        assert!(!radio.is_open());
        assert_eq!(radio.seek(ScanDirection::Up), Err(ReceiverError::NotReady));

        radio.open().unwrap();
        radio.power_up(Frequency(9530)).unwrap();
        assert_eq!(radio.tuned_frequency(), Some(Frequency(9530)));
    }
}

// ============================================================================
// RDS and Audio Tests
// ============================================================================

mod rds_tests {
    use super::*;

    #[test]
    fn read_rds_drains_ps_then_rt() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(9530));

        radio.set_rds(true).unwrap();
        assert!(helpers::wait_until(|| {
            let pending = radio.snapshot().rds_pending;
            pending.ps && pending.rt
        }));

        assert_eq!(radio.read_rds(), RDS_EVENT_PS);
        assert_eq!(radio.read_rds(), RDS_EVENT_RT);
        assert_eq!(radio.read_rds(), 0);
        assert_eq!(radio.get_ps().as_deref(), Some("WXYZ"));
        assert_eq!(radio.get_lr_text().as_deref(), Some("Morning drive"));
    }

    #[test]
    fn rds_off_hides_text() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(9530));
        radio.set_rds(true).unwrap();
        assert!(helpers::wait_until(|| radio.get_ps().is_some()));

        radio.set_rds(false).unwrap();

        assert_eq!(radio.get_ps(), None);
        assert_eq!(radio.read_rds(), 0);
        assert!(!receiver.rds_mode().is_on());
    }

    #[test]
    fn active_af_reports_current_channel() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(9530));

        assert_eq!(radio.active_af(), Ok(39));
        assert!(receiver.af_enabled());
    }

    #[test]
    fn audio_controls_reach_receiver() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(9530));

        radio.set_mute(true).unwrap();
        assert!(radio.snapshot().muted);
        radio.set_volume(120).unwrap();
        assert_eq!(receiver.volume(), 120);
        radio.set_step_size(StepSize::Khz50).unwrap();
        assert_eq!(receiver.step_size(), StepSize::Khz50);
        assert_eq!(radio.estimate_noise_floor(NflLevel::Medium), Ok(-110));
        radio.set_audio_mode(AudioMode::Mono).unwrap();
        assert_eq!(receiver.audio_mode(), AudioMode::Mono);
        assert_eq!(radio.snapshot().audio_mode, AudioMode::Mono);
    }

    #[test]
    fn quality_controls_reach_receiver() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(9730));

        radio.set_snr_threshold(12).unwrap();
        assert_eq!(receiver.snr_threshold(), 12);
        let err = radio.set_snr_threshold(40).unwrap_err();
        assert_eq!(err.status(), AcceptanceCode::IllegalParameters);

        let err = radio
            .set_live_audio_polling(true, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.status(), AcceptanceCode::IllegalParameters);
        radio
            .set_live_audio_polling(true, Duration::from_millis(20))
            .unwrap();
        radio.tune(Frequency(9530)).unwrap();
        assert!(helpers::wait_until(|| radio.snapshot().rssi == -48));
    }

    #[test]
    fn region_change_moves_band() {
        let receiver = helpers::virtual_receiver(Vec::new());
        let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(8750));
        assert!(radio.tune(Frequency(8760)).is_err());

        radio.set_world_region(Region::Eur).unwrap();

        assert_eq!(radio.band().step, 10);
        radio.tune(Frequency(8760)).unwrap();
    }

    #[test]
    fn power_down_is_confirmed() {
        let receiver = helpers::virtual_receiver(helpers::demo_stations());
        let radio = helpers::powered(receiver.clone(), ReceiverConfig::default(), Frequency(8750));

        radio.power_down().unwrap();

        assert!(!receiver.is_powered());
        assert_eq!(radio.tune(Frequency(9730)), Err(ReceiverError::RadioOff));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::collection::btree_set;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn scan_finds_exactly_the_audible_channels(channels in btree_set(1u16..=102, 0..6)) {
            let band = fm_protocol::BandConfiguration::default();
            let stations = channels
                .iter()
                .map(|&c| Station::new(band.frequency_of(c), -60))
                .collect();
            let receiver = helpers::virtual_receiver(stations);
            let radio = helpers::powered(receiver, ReceiverConfig::default(), Frequency(8750));

            let result = radio.auto_scan().unwrap();

            let expected: Vec<u16> = channels.into_iter().collect();
            prop_assert_eq!(result.channels(), expected.as_slice());
            prop_assert!(result.frequencies.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
