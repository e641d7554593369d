//! End-to-end runs of both worker threads against the simulated front end

use common::{RadioTimestamp, FRAME_DURATION_S};
use interfaces::sim_rf::{SimRf, SimRfConfig, SimRfMonitor, TxRecord};
use overshadow::{OvershadowConfig, OvershadowContext, SyncMode};
use phy::{SimBroadcastSynthesizer, SimDownlinkSync, SimPhyConfig};
use std::time::Duration;

const START_TIME_S: f64 = 1.0;

fn config(mode: SyncMode) -> OvershadowConfig {
    let mut config = OvershadowConfig::default();
    config.cell.nof_prb = 6;
    config.cell.pci = 42;
    config.sync.mode = mode;
    config
}

fn run_for(
    config: OvershadowConfig,
    rf: SimRfConfig,
    phy: SimPhyConfig,
    duration: Duration,
) -> (SimRfMonitor, overshadow::SensingStats, overshadow::InjectorStats) {
    let ctx = OvershadowContext::new(config).unwrap();
    let (rx, tx, monitor) = SimRf::open(rf).unwrap().split();
    let workers = ctx
        .spawn(rx, SimDownlinkSync::new(phy), tx, SimBroadcastSynthesizer::new())
        .unwrap();

    std::thread::sleep(duration);
    ctx.shutdown.cancel();
    let (sensing, injector) = workers.join().unwrap();
    (monitor, sensing, injector)
}

/// Frame index since the start of the simulated downlink
fn frame_index(at: &RadioTimestamp) -> i64 {
    (at.secs_since(&RadioTimestamp::from_secs_f64(START_TIME_S)) / FRAME_DURATION_S).round() as i64
}

fn realtime(initial_sfn: u32) -> SimRfConfig {
    SimRfConfig {
        initial_sfn,
        start_time_s: START_TIME_S,
        realtime: true,
        ..SimRfConfig::default()
    }
}

#[test]
fn continuous_mode_overshadows_every_repetition_cycle() {
    let (monitor, sensing, injector) = run_for(
        config(SyncMode::Continuous),
        realtime(100),
        SimPhyConfig::default(),
        Duration::from_millis(400),
    );

    let records: Vec<TxRecord> = monitor.transmissions();
    assert!(records.len() >= 3, "only {} transmissions", records.len());
    assert!(sensing.decode_successes >= 1);
    assert_eq!(injector.transmissions + injector.transmit_failures, records.len() as u64);

    // Reference frame is the first one received (index 0); the action
    // phase is 0, so forged frames start one frame after every 4th frame
    for record in &records {
        let index = frame_index(&record.at);
        assert_eq!(index % 4, 1, "transmission at frame index {}", index);
        assert_eq!(record.samples, 10 * 1920);
    }
    for pair in records.windows(2) {
        let gap = pair[1].at.secs_since(&pair[0].at);
        assert!(gap > 0.0);
        assert_eq!(((gap / FRAME_DURATION_S).round() as i64) % 4, 0);
    }

    assert!(records[0].start_of_burst);
    assert!(records[1..].iter().all(|r| !r.start_of_burst));
    assert!(records.iter().any(|r| !r.late));
}

#[test]
fn single_shot_mode_stops_decoding_after_acquisition() {
    let (monitor, sensing, injector) = run_for(
        config(SyncMode::SingleShot),
        realtime(1021),
        SimPhyConfig::default(),
        Duration::from_millis(300),
    );

    assert_eq!(sensing.decode_successes, 1);
    assert_eq!(sensing.decode_misses, 0);
    assert!(injector.transmissions + injector.transmit_failures >= 2);

    let records = monitor.transmissions();
    for record in &records {
        assert_eq!(frame_index(&record.at) % 4, 1);
    }
}

#[test]
fn no_transmission_without_mib() {
    let (monitor, sensing, injector) = run_for(
        config(SyncMode::Continuous),
        realtime(0),
        SimPhyConfig {
            mib_loss_probability: 1.0,
            ..SimPhyConfig::default()
        },
        Duration::from_millis(150),
    );

    assert_eq!(sensing.decode_successes, 0);
    assert!(sensing.decode_misses >= 5);
    assert_eq!(injector.transmissions, 0);
    assert!(monitor.transmissions().is_empty());
    assert_eq!(monitor.stats().tx_bursts, 0);
}

#[test]
fn decoder_fault_stops_both_workers() {
    let ctx = OvershadowContext::new(config(SyncMode::Continuous)).unwrap();
    let (rx, tx, _monitor) = SimRf::open(realtime(0)).unwrap().split();
    let phy = SimPhyConfig {
        fault_after_attempts: Some(3),
        ..SimPhyConfig::default()
    };
    let workers = ctx
        .spawn(rx, SimDownlinkSync::new(phy), tx, SimBroadcastSynthesizer::new())
        .unwrap();

    // Four frame starts at 10 ms each; allow generous slack
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !workers.is_finished() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert!(ctx.shutdown.is_cancelled());
    assert!(matches!(
        workers.join(),
        Err(overshadow::OvershadowError::DecoderFault(_))
    ));
}
