//! Session lifecycle with real loop threads.

use std::thread;
use std::time::{Duration, Instant};

use rallyloop_bridge::config::SessionConfig;
use rallyloop_bridge::record::MemoryRecordSink;
use rallyloop_bridge::simulated::{SimulatedElectrodes, SimulatedSensorArray};
use rallyloop_bridge::Session;
use rallyloop_core::types::{ModeLabel, StimulusVector};

fn sensors() -> SimulatedSensorArray {
    SimulatedSensorArray::new(3).with_period(Duration::from_millis(400))
}

#[test]
fn feedback_session_runs_until_stopped() {
    let electrodes = SimulatedElectrodes::new(6);
    let probe = electrodes.clone();
    let records = MemoryRecordSink::new();

    let mut config = SessionConfig::feedback().with_seed(21);
    config.timing.sample_interval_ms = 10;
    config.timing.frame_rate_hz = 200.0;

    let handle = Session::begin(config, sensors(), electrodes, records.clone()).unwrap();
    let bridge = handle.bridge();

    thread::sleep(Duration::from_millis(300));
    assert!(!handle.is_finished());
    assert!(bridge.sim.latest().frame > 0);
    assert!(bridge.reading.latest().is_some());

    handle.request_stop();
    let report = handle.join().unwrap();

    let sim = report.simulation.expect("feedback runs the simulation");
    assert!(sim.frames > 0);
    assert!(sim.estimates > 0);
    assert!(report.actuation.ticks > 0);
    assert_eq!(report.actuation.records as usize, records.len());
    assert_eq!(probe.last_applied(), StimulusVector::all_inactive());
}

#[test]
fn hybrid_session_alternates_modes() {
    let records = MemoryRecordSink::new();
    let config = SessionConfig::hybrid(0.05, 0.05).with_seed(8);

    let handle = Session::begin(config, sensors(), SimulatedElectrodes::new(6), records.clone()).unwrap();
    thread::sleep(Duration::from_millis(400));
    handle.request_stop();
    let report = handle.join().unwrap();

    assert!(report.actuation.mode_switches >= 2);
    let modes: Vec<ModeLabel> = records.records().iter().map(|r| r.mode).collect();
    assert!(modes.contains(&ModeLabel::Normal));
    assert!(modes.contains(&ModeLabel::Random));
}

#[test]
fn duty_cycle_session_ends_on_budget() {
    let electrodes = SimulatedElectrodes::new(6);
    let probe = electrodes.clone();
    let mut config = SessionConfig::duty_cycle(0.1, 0.05, 0.3, 2);
    config.timing.sample_interval_ms = 10;

    let started = Instant::now();
    let handle = Session::begin(config, sensors(), electrodes, MemoryRecordSink::new()).unwrap();
    let report = handle.join().unwrap();

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(report.actuation.budget_exhausted);
    assert!(report.simulation.is_none());
    assert_eq!(probe.last_applied(), StimulusVector::all_inactive());
}

#[test]
fn dropping_handle_stops_loops() {
    let electrodes = SimulatedElectrodes::new(6);
    let probe = electrodes.clone();

    let handle = Session::begin(
        SessionConfig::feedback().with_seed(2),
        sensors(),
        electrodes,
        MemoryRecordSink::new(),
    )
    .unwrap();
    let stop = handle.stop_signal();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    drop(handle);
    assert!(stop.is_raised());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(probe.last_applied(), StimulusVector::all_inactive());
}
