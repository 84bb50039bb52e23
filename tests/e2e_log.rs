//! E2E tests for the session log and replay
//!
//! Runs the pipeline against a real log file in a temp directory, then
//! replays that file through a fresh pipeline.

use approx::assert_relative_eq;
use chrono::{Local, TimeZone};
use std::time::Duration;
use ventmon::acquisition::clock::ManualClock;
use ventmon::breath::valve::{EXPIRE, INSPIRE};
use ventmon::sensor::replay::ReplaySession;
use ventmon::sensor::sim::SimulatedSensor;
use ventmon::sensor::{SensorError, SensorPort};
use ventmon::stats::logger::{read_log, LOG_FIELDS};
use ventmon::{
    Acquisition, AcquisitionError, DerivedSample, MonitorContext, MonitorState, SampleLogger,
    Scheduler, SensorBank, Settings, ValveSignal,
};

const PERIOD: Duration = Duration::from_millis(5);

fn bank() -> SensorBank {
    SensorBank::from_ports([
        Box::new(SimulatedSensor::scripted("in_a", vec![10.0, 11.0, 12.0])),
        Box::new(SimulatedSensor::scripted("in_b", vec![14.0, 15.0, 16.0])),
        Box::new(SimulatedSensor::constant("ex_a", 20.0)),
        Box::new(SimulatedSensor::constant("ex_b", 11.0)),
    ])
}

#[test]
fn test_three_ticks_write_three_records() {
    let dir = tempfile::tempdir().unwrap();
    let started = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
    let logger = SampleLogger::create(dir.path(), &started).unwrap();
    let path = logger.path().unwrap().to_path_buf();
    assert_eq!(path.file_name().unwrap(), "2026-03-04-05-06-07.out");

    let context = MonitorContext::new(8, Settings::default());
    let acq = Acquisition::new(bank(), logger, context);
    let mut sched = Scheduler::new(acq, ManualClock::new(1_700_000_000.0), PERIOD);
    assert_eq!(sched.run_ticks(3).unwrap(), 3);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.ends_with('\n'));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);

    for (i, line) in lines.iter().enumerate() {
        let fields: Vec<f64> = line.split(' ').map(|f| f.parse().unwrap()).collect();
        assert_eq!(fields.len(), LOG_FIELDS);
        // timestamp flow volume tidal in_a in_b in_flow ex_a ex_b ex_flow
        assert!((fields[0] - (1_700_000_000.0 + i as f64 * 0.005)).abs() < 1e-5);
        assert_eq!(fields[4], 10.0 + i as f64);
        assert_eq!(fields[5], 14.0 + i as f64);
        assert_eq!(fields[7], 20.0);
        assert_eq!(fields[8], 11.0);
    }
}

#[test]
fn test_log_matches_store() {
    let dir = tempfile::tempdir().unwrap();
    let logger = SampleLogger::create(dir.path(), &Local::now()).unwrap();
    let path = logger.path().unwrap().to_path_buf();

    let context = MonitorContext::new(8, Settings::default());
    let mut sched = Scheduler::new(
        Acquisition::new(bank(), logger, context.clone()),
        ManualClock::new(0.0),
        PERIOD,
    );
    sched.run_ticks(5).unwrap();

    let records = read_log(&path).unwrap();
    let samples = context.store().recent(5);
    assert_eq!(records.len(), samples.len());
    for (record, sample) in records.iter().zip(&samples) {
        assert!((record.flow - sample.flow).abs() < 1e-6);
        assert!((record.in_flow - sample.in_flow).abs() < 1e-6);
        assert!((record.ex_flow - sample.ex_flow).abs() < 1e-6);
    }
}

#[test]
fn test_replay_reproduces_recorded_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let logger = SampleLogger::create(dir.path(), &Local::now()).unwrap();
    let path = logger.path().unwrap().to_path_buf();

    // Valve in 3-tick inspire/expire blocks: one breath closes at tick 6
    let context = MonitorContext::new(16, Settings::default());
    let mut acq = Acquisition::new(bank(), logger, context.clone());
    let mut recorded = Vec::new();
    for i in 0..12u64 {
        let phase = if (i / 3) % 2 == 0 { INSPIRE } else { EXPIRE };
        context.flag().command(phase);
        recorded.push(acq.tick(i as f64 * 0.005).unwrap());
    }
    assert_eq!(acq.engine().cycles(), 1);

    let session = ReplaySession::open(&path).unwrap();
    assert_eq!(session.len(), 12);
    let context = MonitorContext::new(16, Settings::default());
    let acq = Acquisition::new(
        SensorBank::from_ports(session.sensors()),
        SampleLogger::new(Vec::new()),
        context.clone(),
    )
    .with_replay_valve(session.valve());
    let mut replay = Scheduler::new(acq, ManualClock::new(0.0), PERIOD);

    // Runs until the log is exhausted
    match replay.run() {
        Err(AcquisitionError::Sensor(SensorError::Exhausted(12))) => {}
        other => panic!("expected replay to exhaust after 12 records, got {:?}", other),
    }
    assert_eq!(replay.ticks(), 12);
    assert_eq!(context.state(), MonitorState::Failed);
    assert_eq!(replay.acquisition().engine().cycles(), 1);

    let replayed = context.store().recent(12);
    let inspiring = |samples: &[DerivedSample]| samples.iter().filter(|s| s.flow > 0.0).count();
    assert_eq!(inspiring(&recorded), 6);
    assert_eq!(inspiring(&replayed), 6);

    for (record, sample) in recorded.iter().zip(&replayed) {
        assert_eq!(record.in_pressure_a, sample.in_pressure_a);
        assert_eq!(record.in_pressure_b, sample.in_pressure_b);
        assert_eq!(record.ex_pressure_a, sample.ex_pressure_a);
        assert_eq!(record.ex_pressure_b, sample.ex_pressure_b);
        assert_relative_eq!(record.flow, sample.flow, epsilon = 1e-9);
        assert_relative_eq!(record.volume, sample.volume, epsilon = 1e-9);
        assert_relative_eq!(record.tidal, sample.tidal, epsilon = 1e-9);
    }
    let last = replayed.last().unwrap();
    assert!(last.tidal > 0.0);
}

#[test]
fn test_replay_lowers_flag_after_assisted_breath() {
    let dir = tempfile::tempdir().unwrap();
    let logger = SampleLogger::create(dir.path(), &Local::now()).unwrap();
    let path = logger.path().unwrap().to_path_buf();

    // Expiration throughout, with a deep inspiratory dip on the middle tick
    let ports: [Box<dyn SensorPort>; 4] = [
        Box::new(SimulatedSensor::constant("in_a", 0.0)),
        Box::new(SimulatedSensor::scripted("in_b", vec![0.0, 0.0, -12.0, 0.0, 0.0])),
        Box::new(SimulatedSensor::constant("ex_a", 9.0)),
        Box::new(SimulatedSensor::constant("ex_b", 0.0)),
    ];
    let mut acq = Acquisition::new(
        SensorBank::from_ports(ports),
        logger,
        MonitorContext::new(8, Settings::default()),
    );
    for i in 0..5u64 {
        acq.tick(i as f64 * 0.005).unwrap();
    }

    let settings = Settings {
        assist_threshold: 10.0,
        ..Settings::default()
    };
    let context = MonitorContext::new(8, settings);
    let session = ReplaySession::open(&path).unwrap();
    let mut acq = Acquisition::new(
        SensorBank::from_ports(session.sensors()),
        SampleLogger::new(Vec::new()),
        context.clone(),
    )
    .with_replay_valve(session.valve());

    for i in 0..5u64 {
        let sample = acq.tick(i as f64 * 0.005).unwrap();
        assert!(sample.flow < 0.0, "tick {} replayed as inspiration", i);
    }
    assert_eq!(acq.detector().detections(), 1);
}

#[test]
fn test_log_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let logger = SampleLogger::create(&nested, &Local::now()).unwrap();
    assert!(logger.path().unwrap().starts_with(&nested));
    assert!(nested.is_dir());
}
