//! Acquisition pipeline
//!
//! This module contains the per-tick pipeline and its supervision:
//! - [`Acquisition`]: one acquire, compute, publish and log pass per tick
//! - [`scheduler`]: fixed-period loop driving the pipeline
//! - [`context`]: state shared with the monitoring side
//! - [`settings`]: clinician settings read every tick
//! - [`clock`]: wall and manual time sources

pub mod clock;
pub mod context;
pub mod scheduler;
pub mod settings;

use crate::breath::cycle::BreathCycleEngine;
use crate::breath::spontaneous::SpontaneousBreathDetector;
use crate::breath::valve::ValveSignal;
use crate::sensor::calibration::{CalibrationReport, Calibrator};
use crate::sensor::replay::ReplayValve;
use crate::sensor::{SensorBank, SensorError};
use crate::stats::logger::{LogError, SampleLogger};
use crate::stats::store::DerivedSample;
use clock::Clock;
use context::{MonitorContext, MonitorState};
use std::fs::File;
use std::io::Write;
use thiserror::Error;

/// Fatal acquisition errors
///
/// Every variant ends the acquisition loop; none is retried.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Sensor failure: {0}")]
    Sensor(#[from] SensorError),

    #[error("Session log failure: {0}")]
    Log(#[from] LogError),

    #[error("Calibration failed: {0}")]
    Calibration(String),

    #[error("Acquisition thread panicked: {0}")]
    Panicked(String),
}

/// Sensor bank, breath engine, detector and logger wired to one context
pub struct Acquisition<W: Write = File> {
    bank: SensorBank,
    engine: BreathCycleEngine,
    detector: SpontaneousBreathDetector,
    calibrator: Calibrator,
    replay: Option<ReplayValve>,
    logger: SampleLogger<W>,
    context: MonitorContext,
}

impl<W: Write> Acquisition<W> {
    pub fn new(bank: SensorBank, logger: SampleLogger<W>, context: MonitorContext) -> Self {
        Self {
            bank,
            engine: BreathCycleEngine::default(),
            detector: SpontaneousBreathDetector::new(),
            calibrator: Calibrator::default(),
            replay: None,
            logger,
            context,
        }
    }

    pub fn with_engine(mut self, engine: BreathCycleEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_detector(mut self, detector: SpontaneousBreathDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_calibrator(mut self, calibrator: Calibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    /// Restore the recorded valve phase before every tick of a replay
    pub fn with_replay_valve(mut self, valve: ReplayValve) -> Self {
        self.replay = Some(valve);
        self
    }

    pub fn context(&self) -> &MonitorContext {
        &self.context
    }

    pub fn engine(&self) -> &BreathCycleEngine {
        &self.engine
    }

    pub fn detector(&self) -> &SpontaneousBreathDetector {
        &self.detector
    }

    pub fn logger(&self) -> &SampleLogger<W> {
        &self.logger
    }

    /// Prime and zero the sensor bank
    ///
    /// Failure is fatal: the context is marked failed and no tick should
    /// follow.
    pub fn calibrate(&mut self, clock: &dyn Clock) -> Result<CalibrationReport, AcquisitionError> {
        self.context.set_state(MonitorState::Calibrating);
        match self.calibrator.calibrate(&mut self.bank, clock) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.context.set_state(MonitorState::Failed);
                tracing::error!(error = %e, "Calibration failed");
                Err(AcquisitionError::Calibration(e.to_string()))
            }
        }
    }

    /// Run one acquire, compute, publish and log pass stamped `ts`
    ///
    /// A sensor failure publishes nothing. A log failure happens after the
    /// sample reached the store; the caller must stop either way.
    pub fn tick(&mut self, ts: f64) -> Result<DerivedSample, AcquisitionError> {
        let (inspiratory, expiratory) = self.bank.read()?;

        let valve = self.context.flag();
        if let Some(replay) = &mut self.replay {
            replay.step(valve);
        }
        let update = self
            .engine
            .update(ts, valve.is_inspiring(), inspiratory, expiratory);

        self.detector.check(
            ts,
            inspiratory.p_b,
            valve,
            self.context.settings().assist_threshold(),
        );

        self.context.store().publish(&update.sample);
        self.logger.append(&update.sample)?;
        Ok(update.sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::clock::ManualClock;
    use crate::acquisition::settings::Settings;
    use crate::breath::valve::{EXPIRE, INSPIRE};
    use crate::sensor::sim::SimulatedSensor;
    use crate::sensor::SensorPort;
    use crate::stats::logger::LOG_FIELDS;

    fn bank(values: [f64; 4]) -> SensorBank {
        SensorBank::from_ports(values.map(|v| {
            Box::new(SimulatedSensor::constant("s", v)) as Box<dyn SensorPort>
        }))
    }

    fn acquisition(values: [f64; 4], settings: Settings) -> Acquisition<Vec<u8>> {
        Acquisition::new(
            bank(values),
            SampleLogger::new(Vec::new()),
            MonitorContext::new(8, settings),
        )
    }

    #[test]
    fn test_tick_publishes_and_logs() {
        let mut acq = acquisition([0.0, 4.0, 0.0, 9.0], Settings::default());
        acq.context().flag().command(INSPIRE);

        let sample = acq.tick(1.0).unwrap();
        assert_eq!(acq.context().store().slot_index(), Some(0));
        assert_eq!(acq.context().store().latest(), Some(sample));
        assert_eq!(acq.logger().records(), 1);
        assert!(sample.flow > 0.0);
        assert_eq!(sample.in_pressure_b, 4.0);
    }

    #[test]
    fn test_tick_runs_detector_with_shared_threshold() {
        let mut acq = acquisition([0.0, -12.0, 0.0, 0.0], Settings::default());
        acq.tick(0.0).unwrap();
        assert_eq!(acq.context().flag().state(), EXPIRE);

        acq.context().settings().set_assist_threshold(10.0);
        acq.tick(0.005).unwrap();
        assert_eq!(acq.context().flag().state(), INSPIRE);
        assert_eq!(acq.detector().detections(), 1);
    }

    #[test]
    fn test_sensor_failure_publishes_nothing() {
        let ports: [Box<dyn SensorPort>; 4] = [
            Box::new(SimulatedSensor::constant("in_a", 0.0).fail_after(1)),
            Box::new(SimulatedSensor::constant("in_b", 0.0)),
            Box::new(SimulatedSensor::constant("ex_a", 0.0)),
            Box::new(SimulatedSensor::constant("ex_b", 0.0)),
        ];
        let mut acq = Acquisition::new(
            SensorBank::from_ports(ports),
            SampleLogger::new(Vec::new()),
            MonitorContext::new(8, Settings::default()),
        );
        acq.tick(0.0).unwrap();
        assert!(matches!(acq.tick(0.005), Err(AcquisitionError::Sensor(_))));
        assert_eq!(acq.context().store().published(), 1);
        assert_eq!(acq.logger().records(), 1);
    }

    #[test]
    fn test_calibration_failure_marks_context() {
        let ports: [Box<dyn SensorPort>; 4] = [
            Box::new(SimulatedSensor::constant("in_a", 0.0).fail_after(0)),
            Box::new(SimulatedSensor::constant("in_b", 0.0)),
            Box::new(SimulatedSensor::constant("ex_a", 0.0)),
            Box::new(SimulatedSensor::constant("ex_b", 0.0)),
        ];
        let mut acq = Acquisition::new(
            SensorBank::from_ports(ports),
            SampleLogger::new(Vec::new()),
            MonitorContext::new(8, Settings::default()),
        );
        let result = acq.calibrate(&ManualClock::new(0.0));
        assert!(matches!(result, Err(AcquisitionError::Calibration(_))));
        assert_eq!(acq.context().state(), MonitorState::Failed);
    }

    #[test]
    fn test_replay_valve_sets_phase_before_compute() {
        use crate::stats::logger::LogRecord;
        use std::sync::Arc;

        let inspiring = LogRecord {
            flow: 1.0,
            in_flow: 1.0,
            ex_flow: 2.0,
            ..Default::default()
        };
        let valve = ReplayValve::new(Arc::new(vec![inspiring]));
        let mut acq =
            acquisition([0.0, 4.0, 0.0, 9.0], Settings::default()).with_replay_valve(valve);
        assert_eq!(acq.context().flag().state(), EXPIRE);

        let sample = acq.tick(0.0).unwrap();
        assert!(sample.flow > 0.0);
        assert_eq!(acq.context().flag().state(), INSPIRE);
    }

    #[test]
    fn test_logged_line_has_ten_fields() {
        let mut acq = acquisition([1.0, 2.0, 3.0, 4.0], Settings::default());
        acq.tick(0.0).unwrap();
        let Acquisition { logger, .. } = acq;
        let text = String::from_utf8(logger.into_inner()).unwrap();
        assert_eq!(text.split_whitespace().count(), LOG_FIELDS);
    }
}
