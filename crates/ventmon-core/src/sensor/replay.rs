//! Replay of a recorded session
//!
//! Feeds the four raw pressures of a previous session log back through the
//! acquisition path, one record per tick. The recorded pressures are
//! already zeroed, so replay banks are normally used without calibration.
//!
//! The log carries no valve column, but the signed flow tells which phase
//! each record was computed under. [`ReplayValve`] restores that phase on
//! the breathing flag before each tick, so replayed cycles close where the
//! recorded ones did.

use super::{SensorError, SensorPort};
use crate::breath::valve::ValveSignal;
use crate::stats::logger::{read_log, LogRecord};
use std::path::Path;
use std::sync::Arc;

/// Records of one session log, shared by its replay sensors and valve
#[derive(Debug, Clone)]
pub struct ReplaySession {
    records: Arc<Vec<LogRecord>>,
}

impl ReplaySession {
    /// Load the log at `path`; an empty log is rejected
    pub fn open(path: &Path) -> Result<Self, SensorError> {
        let records = read_log(path).map_err(|e| SensorError::Replay(e.to_string()))?;
        if records.is_empty() {
            return Err(SensorError::Replay(format!(
                "{} contains no records",
                path.display()
            )));
        }
        tracing::info!(path = %path.display(), records = records.len(), "Replaying session log");
        Ok(Self {
            records: Arc::new(records),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Four sensors in bank order
    pub fn sensors(&self) -> [Box<dyn SensorPort>; 4] {
        [
            Column::InPressureA,
            Column::InPressureB,
            Column::ExPressureA,
            Column::ExPressureB,
        ]
        .map(|column| {
            Box::new(ReplaySensor::new(Arc::clone(&self.records), column)) as Box<dyn SensorPort>
        })
    }

    /// Valve driver stepping through the same records
    pub fn valve(&self) -> ReplayValve {
        ReplayValve::new(Arc::clone(&self.records))
    }
}

/// Drives the breathing flag from the phase of each recorded tick
#[derive(Debug, Clone)]
pub struct ReplayValve {
    records: Arc<Vec<LogRecord>>,
    cursor: usize,
}

impl ReplayValve {
    pub fn new(records: Arc<Vec<LogRecord>>) -> Self {
        Self { records, cursor: 0 }
    }

    /// Command the phase of the next record
    ///
    /// A record whose phase cannot be told leaves the flag as it is.
    /// Returns the phase commanded, `None` past the end of the log.
    pub fn step(&mut self, valve: &dyn ValveSignal) -> Option<u8> {
        let record = self.records.get(self.cursor)?;
        self.cursor += 1;
        let state = record.valve_state().unwrap_or_else(|| valve.state());
        if valve.state() != state {
            valve.command(state);
        }
        Some(state)
    }
}

/// Which recorded pressure a replay sensor yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    InPressureA,
    InPressureB,
    ExPressureA,
    ExPressureB,
}

impl Column {
    fn pick(self, record: &LogRecord) -> f64 {
        match self {
            Column::InPressureA => record.in_pressure_a,
            Column::InPressureB => record.in_pressure_b,
            Column::ExPressureA => record.ex_pressure_a,
            Column::ExPressureB => record.ex_pressure_b,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Column::InPressureA => "replay_in_a",
            Column::InPressureB => "replay_in_b",
            Column::ExPressureA => "replay_ex_a",
            Column::ExPressureB => "replay_ex_b",
        }
    }
}

/// Sensor yielding one column of recorded records
pub struct ReplaySensor {
    records: Arc<Vec<LogRecord>>,
    column: Column,
    cursor: usize,
    offset: f64,
}

impl ReplaySensor {
    pub fn new(records: Arc<Vec<LogRecord>>, column: Column) -> Self {
        Self {
            records,
            column,
            cursor: 0,
            offset: 0.0,
        }
    }

    /// Four sensors in bank order replaying the log at `path`
    ///
    /// Pressures only; pair with [`ReplaySession::valve`] to restore the
    /// recorded phase.
    pub fn bank_from_log(path: &Path) -> Result<[Box<dyn SensorPort>; 4], SensorError> {
        Ok(ReplaySession::open(path)?.sensors())
    }

    /// Records left to replay
    pub fn remaining(&self) -> usize {
        self.records.len().saturating_sub(self.cursor)
    }
}

impl SensorPort for ReplaySensor {
    fn name(&self) -> &str {
        self.column.name()
    }

    fn read(&mut self) -> Result<f64, SensorError> {
        let record = self
            .records
            .get(self.cursor)
            .ok_or(SensorError::Exhausted(self.cursor as u64))?;
        self.cursor += 1;
        Ok(self.column.pick(record) - self.offset)
    }

    fn zero_pressure(&mut self, offset: f64) -> Result<(), SensorError> {
        self.offset = offset;
        Ok(())
    }
}
