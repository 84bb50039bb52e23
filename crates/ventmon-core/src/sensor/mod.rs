//! Pressure sensor capability and the four-sensor bank
//!
//! This module contains all sensor-facing functionality including:
//! - The [`SensorPort`] capability implemented by drivers and simulators
//! - Differential pairs and the inspiratory/expiratory bank
//! - Zero-offset calibration ([`calibration`])
//! - Simulated patient circuit ([`sim`])
//! - Session log replay ([`replay`])

pub mod calibration;
pub mod replay;
pub mod sim;

use calibration::CalibrationOffset;
use thiserror::Error;

/// Errors that can occur while reading sensors
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Sensor bus unreachable: {0}")]
    BusUnreachable(String),

    #[error("Malformed reading from {sensor}: {value}")]
    Malformed { sensor: String, value: f64 },

    #[error("Replay source exhausted after {0} reads")]
    Exhausted(u64),

    #[error("Replay source error: {0}")]
    Replay(String),
}

/// One physical pressure sensor
///
/// Hardware drivers and simulators implement this; the acquisition loop
/// never knows which one it was given.
pub trait SensorPort: Send {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Read the current pressure in Pa, with the zero offset applied
    fn read(&mut self) -> Result<f64, SensorError>;

    /// Apply a zero-pressure offset; `0.0` resets to raw readings
    fn zero_pressure(&mut self, offset: f64) -> Result<(), SensorError>;
}

impl<T: SensorPort + ?Sized> SensorPort for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read(&mut self) -> Result<f64, SensorError> {
        (**self).read()
    }

    fn zero_pressure(&mut self, offset: f64) -> Result<(), SensorError> {
        (**self).zero_pressure(offset)
    }
}

/// Which side of the breathing circuit a pair measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Inspiratory,
    Expiratory,
}

/// Two pressure readings from one differential pair, valid for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorPair {
    pub p_a: f64,
    pub p_b: f64,
}

impl SensorPair {
    pub fn new(p_a: f64, p_b: f64) -> Self {
        Self { p_a, p_b }
    }

    /// Signed differential `p_b - p_a`
    pub fn differential(&self) -> f64 {
        self.p_b - self.p_a
    }
}

/// Two sensors tapping either side of one venturi
pub struct DifferentialPair {
    side: Side,
    a: Box<dyn SensorPort>,
    b: Box<dyn SensorPort>,
    offset: Option<CalibrationOffset>,
}

impl DifferentialPair {
    pub fn new(side: Side, a: Box<dyn SensorPort>, b: Box<dyn SensorPort>) -> Self {
        Self {
            side,
            a,
            b,
            offset: None,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Offset recorded by the calibrator, if calibration has run
    pub fn offset(&self) -> Option<CalibrationOffset> {
        self.offset
    }

    /// Read both sensors, `a` first
    pub fn read(&mut self) -> Result<SensorPair, SensorError> {
        let raw_a = self.a.read()?;
        let raw_b = self.b.read()?;
        Ok(SensorPair {
            p_a: checked(self.a.name(), raw_a)?,
            p_b: checked(self.b.name(), raw_b)?,
        })
    }

    pub(crate) fn ports_mut(&mut self) -> [&mut Box<dyn SensorPort>; 2] {
        [&mut self.a, &mut self.b]
    }

    pub(crate) fn set_offset(&mut self, offset: CalibrationOffset) {
        self.offset = Some(offset);
    }
}

fn checked(sensor: &str, value: f64) -> Result<f64, SensorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SensorError::Malformed {
            sensor: sensor.to_string(),
            value,
        })
    }
}

/// Inspiratory and expiratory pairs read together every tick
pub struct SensorBank {
    inspiratory: DifferentialPair,
    expiratory: DifferentialPair,
}

impl SensorBank {
    pub fn new(inspiratory: DifferentialPair, expiratory: DifferentialPair) -> Self {
        Self {
            inspiratory,
            expiratory,
        }
    }

    /// Build a bank from four ports in the order in_a, in_b, ex_a, ex_b
    pub fn from_ports(ports: [Box<dyn SensorPort>; 4]) -> Self {
        let [in_a, in_b, ex_a, ex_b] = ports;
        Self::new(
            DifferentialPair::new(Side::Inspiratory, in_a, in_b),
            DifferentialPair::new(Side::Expiratory, ex_a, ex_b),
        )
    }

    /// Read all four sensors: (inspiratory, expiratory)
    pub fn read(&mut self) -> Result<(SensorPair, SensorPair), SensorError> {
        let inspiratory = self.inspiratory.read()?;
        let expiratory = self.expiratory.read()?;
        Ok((inspiratory, expiratory))
    }

    pub fn inspiratory(&self) -> &DifferentialPair {
        &self.inspiratory
    }

    pub fn expiratory(&self) -> &DifferentialPair {
        &self.expiratory
    }

    pub(crate) fn pairs_mut(&mut self) -> [&mut DifferentialPair; 2] {
        [&mut self.inspiratory, &mut self.expiratory]
    }
}
