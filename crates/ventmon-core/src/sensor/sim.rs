//! Simulated pressure sensors
//!
//! [`SimulatedSensor`] wraps any reading source and honours zero offsets
//! like a real driver. [`PatientCircuit`] builds the four sensors of a
//! simulated breathing circuit that follows the valve signal, so the whole
//! acquisition path can run without hardware.

use super::{SensorError, SensorPort};
use crate::breath::valve::{BreathingFlag, ValveSignal, INSPIRE};
use std::time::Duration;

/// Standard atmospheric pressure in Pa (the raw baseline before zeroing)
pub const AMBIENT_PA: f64 = 101_325.0;

type Source = Box<dyn FnMut() -> f64 + Send>;

/// Simulated sensor driven by a reading source
pub struct SimulatedSensor {
    name: String,
    source: Source,
    offset: f64,
    reads: u64,
    fail_after: Option<u64>,
}

impl SimulatedSensor {
    /// Sensor producing readings from `source`
    pub fn from_fn(name: &str, source: impl FnMut() -> f64 + Send + 'static) -> Self {
        Self {
            name: name.to_string(),
            source: Box::new(source),
            offset: 0.0,
            reads: 0,
            fail_after: None,
        }
    }

    /// Sensor that always reads `value`
    pub fn constant(name: &str, value: f64) -> Self {
        Self::from_fn(name, move || value)
    }

    /// Sensor that cycles through `values` forever
    pub fn scripted(name: &str, values: Vec<f64>) -> Self {
        let mut i = 0usize;
        Self::from_fn(name, move || {
            if values.is_empty() {
                return 0.0;
            }
            let v = values[i % values.len()];
            i += 1;
            v
        })
    }

    /// Make every read after the first `reads` fail as if the bus dropped
    pub fn fail_after(mut self, reads: u64) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Number of successful reads so far
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl SensorPort for SimulatedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<f64, SensorError> {
        if self.fail_after.is_some_and(|n| self.reads >= n) {
            return Err(SensorError::BusUnreachable(format!(
                "{} stopped responding",
                self.name
            )));
        }
        self.reads += 1;
        Ok((self.source)() - self.offset)
    }

    fn zero_pressure(&mut self, offset: f64) -> Result<(), SensorError> {
        self.offset = offset;
        Ok(())
    }
}

/// Parameters of the simulated breathing circuit (pressures in Pa)
#[derive(Debug, Clone, Copy)]
pub struct CircuitParams {
    /// Sampling period the sensors are read at
    pub tick: Duration,
    /// Peak inspiratory pressure
    pub peak_pressure: f64,
    /// Positive end-expiratory pressure
    pub peep: f64,
    /// Venturi differential at the start of inspiration
    pub inspiratory_drive: f64,
    /// Venturi differential at the start of expiration
    pub expiratory_drive: f64,
    /// Spontaneous effort: (seconds into expiration, pressure drop)
    pub effort: Option<(f64, f64)>,
    /// Peak-to-peak noise amplitude
    pub noise: f64,
}

impl Default for CircuitParams {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(crate::DEFAULT_TICK_MS),
            peak_pressure: 2000.0,
            peep: 500.0,
            inspiratory_drive: 25.0,
            expiratory_drive: 30.0,
            effort: None,
            noise: 0.5,
        }
    }
}

/// Which of the four circuit sensors a tap models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tap {
    InspiratoryA,
    InspiratoryB,
    ExpiratoryA,
    ExpiratoryB,
}

/// Per-sensor view of the circuit
///
/// Each sensor is read exactly once per tick, so counting its own reads
/// gives the tick count since the last valve edge without shared state.
struct CircuitTap {
    tap: Tap,
    valve: BreathingFlag,
    params: CircuitParams,
    baseline: f64,
    started: bool,
    last: u8,
    ticks_since_edge: u64,
    noise_seed: u32,
}

impl CircuitTap {
    fn sample(&mut self) -> f64 {
        let state = self.valve.state();
        if state != self.last {
            self.last = state;
            self.ticks_since_edge = 0;
            self.started |= state == INSPIRE;
        } else {
            self.ticks_since_edge += 1;
        }

        if !self.started {
            return self.baseline + self.noise();
        }

        let p = &self.params;
        let t = self.ticks_since_edge as f64 * p.tick.as_secs_f64();
        let (airway, in_diff, ex_diff) = if state == INSPIRE {
            let airway = p.peep + (p.peak_pressure - p.peep) * (1.0 - (-t / 0.1).exp());
            (airway, p.inspiratory_drive * (-t / 0.3).exp(), 0.0)
        } else {
            let airway = p.peep + (p.peak_pressure - p.peep) * (-t / 0.15).exp();
            (airway, 0.0, p.expiratory_drive * (-t / 0.25).exp())
        };

        let effort = match p.effort {
            Some((after, depth)) if state != INSPIRE && t >= after => depth,
            _ => 0.0,
        };

        let relative = match self.tap {
            Tap::InspiratoryA => airway + in_diff - effort,
            Tap::InspiratoryB => airway - effort,
            Tap::ExpiratoryA => airway,
            Tap::ExpiratoryB => airway - ex_diff,
        };
        self.baseline + relative + self.noise()
    }

    fn noise(&mut self) -> f64 {
        // LCG parameters (same as glibc)
        self.noise_seed = self.noise_seed.wrapping_mul(1103515245).wrapping_add(12345);
        let bits = (self.noise_seed >> 16) & 0x7FFF;
        ((bits as f64 / 16384.0) - 1.0) * self.params.noise * 0.5
    }
}

/// Four-sensor simulated breathing circuit following a valve signal
pub struct PatientCircuit {
    valve: BreathingFlag,
    params: CircuitParams,
}

impl PatientCircuit {
    pub fn new(valve: BreathingFlag, params: CircuitParams) -> Self {
        Self { valve, params }
    }

    /// Sensors in bank order: in_a, in_b, ex_a, ex_b
    pub fn sensors(&self) -> [Box<dyn SensorPort>; 4] {
        let taps = [
            ("in_a", Tap::InspiratoryA, 0.0),
            ("in_b", Tap::InspiratoryB, 3.5),
            ("ex_a", Tap::ExpiratoryA, -2.0),
            ("ex_b", Tap::ExpiratoryB, 1.25),
        ];
        taps.map(|(name, tap, skew)| {
            let mut state = CircuitTap {
                tap,
                valve: self.valve.clone(),
                params: self.params,
                baseline: AMBIENT_PA + skew,
                started: false,
                last: self.valve.state(),
                ticks_since_edge: 0,
                noise_seed: 0xDEADBEEF ^ (tap as u32).wrapping_mul(0x9E37_79B9),
            };
            Box::new(SimulatedSensor::from_fn(name, move || state.sample())) as Box<dyn SensorPort>
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breath::valve::EXPIRE;

    fn quiet() -> CircuitParams {
        CircuitParams {
            noise: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_scripted_cycles() {
        let mut sensor = SimulatedSensor::scripted("s", vec![1.0, 2.0]);
        assert_eq!(sensor.read().unwrap(), 1.0);
        assert_eq!(sensor.read().unwrap(), 2.0);
        assert_eq!(sensor.read().unwrap(), 1.0);
        assert_eq!(sensor.reads(), 3);
    }

    #[test]
    fn test_zero_offset_applied() {
        let mut sensor = SimulatedSensor::constant("s", 10.0);
        sensor.zero_pressure(4.0).unwrap();
        assert_eq!(sensor.read().unwrap(), 6.0);
        sensor.zero_pressure(0.0).unwrap();
        assert_eq!(sensor.read().unwrap(), 10.0);
    }

    #[test]
    fn test_fail_after() {
        let mut sensor = SimulatedSensor::constant("s", 1.0).fail_after(1);
        assert!(sensor.read().is_ok());
        assert!(matches!(sensor.read(), Err(SensorError::BusUnreachable(_))));
    }

    #[test]
    fn test_circuit_idle_until_first_inspiration() {
        let valve = BreathingFlag::new();
        let mut sensors = PatientCircuit::new(valve, quiet()).sensors();
        let reading = sensors[0].read().unwrap();
        assert_eq!(reading, AMBIENT_PA);
    }

    #[test]
    fn test_circuit_follows_valve() {
        let valve = BreathingFlag::new();
        let mut sensors = PatientCircuit::new(valve.clone(), quiet()).sensors();

        let baselines = [AMBIENT_PA, AMBIENT_PA + 3.5, AMBIENT_PA - 2.0, AMBIENT_PA + 1.25];
        let tick = |sensors: &mut [Box<dyn SensorPort>; 4]| -> [f64; 4] {
            let mut out = [0.0; 4];
            for (i, sensor) in sensors.iter_mut().enumerate() {
                out[i] = sensor.read().unwrap() - baselines[i];
            }
            out
        };

        valve.command(INSPIRE);
        let [in_a, in_b, ex_a, ex_b] = tick(&mut sensors);
        assert!(in_a > in_b, "inspiratory flow expected");
        assert_eq!(ex_a, ex_b);

        valve.command(EXPIRE);
        let [in_a, in_b, ex_a, ex_b] = tick(&mut sensors);
        assert_eq!(in_a, in_b);
        assert!(ex_a > ex_b, "expiratory flow expected");
    }

    #[test]
    fn test_circuit_spontaneous_effort() {
        let valve = BreathingFlag::new();
        let params = CircuitParams {
            effort: Some((0.02, 1500.0)),
            peep: 0.0,
            ..quiet()
        };
        let mut sensors = PatientCircuit::new(valve.clone(), params).sensors();
        valve.command(INSPIRE);
        sensors[1].read().unwrap();
        valve.command(EXPIRE);

        let mut lowest = f64::MAX;
        for _ in 0..400 {
            lowest = lowest.min(sensors[1].read().unwrap() - (AMBIENT_PA + 3.5));
        }
        assert!(lowest < -1000.0, "effort should pull pressure negative: {}", lowest);
    }
}
