//! Zero-offset calibration for the sensor bank
//!
//! Sensors are primed with a burst of discarded reads at the tick interval,
//! zeroed against the current (ambient) reading, then primed again. The
//! second pass doubles as a stability check: any residual pressure left
//! after zeroing is reported.

use super::{SensorBank, SensorError};
use crate::acquisition::clock::Clock;
use std::time::Duration;

/// Residual pressure (Pa) after zeroing above which a warning is logged
const RESIDUAL_WARN_PA: f64 = 5.0;

/// Zero offsets recorded for one differential pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibrationOffset {
    pub a: f64,
    pub b: f64,
}

/// Outcome of a full calibration run
#[derive(Debug, Clone, Copy)]
pub struct CalibrationReport {
    pub inspiratory: CalibrationOffset,
    pub expiratory: CalibrationOffset,
    /// Largest absolute reading seen during the verification pass
    pub residual_max: f64,
}

/// Primes and zeroes the four sensors before steady-state sampling
#[derive(Debug, Clone)]
pub struct Calibrator {
    prime_reads: usize,
    interval: Duration,
}

impl Calibrator {
    pub fn new(prime_reads: usize, interval: Duration) -> Self {
        Self {
            prime_reads: prime_reads.max(crate::PRIME_READS),
            interval,
        }
    }

    pub fn prime_reads(&self) -> usize {
        self.prime_reads
    }

    /// Discard `prime_reads` reads of every sensor, one round per interval
    ///
    /// Returns the largest absolute pressure observed.
    pub fn prime(&self, bank: &mut SensorBank, clock: &dyn Clock) -> Result<f64, SensorError> {
        let mut peak = 0.0f64;
        for _ in 0..self.prime_reads {
            clock.sleep(self.interval);
            let (ins, exp) = bank.read()?;
            for p in [ins.p_a, ins.p_b, exp.p_a, exp.p_b] {
                peak = peak.max(p.abs());
            }
        }
        Ok(peak)
    }

    /// Record each sensor's current reading as its zero offset
    pub fn zero(&self, bank: &mut SensorBank) -> Result<(), SensorError> {
        for pair in bank.pairs_mut() {
            let mut offsets = [0.0f64; 2];
            for (port, offset) in pair.ports_mut().into_iter().zip(offsets.iter_mut()) {
                port.zero_pressure(0.0)?;
                let raw = port.read()?;
                port.zero_pressure(raw)?;
                *offset = raw;
            }
            let offset = CalibrationOffset {
                a: offsets[0],
                b: offsets[1],
            };
            tracing::info!(side = ?pair.side(), a = offset.a, b = offset.b, "Sensor pair zeroed");
            pair.set_offset(offset);
        }
        Ok(())
    }

    /// Prime, zero, then prime again to verify the offsets hold
    pub fn calibrate(
        &self,
        bank: &mut SensorBank,
        clock: &dyn Clock,
    ) -> Result<CalibrationReport, SensorError> {
        tracing::info!(reads = self.prime_reads, "Calibration started");
        self.prime(bank, clock)?;
        self.zero(bank)?;
        let residual_max = self.prime(bank, clock)?;

        if residual_max > RESIDUAL_WARN_PA {
            tracing::warn!(residual_max, "Sensors not stable after zeroing");
        }

        let report = CalibrationReport {
            inspiratory: bank.inspiratory().offset().unwrap_or_default(),
            expiratory: bank.expiratory().offset().unwrap_or_default(),
            residual_max,
        };
        tracing::info!(residual_max, "Calibration finished");
        Ok(report)
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(
            crate::PRIME_READS,
            Duration::from_millis(crate::DEFAULT_TICK_MS),
        )
    }
}
