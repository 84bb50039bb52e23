//! Breath-cycle state machine and per-cycle accumulators
//!
//! The valve signal drives the phase. While inspiration is commanded the
//! engine integrates inspiratory flow and tracks peak inspiratory pressure;
//! while expiration is commanded it integrates expiratory flow into both
//! the running volume and the tidal sum and tracks the lowest expiratory
//! pressure.
//!
//! Per-breath metrics (tidal volume, pressure extrema, expiration time)
//! only mean something for a completed breath, so every published sample
//! carries the metrics of the *previous* completed cycle. They change only
//! on the expiration to inspiration edge. The running volume trace is live
//! within the current cycle but is normalized with the previous cycle's
//! sample count.

use super::flow::FlowComputer;
use crate::sensor::SensorPair;
use crate::stats::store::DerivedSample;

/// Commanded breath phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreathPhase {
    Inspire,
    Expire,
}

/// Running sums for the cycle in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CycleAccumulator {
    /// Inspiratory minus expiratory flow integral
    pub(crate) volume_sum: f64,
    /// Ticks in this cycle
    pub(crate) sample_count: u64,
    /// Expiratory flow integral
    pub(crate) tidal_sum: f64,
    /// Lowest expiratory pressure so far (starts at the sensor ceiling)
    pub(crate) pmin: f64,
    /// Highest inspiratory pressure so far (starts at 0)
    pub(crate) pmax: f64,
    /// Timestamp of the last inspiration to expiration edge
    pub(crate) expire_start: Option<f64>,
}

impl CycleAccumulator {
    fn new() -> Self {
        Self {
            volume_sum: 0.0,
            sample_count: 0,
            tidal_sum: 0.0,
            pmin: crate::MAXPA,
            pmax: 0.0,
            expire_start: None,
        }
    }

    fn reset(&mut self) {
        *self = Self {
            expire_start: self.expire_start,
            ..Self::new()
        };
    }
}

/// Metrics of the last completed breath
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalizedCycleMetrics {
    /// Raw expiratory flow integral
    pub tidal: f64,
    /// Ticks in the cycle
    pub sample_count: u64,
    pub pmin: f64,
    pub pmax: f64,
    /// Seconds from the expiration edge to the next inspiration edge
    pub expire_duration: f64,
}

impl Default for FinalizedCycleMetrics {
    fn default() -> Self {
        Self {
            tidal: 0.0,
            sample_count: crate::DEFAULT_CYCLE_SAMPLES,
            pmin: 0.0,
            pmax: 0.0,
            expire_duration: 0.0,
        }
    }
}

/// Result of feeding one tick to the engine
#[derive(Debug, Clone, Copy)]
pub struct CycleUpdate {
    pub sample: DerivedSample,
    /// Set on the tick that closed a breath
    pub completed: Option<FinalizedCycleMetrics>,
}

/// Tracks breath phase and publishes lagged per-cycle metrics
///
/// The running sums of the cycle in progress stay inside the engine:
///
/// ```compile_fail
/// let engine = ventmon_core::BreathCycleEngine::default();
/// let _ = engine.accumulator();
/// ```
#[derive(Debug, Clone)]
pub struct BreathCycleEngine {
    flow: FlowComputer,
    phase: BreathPhase,
    acc: CycleAccumulator,
    last: FinalizedCycleMetrics,
    cycles: u64,
}

impl BreathCycleEngine {
    pub fn new(flow: FlowComputer) -> Self {
        Self {
            flow,
            phase: BreathPhase::Expire,
            acc: CycleAccumulator::new(),
            last: FinalizedCycleMetrics::default(),
            cycles: 0,
        }
    }

    pub fn phase(&self) -> BreathPhase {
        self.phase
    }

    #[cfg(test)]
    pub(crate) fn accumulator(&self) -> &CycleAccumulator {
        &self.acc
    }

    pub fn last_cycle(&self) -> &FinalizedCycleMetrics {
        &self.last
    }

    /// Number of breaths completed so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Feed one tick
    ///
    /// # Arguments
    /// * `ts` - Tick timestamp in seconds
    /// * `inspiring` - Whether the valve currently commands inspiration
    /// * `inspiratory` - Inspiratory pair reading
    /// * `expiratory` - Expiratory pair reading
    pub fn update(
        &mut self,
        ts: f64,
        inspiring: bool,
        inspiratory: SensorPair,
        expiratory: SensorPair,
    ) -> CycleUpdate {
        let in_flow = self.flow.pair_flow(&inspiratory);
        let ex_flow = self.flow.pair_flow(&expiratory);
        let mut completed = None;

        let flow = if inspiring {
            if self.phase == BreathPhase::Expire {
                self.phase = BreathPhase::Inspire;
                completed = self.finalize(ts);
            }
            self.acc.sample_count += 1;
            self.acc.volume_sum += in_flow;
            self.acc.pmax = self.acc.pmax.max(inspiratory.p_b);
            in_flow
        } else {
            if self.phase == BreathPhase::Inspire {
                self.phase = BreathPhase::Expire;
                self.acc.expire_start = Some(ts);
            }
            self.acc.sample_count += 1;
            self.acc.tidal_sum += ex_flow;
            self.acc.volume_sum -= ex_flow;
            self.acc.pmin = self.acc.pmin.min(expiratory.p_b);
            -ex_flow
        };

        let scale = 60.0 / self.last.sample_count as f64;
        let sample = DerivedSample {
            timestamp: ts,
            flow,
            volume: self.acc.volume_sum * scale,
            tidal: self.last.tidal * scale,
            pmin: self.last.pmin,
            pmax: self.last.pmax,
            expire_duration: self.last.expire_duration,
            in_pressure_a: inspiratory.p_a,
            in_pressure_b: inspiratory.p_b,
            in_flow,
            ex_pressure_a: expiratory.p_a,
            ex_pressure_b: expiratory.p_b,
            ex_flow,
        };

        CycleUpdate { sample, completed }
    }

    /// Close the cycle on the expiration to inspiration edge
    ///
    /// An empty accumulator (the session opened mid-inspiration) is not a
    /// breath and leaves the previous metrics, and so the volume divisor,
    /// untouched.
    fn finalize(&mut self, ts: f64) -> Option<FinalizedCycleMetrics> {
        let expire_duration = match self.acc.expire_start.take() {
            Some(start) => ts - start,
            None => self.last.expire_duration,
        };

        if self.acc.sample_count == 0 {
            self.acc.reset();
            return None;
        }

        self.last = FinalizedCycleMetrics {
            tidal: self.acc.tidal_sum,
            sample_count: self.acc.sample_count,
            pmin: self.acc.pmin,
            pmax: self.acc.pmax,
            expire_duration,
        };
        self.acc.reset();
        self.cycles += 1;

        tracing::debug!(
            cycle = self.cycles,
            tidal = self.last.tidal,
            samples = self.last.sample_count,
            pmin = self.last.pmin,
            pmax = self.last.pmax,
            expire_s = self.last.expire_duration,
            "Breath cycle completed"
        );
        Some(self.last)
    }
}

impl Default for BreathCycleEngine {
    fn default() -> Self {
        Self::new(FlowComputer::default())
    }
}
