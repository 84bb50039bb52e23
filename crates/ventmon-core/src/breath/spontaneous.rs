//! Patient-initiated breath detection
//!
//! In assist mode a patient effort shows up as inspiratory pressure
//! dropping below `-assist_threshold` while the valve is still commanding
//! expiration. The detector then raises the breathing flag itself and
//! reports the event. Once the flag is up nothing further happens until
//! the valve controller drops it again.

use super::valve::{ValveSignal, EXPIRE, INSPIRE};
use crossbeam_channel::{Receiver, Sender};

/// Event emitted when a spontaneous breath is recognized
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpontaneousBreathEvent {
    /// Tick timestamp in seconds
    pub timestamp: f64,
    /// Inspiratory pressure that triggered detection
    pub pressure: f64,
    /// Assist threshold in effect
    pub threshold: f64,
}

/// Watches inspiratory pressure for patient effort
#[derive(Debug, Default)]
pub struct SpontaneousBreathDetector {
    events: Option<Sender<SpontaneousBreathEvent>>,
    detections: u64,
}

impl SpontaneousBreathDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector that also publishes events on a bounded channel
    ///
    /// Sends never block; events are dropped when the receiver lags.
    pub fn with_events(capacity: usize) -> (Self, Receiver<SpontaneousBreathEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            Self {
                events: Some(tx),
                detections: 0,
            },
            rx,
        )
    }

    /// Total spontaneous breaths detected
    pub fn detections(&self) -> u64 {
        self.detections
    }

    /// Check one tick
    ///
    /// # Arguments
    /// * `ts` - Tick timestamp in seconds
    /// * `pressure` - Inspiratory pressure (sensor b) for this tick
    /// * `valve` - Breathing flag; raised when a breath is detected
    /// * `assist_threshold` - Trigger depth in Pa; `<= 0` disables assist
    pub fn check(
        &mut self,
        ts: f64,
        pressure: f64,
        valve: &dyn ValveSignal,
        assist_threshold: f64,
    ) -> Option<SpontaneousBreathEvent> {
        if assist_threshold <= 0.0 {
            return None;
        }
        if pressure >= -assist_threshold || valve.state() != EXPIRE {
            return None;
        }

        valve.command(INSPIRE);
        self.detections += 1;

        let event = SpontaneousBreathEvent {
            timestamp: ts,
            pressure,
            threshold: assist_threshold,
        };
        tracing::warn!(
            pressure,
            threshold = assist_threshold,
            count = self.detections,
            "Spontaneous breath initiated"
        );
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
        Some(event)
    }
}
