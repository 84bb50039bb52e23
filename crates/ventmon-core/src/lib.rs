//! Ventmon Core - Sensor acquisition, breath-cycle engine, and sample publishing
//!
//! This library samples four differential pressure sensors on a fixed tick,
//! derives venturi flow, tracks inspiration/expiration cycles driven by the
//! valve signal, detects spontaneous breaths, and publishes every derived
//! sample to a lock-free ring buffer and a per-session log file.

pub mod acquisition;
pub mod breath;
pub mod sensor;
pub mod stats;

mod atomic;

pub use acquisition::context::{MonitorContext, MonitorState};
pub use acquisition::scheduler::{AcquisitionHandle, Scheduler};
pub use acquisition::settings::{Settings, SharedSettings};
pub use acquisition::{Acquisition, AcquisitionError};
pub use breath::cycle::{BreathCycleEngine, BreathPhase};
pub use breath::flow::FlowComputer;
pub use breath::spontaneous::SpontaneousBreathDetector;
pub use breath::valve::{BreathingFlag, ValveSignal};
pub use sensor::calibration::Calibrator;
pub use sensor::{SensorBank, SensorError, SensorPort};
pub use stats::logger::SampleLogger;
pub use stats::store::{DerivedSample, SampleStore};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Nominal sampling period in milliseconds (200 Hz)
pub const DEFAULT_TICK_MS: u64 = 5;

/// Default ring buffer capacity in samples (5 seconds at 200 Hz)
pub const DEFAULT_CAPACITY: usize = 1000;

/// Discard reads per priming pass while sensor electronics settle
pub const PRIME_READS: usize = 100;

/// Venturi coefficient for the flow sensor geometry
pub const VCO: f64 = 2.40256;

/// Upper bound of the sensor pressure range (Pa), used as the pmin sentinel
pub const MAXPA: f64 = 4000.0;

/// Samples assumed per breath before the first cycle completes
pub const DEFAULT_CYCLE_SAMPLES: u64 = 75;
