//! Ventmon - Ventilator monitor acquisition core
//!
//! This library re-exports the acquisition, breath-cycle, and sample
//! publishing functionality from `ventmon-core`, plus the application
//! config and command line used by the `ventmon` binary.

pub mod cli;
pub mod config;

pub use ventmon_core::acquisition;
pub use ventmon_core::breath;
pub use ventmon_core::sensor;
pub use ventmon_core::stats;

pub use ventmon_core::{
    Acquisition, AcquisitionError, AcquisitionHandle, BreathingFlag, Calibrator, DerivedSample,
    MonitorContext, MonitorState, SampleLogger, SampleStore, Scheduler, SensorBank, Settings,
    ValveSignal,
};
pub use ventmon_core::{BUILD_DATE, DEFAULT_CAPACITY, DEFAULT_TICK_MS, VERSION};
