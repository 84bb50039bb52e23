//! Shared state between the acquisition loop and its readers
//!
//! One [`MonitorContext`] is built at startup and cloned into every party:
//! the acquisition thread, the valve controller and the monitoring side.
//! Clones share the same store, flag and settings.

use super::settings::{Settings, SharedSettings};
use crate::breath::valve::BreathingFlag;
use crate::stats::store::{DerivedSample, SampleStore};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of the acquisition loop as seen by readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MonitorState {
    Starting = 0,
    Calibrating = 1,
    Running = 2,
    Stopped = 3,
    /// A fatal error ended acquisition; store contents are stale
    Failed = 4,
}

impl MonitorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => MonitorState::Starting,
            1 => MonitorState::Calibrating,
            2 => MonitorState::Running,
            3 => MonitorState::Stopped,
            _ => MonitorState::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorContext {
    store: Arc<SampleStore>,
    flag: BreathingFlag,
    settings: Arc<SharedSettings>,
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl MonitorContext {
    pub fn new(capacity: usize, settings: Settings) -> Self {
        Self {
            store: Arc::new(SampleStore::new(capacity)),
            flag: BreathingFlag::new(),
            settings: Arc::new(SharedSettings::new(settings)),
            running: Arc::new(AtomicBool::new(true)),
            state: Arc::new(AtomicU8::new(MonitorState::Starting as u8)),
        }
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    pub fn flag(&self) -> &BreathingFlag {
        &self.flag
    }

    pub fn settings(&self) -> &Arc<SharedSettings> {
        &self.settings
    }

    /// Termination flag checked by the scheduler between ticks
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the acquisition loop to stop before its next sleep
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: MonitorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Latest sample, withheld unless the loop is running
    pub fn live_sample(&self) -> Option<DerivedSample> {
        match self.state() {
            MonitorState::Running => self.store.latest(),
            _ => None,
        }
    }

    /// Up to `count` recent samples, withheld unless the loop is running
    pub fn live_window(&self, count: usize) -> Vec<DerivedSample> {
        match self.state() {
            MonitorState::Running => self.store.recent(count),
            _ => Vec::new(),
        }
    }
}

impl Default for MonitorContext {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CAPACITY, Settings::default())
    }
}
