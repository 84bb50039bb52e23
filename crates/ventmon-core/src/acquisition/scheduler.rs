//! Fixed-period acquisition loop
//!
//! The scheduler stamps each tick with wall time, runs one acquisition
//! pass, then sleeps for what is left of the period as measured on the
//! clock's monotonic time. The termination flag is checked between ticks
//! and again before sleeping. A tick that takes longer than the period is
//! counted as an overrun and the next one starts immediately; there is no
//! catch-up.

use super::clock::{Clock, SystemClock};
use super::context::{MonitorContext, MonitorState};
use super::{Acquisition, AcquisitionError};
use crate::stats::store::DerivedSample;
use std::any::Any;
use std::fs::File;
use std::io::Write;
use std::thread::JoinHandle;
use std::time::Duration;

/// Drives an [`Acquisition`] at a fixed period
pub struct Scheduler<W: Write = File, C: Clock = SystemClock> {
    acquisition: Acquisition<W>,
    clock: C,
    period: Duration,
    ticks: u64,
    overruns: u64,
}

impl<W: Write, C: Clock> Scheduler<W, C> {
    pub fn new(acquisition: Acquisition<W>, clock: C, period: Duration) -> Self {
        Self {
            acquisition,
            clock,
            period,
            ticks: 0,
            overruns: 0,
        }
    }

    pub fn acquisition(&self) -> &Acquisition<W> {
        &self.acquisition
    }

    pub fn context(&self) -> &MonitorContext {
        self.acquisition.context()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks completed
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks that ran past their period
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Run exactly one tick without pacing
    ///
    /// On failure the context is marked failed before the error is returned.
    pub fn tick(&mut self) -> Result<DerivedSample, AcquisitionError> {
        let ts = self.clock.now();
        match self.acquisition.tick(ts) {
            Ok(sample) => {
                self.ticks += 1;
                Ok(sample)
            }
            Err(e) => {
                self.context().set_state(MonitorState::Failed);
                tracing::error!(error = %e, tick = self.ticks, "Acquisition failed");
                Err(e)
            }
        }
    }

    /// Run until the termination flag is cleared or a tick fails
    ///
    /// Returns the total number of ticks completed.
    pub fn run(&mut self) -> Result<u64, AcquisitionError> {
        self.run_until(None)
    }

    /// Run at most `count` ticks
    pub fn run_ticks(&mut self, count: u64) -> Result<u64, AcquisitionError> {
        self.run_until(Some(count))
    }

    fn run_until(&mut self, limit: Option<u64>) -> Result<u64, AcquisitionError> {
        let context = self.context().clone();
        context.set_state(MonitorState::Running);
        tracing::info!(
            period_ms = self.period.as_secs_f64() * 1000.0,
            capacity = context.store().capacity(),
            "Acquisition loop running"
        );

        let mut done = 0u64;
        while context.is_running() && limit.map_or(true, |n| done < n) {
            let started = self.clock.monotonic();
            self.tick()?;
            done += 1;

            if !context.is_running() {
                break;
            }
            self.pace(started);
        }

        context.set_state(MonitorState::Stopped);
        tracing::info!(
            ticks = self.ticks,
            overruns = self.overruns,
            "Acquisition loop stopped"
        );
        Ok(self.ticks)
    }

    /// Sleep for the rest of the period that began at `started`
    fn pace(&mut self, started: Duration) {
        let elapsed = self.clock.monotonic().saturating_sub(started);
        match self.period.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => self.clock.sleep(remaining),
            _ => {
                self.overruns += 1;
                // Powers of two, then every thousandth
                if self.overruns.is_power_of_two() || self.overruns % 1000 == 0 {
                    tracing::debug!(
                        overruns = self.overruns,
                        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                        "Tick overran its period"
                    );
                }
            }
        }
    }
}

impl<W, C> Scheduler<W, C>
where
    W: Write + Send + 'static,
    C: Clock + 'static,
{
    /// Run the loop on a dedicated thread
    ///
    /// A panic inside the loop is caught, marks the context failed and is
    /// returned from [`AcquisitionHandle::join`] as an error.
    pub fn spawn(mut self) -> std::io::Result<AcquisitionHandle> {
        let context = self.context().clone();
        let thread_context = context.clone();

        let thread = std::thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.run()));
                match result {
                    Ok(result) => result,
                    Err(panic_info) => {
                        let msg = panic_message(panic_info.as_ref());
                        thread_context.set_state(MonitorState::Failed);
                        tracing::error!(panic = %msg, "Acquisition thread PANICKED");
                        Err(AcquisitionError::Panicked(msg))
                    }
                }
            })?;

        Ok(AcquisitionHandle {
            context,
            thread: Some(thread),
        })
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a running acquisition thread
///
/// Dropping the handle stops the loop and waits for it.
pub struct AcquisitionHandle {
    context: MonitorContext,
    thread: Option<JoinHandle<Result<u64, AcquisitionError>>>,
}

impl AcquisitionHandle {
    pub fn context(&self) -> &MonitorContext {
        &self.context
    }

    /// Ask the loop to stop after the current tick
    pub fn stop(&self) {
        self.context.request_stop();
    }

    /// Check if the acquisition thread is still alive
    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the loop to end and return its tick count or failure
    pub fn join(mut self) -> Result<u64, AcquisitionError> {
        match self.thread.take() {
            Some(handle) => handle.join().unwrap_or_else(|panic_info| {
                Err(AcquisitionError::Panicked(panic_message(panic_info.as_ref())))
            }),
            None => Ok(0),
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }
}
