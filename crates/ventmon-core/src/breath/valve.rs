//! Valve signal shared between the valve controller and the acquisition loop
//!
//! The breathing flag is a single word: 0 while expiration is commanded,
//! 1 while inspiration is commanded. Two writers exist (the valve
//! controller and the spontaneous breath detector) and no lock is taken.
//! Every write is a whole-word atomic store from the same 0/1 domain, so
//! concurrent writers resolve as last-writer-wins and the flag can never
//! hold a torn or out-of-domain value.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Flag value while the valve commands expiration
pub const EXPIRE: u8 = 0;

/// Flag value while the valve commands inspiration
pub const INSPIRE: u8 = 1;

/// Capability for reading and commanding the valve state
pub trait ValveSignal: Send + Sync {
    /// Current commanded state ([`EXPIRE`] or [`INSPIRE`])
    fn state(&self) -> u8;

    /// Command a new state; any nonzero value means [`INSPIRE`]
    fn command(&self, state: u8);

    fn is_inspiring(&self) -> bool {
        self.state() == INSPIRE
    }
}

/// Shared breathing flag backed by a single atomic byte
#[derive(Debug, Clone, Default)]
pub struct BreathingFlag(Arc<AtomicU8>);

impl BreathingFlag {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValveSignal for BreathingFlag {
    fn state(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    fn command(&self, state: u8) {
        let value = if state == EXPIRE { EXPIRE } else { INSPIRE };
        self.0.store(value, Ordering::Release);
    }
}

/// Simulated valve controller cycling at a fixed rate and duty
///
/// Writes the flag only on its own edges. When it sees the flag raised by
/// someone else during expiration (an assisted breath), it restarts its
/// cycle from that moment instead of fighting the other writer.
#[derive(Debug, Clone)]
pub struct ValveCycler {
    rate_bpm: f64,
    duty: f64,
    cycle_start: f64,
    last: u8,
}

impl ValveCycler {
    /// Create a cycler at `rate_bpm` breaths per minute with inspiratory
    /// fraction `duty` (clamped to 0.1..=0.9)
    pub fn new(rate_bpm: f64, duty: f64) -> Self {
        Self {
            rate_bpm: rate_bpm.clamp(1.0, 60.0),
            duty: duty.clamp(0.1, 0.9),
            cycle_start: 0.0,
            last: EXPIRE,
        }
    }

    /// Breath period in seconds
    pub fn period_secs(&self) -> f64 {
        60.0 / self.rate_bpm
    }

    pub fn duty(&self) -> f64 {
        self.duty
    }

    /// Commanded state `elapsed` seconds into a cycle
    pub fn command_at(&self, elapsed: f64) -> u8 {
        let period = self.period_secs();
        let phase = elapsed.rem_euclid(period);
        if phase < self.duty * period {
            INSPIRE
        } else {
            EXPIRE
        }
    }

    /// Advance to `now` (seconds since the cycler started)
    ///
    /// Returns the state written to the valve, if any.
    pub fn step(&mut self, now: f64, valve: &dyn ValveSignal) -> Option<u8> {
        if self.last == EXPIRE && valve.state() == INSPIRE {
            tracing::debug!(at = now, "Valve cycle restarted by assisted breath");
            self.cycle_start = now;
            self.last = INSPIRE;
            return None;
        }

        let want = self.command_at(now - self.cycle_start);
        if want != self.last {
            valve.command(want);
            self.last = want;
            return Some(want);
        }
        None
    }

    /// Run the cycler on its own thread until `running` is cleared
    pub fn spawn(
        mut self,
        valve: BreathingFlag,
        running: Arc<AtomicBool>,
        tick: Duration,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("valve-cycler".into())
            .spawn(move || {
                tracing::info!(
                    rate_bpm = self.rate_bpm,
                    duty = self.duty,
                    "Valve cycler running"
                );
                let started = Instant::now();
                while running.load(Ordering::Acquire) {
                    self.step(started.elapsed().as_secs_f64(), &valve);
                    std::thread::sleep(tick);
                }
                valve.command(EXPIRE);
                tracing::info!("Valve cycler stopped");
            })
    }
}
