//! Time source for the scheduler and calibrator
//!
//! [`SystemClock`] stamps samples with wall time and paces on a monotonic
//! clock. [`ManualClock`] only moves when slept on or advanced, which makes
//! tick timing deterministic in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

pub trait Clock: Send {
    /// Seconds since the Unix epoch, used for sample timestamps
    fn now(&self) -> f64;

    /// Monotonic time since an arbitrary origin, used for pacing
    ///
    /// Never goes backwards, even when the wall clock is stepped.
    fn monotonic(&self) -> Duration;

    /// Block for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by chrono and `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

/// Origin for [`SystemClock::monotonic`], fixed on first use
static MONOTONIC_ORIGIN: OnceLock<Instant> = OnceLock::new();

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }

    fn monotonic(&self) -> Duration {
        MONOTONIC_ORIGIN.get_or_init(Instant::now).elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that advances only on `sleep` and `advance`
///
/// Clones share the same time. Monotonic time is the distance from `start`.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: f64,
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            start,
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let now = self.now() + duration.as_secs_f64();
        self.bits.store(now.to_bits(), Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    fn monotonic(&self) -> Duration {
        Duration::from_secs_f64((self.now() - self.start).max(0.0))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new(10.0);
        clock.sleep(Duration::from_millis(250));
        assert!((clock.now() - 10.25).abs() < 1e-12);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(0.0);
        let handle = clock.clone();
        clock.advance(Duration::from_secs(2));
        assert_eq!(handle.now(), 2.0);
    }

    #[test]
    fn test_manual_clock_monotonic_counts_from_start() {
        let clock = ManualClock::new(1_700_000_000.0);
        assert_eq!(clock.monotonic(), Duration::ZERO);
        clock.advance(Duration::from_millis(5));
        let elapsed = clock.monotonic().as_secs_f64();
        assert!((elapsed - 0.005).abs() < 1e-6);
    }

    #[test]
    fn test_system_clock_monotonic_never_goes_back() {
        let first = SystemClock.monotonic();
        let second = SystemClock.monotonic();
        assert!(second >= first);
    }

    #[test]
    fn test_system_clock_is_epoch_seconds() {
        let now = SystemClock.now();
        // After 2020-01-01
        assert!(now > 1_577_836_800.0);
    }
}
