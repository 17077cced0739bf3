//! Wall-clock abstraction for lease timing and retry pacing.
//!
//! All lease math runs on epoch-milliseconds through the [`Clock`] trait so
//! tests can drive acquisition deadlines and expiry without real waiting.
//! Production code uses [`SystemClock`].

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time source used by the lock manager and runner.
///
/// `sleep` is part of the trait because lock polling and renewal pacing are
/// the only places the core ever blocks on time; a simulated clock can turn
/// those waits into instant time jumps.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// `now + delta`, saturating.
    fn now_plus_ms(&self, delta_ms: u64) -> u64 {
        self.now_ms().saturating_add(delta_ms)
    }

    /// Whether `deadline_ms` is in the past.
    fn is_past(&self, deadline_ms: u64) -> bool {
        self.now_ms() > deadline_ms
    }

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Production clock backed by [`SystemTime`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Simulated clock for tests and deterministic replay.
///
/// Time only moves when told to: `sleep` advances the simulated instant
/// instead of blocking, so retry loops written against [`Clock`] run to
/// completion instantly. Sleep durations are recorded for assertions on
/// retry pacing.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Mutex<u64>,
    slept_ms: Mutex<Vec<u64>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Mutex::new(start_ms),
            slept_ms: Mutex::new(Vec::new()),
        }
    }

    /// Moves the clock forward by `delta_ms`.
    pub fn advance_ms(&self, delta_ms: u64) {
        let mut now = self.now_ms.lock().expect("clock mutex poisoned");
        *now = now.saturating_add(delta_ms);
    }

    /// Jumps the clock to an absolute instant.
    pub fn set_ms(&self, now_ms: u64) {
        *self.now_ms.lock().expect("clock mutex poisoned") = now_ms;
    }

    /// Every sleep duration requested so far, in call order.
    #[must_use]
    pub fn recorded_sleeps_ms(&self) -> Vec<u64> {
        self.slept_ms.lock().expect("clock mutex poisoned").clone()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        *self.now_ms.lock().expect("clock mutex poisoned")
    }

    fn sleep(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.slept_ms
            .lock()
            .expect("clock mutex poisoned")
            .push(millis);
        self.advance_ms(millis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000, "expected a post-2020 wall clock");
    }

    #[test]
    fn now_plus_saturates() {
        let clock = SystemClock;
        assert_eq!(clock.now_plus_ms(u64::MAX), u64::MAX);
    }

    #[test]
    fn is_past_compares_against_now() {
        let clock = SystemClock;
        assert!(clock.is_past(0));
        assert!(!clock.is_past(u64::MAX));
    }

    #[test]
    fn manual_clock_sleep_advances_time() {
        let clock = ManualClock::new(1_000);
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.now_ms(), 1_250);
        assert_eq!(clock.recorded_sleeps_ms(), vec![250]);
    }

    #[test]
    fn manual_clock_deadline_is_strict() {
        let clock = ManualClock::new(5_000);
        assert!(!clock.is_past(5_000));
        clock.advance_ms(1);
        assert!(clock.is_past(5_000));
    }

    #[test]
    fn manual_clock_set_jumps() {
        let clock = ManualClock::new(0);
        clock.set_ms(90_000);
        assert_eq!(clock.now_ms(), 90_000);
        assert_eq!(clock.now_plus_ms(10), 90_010);
    }
}
