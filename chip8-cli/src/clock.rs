//! Cycle pacing.
use std::{
    thread,
    time::{Duration, Instant},
};

/// Number of nanoseconds in a second
const NANOS_IN_SECOND: u64 = 1_000_000_000;

/// Clock frequency, in hertz (per second)
#[derive(Debug, Default, Clone, Copy)]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

/// Timer to synchronize the driving loop with the emulated machine.
///
/// When the loop spends time on rendering and input between cycles,
/// that time is taken into account when determining the next cycle.
pub struct Clock {
    last: Instant,
    interval: Duration,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    pub fn new(interval: Duration) -> Self {
        Self {
            last: Instant::now(),
            interval,
        }
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.last = Instant::now()
    }

    /// Block the current thread until the next clock cycle.
    pub fn wait(&mut self) {
        let elapsed = self.last.elapsed();
        if elapsed < self.interval {
            thread::sleep(self.interval - elapsed);
        }

        // Reset back to zero, rather than trying to catch up.
        //
        // If the loop was stalled, and a large amount of time has
        // elapsed, it should simply continue at its usual speed.
        self.reset();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);

        let interval: Duration = Hz(0).into();
        assert_eq!(interval, Duration::ZERO);
    }

    #[test]
    fn test_clock_wait() {
        let mut clock = Clock::new(Duration::from_millis(5));
        let start = Instant::now();
        clock.wait();
        clock.wait();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
