use core::time::Duration;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::TimeSource;

/// A wall-clock time source backed by [`SystemTime`].
///
/// Every call reads the system clock, so NTP steps and manual adjustments are
/// visible to the generator. That is what lets
/// [`SequenceClock::next_id`](crate::SequenceClock::next_id) detect a clock
/// that moved backwards.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_second(&self) -> i64 {
        unix_seconds(SystemTime::now())
    }
}

/// A monotonic time source anchored to the wall clock once, at construction.
///
/// Elapsed time is measured with [`Instant`], so the reported second never
/// goes backward even if the system clock is adjusted externally. The price
/// is drift: a long-lived process slowly diverges from wall-clock time if the
/// host clock is corrected.
#[derive(Copy, Clone, Debug)]
pub struct MonotonicClock {
    anchor: Duration,
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Captures the current wall-clock time and a monotonic start instant.
    ///
    /// A system clock set before 1970 anchors the clock at the Unix epoch.
    pub fn new() -> Self {
        let start = Instant::now();
        let anchor = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self { anchor, start }
    }
}

impl TimeSource for MonotonicClock {
    fn current_second(&self) -> i64 {
        (self.anchor + self.start.elapsed()).as_secs() as i64
    }
}

fn unix_seconds(now: SystemTime) -> i64 {
    match now.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_tracks_system_time() {
        let expected = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let got = SystemClock.current_second();
        assert!((got - expected).abs() <= 1, "got {got}, expected {expected}");
    }

    #[test]
    fn monotonic_clock_never_goes_backward() {
        let clock = MonotonicClock::new();
        let mut last = clock.current_second();
        for _ in 0..10_000 {
            let now = clock.current_second();
            assert!(now >= last);
            last = now;
        }
        assert!((last - SystemClock.current_second()).abs() <= 1);
    }

    #[test]
    fn pre_epoch_time_is_negative() {
        let before = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(unix_seconds(before), -5);
    }
}
