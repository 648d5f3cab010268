use core::time::Duration;

/// Custom epoch: Wednesday, January 1, 2025 00:00:00 UTC
pub const CUSTOM_EPOCH: Duration = Duration::from_secs(1_735_689_600);

/// A trait for time sources that report the current wall-clock second.
///
/// This abstraction allows you to plug in the real system clock, a monotonic
/// clock, or a mocked time source in tests.
///
/// The unit is **seconds since the Unix epoch**. Generators subtract their
/// configured epoch themselves.
///
/// # Example
///
/// ```
/// use ringflake::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_second(&self) -> i64 {
///         1_735_689_600
///     }
/// }
///
/// assert_eq!(FixedTime.current_second(), 1_735_689_600);
/// ```
pub trait TimeSource {
    /// Returns the current Unix time in whole seconds.
    fn current_second(&self) -> i64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn current_second(&self) -> i64 {
        (**self).current_second()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn current_second(&self) -> i64 {
        (**self).current_second()
    }
}
