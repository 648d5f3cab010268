use ringflake::{CachedUidGenerator, SystemClock};

/// Clock used by the generator.
///
/// Reads the wall clock on every call, so a regression surfaces as an error
/// instead of being hidden.
pub type Clock = SystemClock;

/// Generator shared by every request handler.
pub type Generator = CachedUidGenerator<Clock>;
