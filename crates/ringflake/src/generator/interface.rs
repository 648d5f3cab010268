use crate::Result;

/// Supplies every id belonging to one second, in sequence order.
///
/// The padding path calls this with an explicit second so pre-generation never
/// touches the live generator state. Implementations must be deterministic:
/// the same second always yields the same ids.
pub trait UidProvider {
    /// Returns the `max_sequence + 1` ids for `second` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Fails if `second` cannot be encoded by the layout.
    fn provide(&self, second: i64) -> Result<Vec<u64>>;
}

impl<P: UidProvider + ?Sized> UidProvider for std::sync::Arc<P> {
    fn provide(&self, second: i64) -> Result<Vec<u64>> {
        (**self).provide(second)
    }
}
