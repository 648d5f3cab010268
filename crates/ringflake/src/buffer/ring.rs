use core::fmt;

use crossbeam_utils::CachePadded;
use portable_atomic::{AtomicU64, Ordering};
use tracing::instrument;

use crate::{Error, Result};

/// One cell of the ring.
///
/// `stamp` encodes both the slot state and the lap it belongs to. For the
/// slot serving position `pos`:
/// - `stamp == pos` means Empty, ready for the put at `pos`
/// - `stamp == pos + 1` means Full, ready for the take at `pos`
///
/// A take at `pos` releases the slot for the next lap by storing
/// `pos + capacity`.
struct Slot {
    stamp: AtomicU64,
    value: AtomicU64,
}

/// A fixed-capacity, lock-free ring of pre-generated ids.
///
/// Producers [`put`](Self::put) at `tail`, consumers [`take`](Self::take) at
/// `cursor`. Both positions increase monotonically and are reduced modulo the
/// capacity to find their slot. Neither operation blocks: a put into a full
/// slot and a take from an empty slot both fail immediately.
///
/// Any number of threads may put and take concurrently. Each stored value is
/// taken exactly once and each slot accepts exactly one put per lap.
///
/// # Example
///
/// ```
/// use ringflake::RingBuffer;
///
/// let ring = RingBuffer::new(4, 50).unwrap();
/// assert!(ring.put(10));
/// assert!(ring.put(11));
/// assert_eq!(ring.len(), 2);
/// assert_eq!(ring.take(), Some(10));
/// assert_eq!(ring.take(), Some(11));
/// assert_eq!(ring.take(), None);
/// ```
pub struct RingBuffer {
    slots: Box<[Slot]>,
    mask: u64,
    padding_threshold: usize,
    /// Next position to write.
    tail: CachePadded<AtomicU64>,
    /// Next position to read.
    cursor: CachePadded<AtomicU64>,
}

impl RingBuffer {
    /// Allocates an empty ring of `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] unless `capacity` is a non-zero power
    /// of two and `padding_threshold_percent` lies in `1..=100`.
    pub fn new(capacity: usize, padding_threshold_percent: u32) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(Error::config(format!(
                "ring buffer capacity must be a power of two, got {capacity}"
            )));
        }
        if padding_threshold_percent == 0 || padding_threshold_percent > 100 {
            return Err(Error::config(format!(
                "padding threshold percent must be in 1..=100, got {padding_threshold_percent}"
            )));
        }

        let slots = (0..capacity as u64)
            .map(|i| Slot {
                stamp: AtomicU64::new(i),
                value: AtomicU64::new(0),
            })
            .collect();
        let padding_threshold =
            (capacity as u64 * u64::from(padding_threshold_percent) / 100) as usize;

        tracing::info!(
            "Initialized ring buffer with size {}, padding threshold {}",
            capacity,
            padding_threshold
        );

        Ok(Self {
            slots,
            mask: capacity as u64 - 1,
            padding_threshold,
            tail: CachePadded::new(AtomicU64::new(0)),
            cursor: CachePadded::new(AtomicU64::new(0)),
        })
    }

    /// Stores `value` in the slot at `tail` and advances `tail`.
    ///
    /// Returns `false` without writing anything when the ring is saturated,
    /// that is, the slot at `tail` still holds a value nobody has taken.
    #[instrument(level = "trace", skip(self))]
    #[must_use = "a rejected put means the value was not stored"]
    pub fn put(&self, value: u64) -> bool {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = self.slot(pos);
            let stamp = slot.stamp.load(Ordering::Acquire);
            let diff = stamp.wrapping_sub(pos) as i64;

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        slot.value.store(value, Ordering::Relaxed);
                        slot.stamp.store(pos.wrapping_add(1), Ordering::Release);
                        return true;
                    }
                    Err(actual) => pos = actual,
                }
            } else if diff < 0 {
                // Still Full from the previous lap.
                tracing::warn!(
                    "Rejected putting buffer uid: {}. tail: {}, cursor: {}",
                    value,
                    pos,
                    self.cursor.load(Ordering::Relaxed)
                );
                return false;
            } else {
                // Another producer claimed `pos` first.
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Removes the value in the slot at `cursor` and advances `cursor`.
    ///
    /// Returns `None` without moving `cursor` when that slot is Empty.
    #[instrument(level = "trace", skip(self))]
    pub fn take(&self) -> Option<u64> {
        let mut pos = self.cursor.load(Ordering::Relaxed);
        loop {
            let slot = self.slot(pos);
            let stamp = slot.stamp.load(Ordering::Acquire);
            let diff = stamp.wrapping_sub(pos.wrapping_add(1)) as i64;

            if diff == 0 {
                match self.cursor.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let value = slot.value.load(Ordering::Relaxed);
                        slot.stamp
                            .store(pos.wrapping_add(self.capacity() as u64), Ordering::Release);
                        return Some(value);
                    }
                    Err(actual) => pos = actual,
                }
            } else if diff < 0 {
                tracing::warn!(
                    "Rejected take buffer. tail: {}, cursor: {}",
                    self.tail.load(Ordering::Relaxed),
                    pos
                );
                return None;
            } else {
                pos = self.cursor.load(Ordering::Relaxed);
            }
        }
    }

    /// Number of values ready to be taken.
    ///
    /// Exact when the ring is quiescent, a snapshot otherwise.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let cursor = self.cursor.load(Ordering::Acquire);
        (tail.saturating_sub(cursor) as usize).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots a producer could still fill before the ring saturates.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Fill level below which a take should schedule a refill.
    pub const fn padding_threshold(&self) -> usize {
        self.padding_threshold
    }

    #[cfg(test)]
    pub(crate) fn positions(&self) -> (u64, u64) {
        (
            self.tail.load(Ordering::Acquire),
            self.cursor.load(Ordering::Acquire),
        )
    }

    #[inline]
    fn slot(&self, pos: u64) -> &Slot {
        &self.slots[(pos & self.mask) as usize]
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("padding_threshold", &self.padding_threshold)
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}
