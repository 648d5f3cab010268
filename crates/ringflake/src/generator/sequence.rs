use core::time::Duration;
use std::thread;

use parking_lot::Mutex;
use tracing::instrument;

use crate::{BitLayout, Error, Result, TimeSource, UidParts, UidProvider, WorkerIdAssigner};

/// Polls spent yielding before the rollover wait starts sleeping.
const ROLLOVER_SPIN_LIMIT: u32 = 64;

/// Sleep between clock polls once the spin budget is spent.
const ROLLOVER_BACKOFF: Duration = Duration::from_millis(1);

/// Mutable generation state. Only ever touched behind the [`Mutex`].
#[derive(Debug)]
struct GeneratorState {
    /// Last second an id was issued for. `-1` until the first id.
    last_second: i64,
    /// Sequence issued within `last_second`.
    sequence: u64,
}

/// A clock-driven, per-second sequence generator bound to one worker id.
///
/// Each call to [`Self::next_id`] reads the current second from the
/// [`TimeSource`] and either bumps the in-second sequence or starts a new
/// second at sequence zero. The state lives behind a single [`Mutex`], so the
/// generator is safe to share across threads.
///
/// For pre-generation, [`Self::next_batch_for_second`] derives a full second of
/// ids arithmetically without reading the clock or touching that state.
///
/// ## Recommended When
/// - You need ids directly from the clock (no cache), or
/// - You are feeding a [`PaddingExecutor`] through [`UidProvider`]
///
/// ## See Also
/// - [`CachedUidGenerator`]
///
/// [`PaddingExecutor`]: crate::PaddingExecutor
/// [`CachedUidGenerator`]: crate::CachedUidGenerator
#[derive(Debug)]
pub struct SequenceClock<T>
where
    T: TimeSource,
{
    layout: BitLayout,
    epoch_seconds: i64,
    worker_id: u64,
    state: Mutex<GeneratorState>,
    time: T,
}

impl<T> SequenceClock<T>
where
    T: TimeSource,
{
    /// Creates a generator whose worker id comes from `assigner`.
    ///
    /// # Errors
    ///
    /// - Whatever the assigner returns.
    /// - [`Error::WorkerIdOutOfRange`] if the id does not fit the layout.
    pub fn new<A>(layout: BitLayout, epoch_seconds: i64, assigner: &A, time: T) -> Result<Self>
    where
        A: WorkerIdAssigner + ?Sized,
    {
        let worker_id = assigner.assign_worker_id()?;
        Self::with_worker_id(layout, epoch_seconds, worker_id, time)
    }

    /// Creates a generator for an already known worker id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerIdOutOfRange`] if `worker_id` exceeds
    /// [`BitLayout::max_worker_id`].
    pub fn with_worker_id(
        layout: BitLayout,
        epoch_seconds: i64,
        worker_id: u64,
        time: T,
    ) -> Result<Self> {
        if worker_id > layout.max_worker_id() {
            tracing::error!(
                "Worker id {} exceeds the max {}",
                worker_id,
                layout.max_worker_id()
            );
            return Err(Error::WorkerIdOutOfRange {
                worker_id,
                max_worker_id: layout.max_worker_id(),
            });
        }

        tracing::info!(
            "Initialized bits(1, {}, {}, {}) for worker id {}",
            layout.timestamp_bits(),
            layout.worker_id_bits(),
            layout.sequence_bits(),
            worker_id
        );

        Ok(Self {
            layout,
            epoch_seconds,
            worker_id,
            state: Mutex::new(GeneratorState {
                last_second: -1,
                sequence: 0,
            }),
            time,
        })
    }

    /// Generates the next id from the live clock.
    ///
    /// Within one second the sequence increases by one per call. When the
    /// sequence space of the current second is used up, the call waits for the
    /// clock to reach the next second (yielding, then sleeping 1 ms per poll).
    ///
    /// # Errors
    ///
    /// - [`Error::ClockMovedBackward`] if the clock reads earlier than the
    ///   last issued second. The state is left untouched and no id is issued.
    /// - [`Error::TimestampExhausted`] / [`Error::BeforeEpoch`] if the current
    ///   second cannot be encoded.
    ///
    /// # Example
    ///
    /// ```
    /// use ringflake::{BitLayout, SequenceClock, SystemClock, CUSTOM_EPOCH};
    ///
    /// let clock = SequenceClock::with_worker_id(
    ///     BitLayout::default(),
    ///     CUSTOM_EPOCH.as_secs() as i64,
    ///     1,
    ///     SystemClock,
    /// )
    /// .unwrap();
    ///
    /// let a = clock.next_id().unwrap();
    /// let b = clock.next_id().unwrap();
    /// assert!(a < b);
    /// ```
    #[instrument(level = "trace", skip(self))]
    pub fn next_id(&self) -> Result<u64> {
        let mut state = self.state.lock();
        let current = self.current_second()?;

        if current < state.last_second {
            return Err(Self::cold_clock_behind(current, state.last_second));
        }

        let (second, sequence) = if current == state.last_second {
            let next = (state.sequence + 1) & self.layout.max_sequence();
            if next == 0 {
                (self.wait_next_second(state.last_second)?, 0)
            } else {
                (current, next)
            }
        } else {
            (current, 0)
        };

        state.last_second = second;
        state.sequence = sequence;

        Ok(self.encode_second(second, sequence))
    }

    /// Returns every id of `second`, sequence `0..=max_sequence`, in order.
    ///
    /// Pure arithmetic: neither the clock nor the generator state is consulted,
    /// so concurrent calls are safe and always agree.
    ///
    /// # Errors
    ///
    /// [`Error::TimestampExhausted`] / [`Error::BeforeEpoch`] if `second` is
    /// outside the layout's range.
    pub fn next_batch_for_second(&self, second: i64) -> Result<Vec<u64>> {
        self.check_second(second)?;

        // Sequence is the low field, so the rest of the second is an offset
        // from the first id.
        let first = self.encode_second(second, 0);
        Ok((0..self.layout.ids_per_second())
            .map(|offset| first + offset)
            .collect())
    }

    /// Decodes an id produced under this generator's layout and epoch.
    pub fn parse(&self, uid: u64) -> UidParts {
        let (delta_seconds, worker_id, sequence) = self.layout.decode(uid);
        UidParts {
            uid,
            timestamp: self.epoch_seconds + delta_seconds as i64,
            delta_seconds,
            worker_id,
            sequence,
        }
    }

    /// Reads the clock and checks that the second is encodable.
    ///
    /// # Errors
    ///
    /// [`Error::TimestampExhausted`] / [`Error::BeforeEpoch`].
    pub fn current_second(&self) -> Result<i64> {
        let second = self.time.current_second();
        self.check_second(second)?;
        Ok(second)
    }

    pub const fn layout(&self) -> &BitLayout {
        &self.layout
    }

    pub const fn worker_id(&self) -> u64 {
        self.worker_id
    }

    pub const fn epoch_seconds(&self) -> i64 {
        self.epoch_seconds
    }

    /// The last second [`Self::next_id`] issued an id for, `-1` if none yet.
    pub fn last_second(&self) -> i64 {
        self.state.lock().last_second
    }

    fn check_second(&self, second: i64) -> Result<()> {
        if second < self.epoch_seconds {
            return Err(Error::BeforeEpoch {
                second,
                epoch_seconds: self.epoch_seconds,
            });
        }

        let delta = (second - self.epoch_seconds) as u64;
        if delta > self.layout.max_delta_seconds() {
            tracing::error!(
                "Timestamp bits is exhausted. Refusing UID generate. Now: {}",
                second
            );
            return Err(Error::TimestampExhausted {
                second,
                max_delta_seconds: self.layout.max_delta_seconds(),
            });
        }

        Ok(())
    }

    fn encode_second(&self, second: i64, sequence: u64) -> u64 {
        let delta = (second - self.epoch_seconds) as u64;
        self.layout.encode(delta, self.worker_id, sequence)
    }

    fn wait_next_second(&self, last_second: i64) -> Result<i64> {
        let mut polls = 0u32;
        loop {
            let now = self.current_second()?;
            if now > last_second {
                return Ok(now);
            }
            if now < last_second {
                return Err(Self::cold_clock_behind(now, last_second));
            }

            if polls < ROLLOVER_SPIN_LIMIT {
                polls += 1;
                thread::yield_now();
            } else {
                thread::sleep(ROLLOVER_BACKOFF);
            }
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(now: i64, last_second: i64) -> Error {
        let seconds = (last_second - now) as u64;
        tracing::error!("Clock moved backwards. Refusing for {} seconds", seconds);
        Error::ClockMovedBackward { seconds }
    }
}

impl<T> UidProvider for SequenceClock<T>
where
    T: TimeSource,
{
    fn provide(&self, second: i64) -> Result<Vec<u64>> {
        self.next_batch_for_second(second)
    }
}
