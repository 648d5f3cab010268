use core::time::Duration;
use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::{
    BitLayout, Error, PaddingExecutor, Result, RingBuffer, SequenceClock, TimeSource, UidConfig,
    UidParts, WorkerIdAssigner,
};

/// Point-in-time view of the cache, for administrative inspection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub capacity: usize,
    /// Ids ready to be handed out.
    pub len: usize,
    /// Fill level below which a take schedules a refill.
    pub padding_threshold: usize,
    /// The most recent second whose ids were pre-generated.
    pub last_padded_second: i64,
}

/// A UID generator serving ids from a pre-filled [`RingBuffer`].
///
/// At construction a whole second's worth of ids is derived at a time from a
/// [`SequenceClock`] and pushed into the ring until it is full. Afterwards
/// [`Self::get_uid`] only pops from the ring. Whenever the fill level drops
/// below the padding threshold a refill is queued on a background worker, and
/// a ticker refills on a fixed schedule as a safety net.
///
/// Ids are issued for seconds starting right after construction and advance
/// one second per padded batch, so under sustained load the embedded
/// timestamps run ahead of the wall clock.
///
/// ## Recommended When
/// - Callers need predictable, lock-light latency per id
/// - Bursts may exceed one second of sequence space
///
/// ## See Also
/// - [`SequenceClock`] for generation straight from the clock
///
/// Dropping the generator shuts down its background threads.
pub struct CachedUidGenerator<T>
where
    T: TimeSource + Send + Sync + 'static,
{
    clock: Arc<SequenceClock<T>>,
    ring: Arc<RingBuffer>,
    executor: PaddingExecutor<Arc<SequenceClock<T>>>,
}

impl<T> CachedUidGenerator<T>
where
    T: TimeSource + Send + Sync + 'static,
{
    /// Builds the generator and fills its ring before returning.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigInvalid`] if `config` does not validate.
    /// - Whatever `assigner` returns, or [`Error::WorkerIdOutOfRange`].
    /// - Clock errors from the initial padding pass.
    /// - [`Error::ThreadSpawn`] if background threads cannot be started.
    ///
    /// # Example
    ///
    /// ```
    /// use ringflake::{CachedUidGenerator, StaticWorkerIdAssigner, SystemClock, UidConfig};
    ///
    /// let config = UidConfig::default().with_boost_power(0);
    /// let generator =
    ///     CachedUidGenerator::new(&config, &StaticWorkerIdAssigner(7), SystemClock).unwrap();
    ///
    /// let uid = generator.get_uid().unwrap();
    /// assert_eq!(generator.parse(uid).worker_id, 7);
    /// ```
    pub fn new<A>(config: &UidConfig, assigner: &A, time: T) -> Result<Self>
    where
        A: WorkerIdAssigner + ?Sized,
    {
        config.validate()?;

        let clock = Arc::new(SequenceClock::new(
            config.layout()?,
            config.epoch_seconds,
            assigner,
            time,
        )?);
        let ring = Arc::new(RingBuffer::new(
            config.buffer_size()?,
            config.padding_threshold_percent,
        )?);
        let executor = PaddingExecutor::new(
            Arc::clone(&clock),
            Arc::clone(&ring),
            clock.current_second()?,
            config.padding_workers,
            Duration::from_secs(config.schedule_interval_seconds),
        )?;

        executor.trigger_padding_buffer()?;
        executor.start()?;

        tracing::info!(
            "Initialized CachedUidGenerator for worker id {} with {} of {} ids ready",
            clock.worker_id(),
            ring.len(),
            ring.capacity()
        );

        Ok(Self {
            clock,
            ring,
            executor,
        })
    }

    /// Hands out the next pre-generated id.
    ///
    /// Never blocks. Schedules a background refill when the ring runs low.
    ///
    /// # Errors
    ///
    /// - [`Error::BufferExhausted`] if no id is ready. A refill has already
    ///   been scheduled, so retrying shortly is expected to succeed.
    /// - The error that stopped padding for good, once the ring is drained.
    ///   Typically [`Error::TimestampExhausted`] when the epoch's timestamp
    ///   budget is spent. Retrying will not help.
    #[instrument(level = "trace", skip(self))]
    pub fn get_uid(&self) -> Result<u64> {
        match self.ring.take() {
            Some(uid) => {
                if self.ring.len() < self.ring.padding_threshold() {
                    self.executor.trigger_async_padding();
                }
                Ok(uid)
            }
            None => {
                if let Some(e) = self.executor.fatal_error() {
                    return Err(e);
                }
                self.executor.trigger_async_padding();
                Err(Error::BufferExhausted)
            }
        }
    }

    /// Renders the fields of `uid` as a JSON diagnostic record.
    pub fn parse_uid(&self, uid: u64) -> String {
        self.parse(uid).to_json()
    }

    pub fn parse(&self, uid: u64) -> UidParts {
        self.clock.parse(uid)
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            capacity: self.ring.capacity(),
            len: self.ring.len(),
            padding_threshold: self.ring.padding_threshold(),
            last_padded_second: self.executor.last_padded_second(),
        }
    }

    pub fn worker_id(&self) -> u64 {
        self.clock.worker_id()
    }

    pub fn layout(&self) -> &BitLayout {
        self.clock.layout()
    }

    /// Stops scheduled and asynchronous padding. Ids already in the ring can
    /// still be taken. Safe to call more than once.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}
