use core::time::Duration;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded, select, tick};
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::instrument;

use super::pool::WorkerPool;
use crate::{Error, Result, RingBuffer, UidProvider};

/// What a call to [`PaddingExecutor::trigger_padding_buffer`] did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PaddingOutcome {
    /// Another pass was already running, nothing was done.
    Skipped,
    /// A pass ran and stopped once the ring was full.
    Padded {
        /// Seconds drawn from the provider.
        seconds: u64,
        /// Ids accepted by the ring.
        ids: usize,
    },
}

/// Keeps a [`RingBuffer`] full of ids drawn from a [`UidProvider`].
///
/// Padding happens in passes. A pass asks the provider for the second after
/// the last padded one and puts its ids in order, repeating until a put is
/// rejected. Only one pass runs at a time; a pass requested while another is
/// active is skipped.
///
/// A provider error that cannot clear on retry (see [`Error::is_retryable`])
/// is kept. Every later pass returns it without asking the provider again,
/// and [`Self::fatal_error`] reports it.
///
/// Passes are started three ways:
/// - synchronously via [`Self::trigger_padding_buffer`],
/// - on a worker pool via [`Self::trigger_async_padding`],
/// - by a ticker every `schedule_interval` once [`Self::start`] is called.
///
/// Dropping the executor shuts it down.
pub struct PaddingExecutor<P>
where
    P: UidProvider + Send + Sync + 'static,
{
    padder: Arc<Padder<P>>,
    pool: WorkerPool,
    schedule_interval: Duration,
    ticker: Mutex<Option<Ticker>>,
    shut_down: AtomicBool,
}

struct Padder<P> {
    provider: P,
    ring: Arc<RingBuffer>,
    running: AtomicBool,
    last_padded_second: AtomicI64,
    fatal: Mutex<Option<Error>>,
}

struct Ticker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Clears the `running` flag however the pass ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P> Padder<P>
where
    P: UidProvider,
{
    fn pad(&self) -> Result<PaddingOutcome> {
        if let Some(e) = self.fatal.lock().clone() {
            return Err(e);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Padding buffer is still running");
            return Ok(PaddingOutcome::Skipped);
        }
        let _guard = RunningGuard(&self.running);

        tracing::debug!(
            "Ready to pad buffer lastSecond: {}",
            self.last_padded_second.load(Ordering::Relaxed)
        );
        let mut seconds = 0;
        let mut ids = 0;
        'pass: while self.ring.remaining_capacity() > 0 {
            let second = self.last_padded_second.load(Ordering::Acquire) + 1;
            let batch = self.provider.provide(second).inspect_err(|e| {
                tracing::error!("Padding stopped at second {second}: {e}");
                if !e.is_retryable() {
                    *self.fatal.lock() = Some(e.clone());
                }
            })?;
            // The second is spent even if only part of it fits, so its ids
            // can never be put twice.
            self.last_padded_second.store(second, Ordering::Release);
            seconds += 1;

            for uid in batch {
                if !self.ring.put(uid) {
                    break 'pass;
                }
                ids += 1;
            }
        }

        tracing::debug!(
            "End to pad buffer lastSecond: {}, {} ids over {} seconds",
            self.last_padded_second.load(Ordering::Relaxed),
            ids,
            seconds
        );
        Ok(PaddingOutcome::Padded { seconds, ids })
    }
}

impl<P> PaddingExecutor<P>
where
    P: UidProvider + Send + Sync + 'static,
{
    /// Builds the executor and spawns its worker pool.
    ///
    /// The first pass pads `last_padded_second + 1`. The ticker is not
    /// running until [`Self::start`] is called; a zero `schedule_interval`
    /// disables it entirely.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigInvalid`] if `workers` is zero.
    /// - [`Error::ThreadSpawn`] if a worker thread cannot be started.
    pub fn new(
        provider: P,
        ring: Arc<RingBuffer>,
        last_padded_second: i64,
        workers: usize,
        schedule_interval: Duration,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(Error::config("padding workers must be greater than 0"));
        }

        let padder = Arc::new(Padder {
            provider,
            ring,
            running: AtomicBool::new(false),
            last_padded_second: AtomicI64::new(last_padded_second),
            fatal: Mutex::new(None),
        });

        let task = {
            let padder = Arc::clone(&padder);
            move || {
                // Failures are logged by the pass and fatal ones are kept for
                // `fatal_error`.
                let _ = padder.pad();
            }
        };
        let pool = WorkerPool::spawn(workers, task)?;

        Ok(Self {
            padder,
            pool,
            schedule_interval,
            ticker: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Starts the scheduled padding ticker. No-op when the interval is zero or
    /// the ticker already runs.
    ///
    /// # Errors
    ///
    /// [`Error::ThreadSpawn`] if the ticker thread cannot be started.
    pub fn start(&self) -> Result<()> {
        if self.schedule_interval.is_zero() || self.shut_down.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return Ok(());
        }

        let (stop, stopped) = bounded::<()>(0);
        let padder = Arc::clone(&self.padder);
        let interval = self.schedule_interval;
        let handle = thread::Builder::new()
            .name("ringflake-padding-ticker".to_string())
            .spawn(move || {
                let ticks = tick(interval);
                loop {
                    select! {
                        recv(ticks) -> _ => {
                            let _ = padder.pad();
                        }
                        recv(stopped) -> _ => break,
                    }
                }
            })
            .map_err(|e| Error::ThreadSpawn {
                context: "padding ticker".to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Scheduled padding every {:?}", interval);
        *ticker = Some(Ticker { stop, handle });
        Ok(())
    }

    /// Runs one padding pass on the calling thread.
    ///
    /// # Errors
    ///
    /// Whatever the provider returns. The single-flight flag is cleared
    /// either way.
    #[instrument(level = "trace", skip(self))]
    pub fn trigger_padding_buffer(&self) -> Result<PaddingOutcome> {
        self.padder.pad()
    }

    /// Queues a padding pass on the worker pool and returns immediately.
    pub fn trigger_async_padding(&self) {
        if self.shut_down.load(Ordering::Acquire) {
            tracing::debug!("Padding executor is shut down, ignoring request");
            return;
        }
        if self.padder.fatal.lock().is_some() {
            return;
        }
        self.pool.dispatch();
    }

    /// The last second whose ids went into the ring.
    pub fn last_padded_second(&self) -> i64 {
        self.padder.last_padded_second.load(Ordering::Acquire)
    }

    /// The unrecoverable provider error that stopped padding, if any.
    pub fn fatal_error(&self) -> Option<Error> {
        self.padder.fatal.lock().clone()
    }

    /// `true` while a pass is in progress.
    pub fn is_running(&self) -> bool {
        self.padder.running.load(Ordering::Acquire)
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    pub const fn schedule_interval(&self) -> Duration {
        self.schedule_interval
    }

    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.padder.ring
    }

    /// Stops the ticker, then the worker pool. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(Ticker { stop, handle }) = self.ticker.lock().take() {
            drop(stop);
            if handle.join().is_err() {
                tracing::error!("Padding ticker panicked");
            }
        }

        self.pool.shutdown();
        tracing::info!("Padding executor shut down");
    }
}

impl<P> Drop for PaddingExecutor<P>
where
    P: UidProvider + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
