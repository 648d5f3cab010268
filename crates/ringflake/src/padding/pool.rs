//! Fixed-size thread pool running asynchronous padding passes.
//!
//! Each worker owns a bounded channel with room for a single request. Work is
//! handed out round-robin with a non-blocking send: when the chosen worker
//! already has a pass queued the new request is dropped, since the queued
//! pass (and the single-flight guard around padding) makes it redundant.

use core::time::Duration;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};

use crate::{Error, Result};

/// How long shutdown waits on each worker, for both the send and the ack.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) enum WorkRequest {
    /// Run one padding pass.
    Pad,
    /// Stop after acknowledging on `response`.
    Shutdown { response: Sender<()> },
}

pub(crate) struct WorkerPool {
    workers: Vec<Sender<WorkRequest>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_worker: AtomicUsize,
}

impl WorkerPool {
    /// Spawns `size` workers, each calling `task` once per [`WorkRequest::Pad`].
    pub(crate) fn spawn<F>(size: usize, task: F) -> Result<Self>
    where
        F: Fn() + Clone + Send + 'static,
    {
        let mut workers = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);

        for worker_id in 0..size {
            let (tx, rx) = bounded(1);
            let task = task.clone();
            let handle = thread::Builder::new()
                .name(format!("ringflake-padding-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &rx, &task))
                .map_err(|e| Error::ThreadSpawn {
                    context: format!("padding worker {worker_id}"),
                    reason: e.to_string(),
                })?;
            workers.push(tx);
            handles.push(handle);
        }

        Ok(Self {
            workers,
            handles: Mutex::new(handles),
            next_worker: AtomicUsize::new(0),
        })
    }

    pub(crate) fn size(&self) -> usize {
        self.workers.len()
    }

    fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Queues a padding pass on the next worker without blocking.
    ///
    /// Returns `false` if the request was dropped.
    pub(crate) fn dispatch(&self) -> bool {
        let worker_idx = self.next_worker_index();
        match self.workers[worker_idx].try_send(WorkRequest::Pad) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Padding worker {worker_idx} is busy, dropping request");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Padding worker {worker_idx} channel closed");
                false
            }
        }
    }

    /// Stops every worker and joins the ones that acknowledged in time.
    ///
    /// A worker still busy after [`SHUTDOWN_TIMEOUT`] is detached.
    pub(crate) fn shutdown(&self) {
        let mut acks = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = bounded(1);
            match worker.send_timeout(WorkRequest::Shutdown { response: tx }, SHUTDOWN_TIMEOUT) {
                Ok(()) => acks.push((i, rx)),
                Err(e) => tracing::error!("Failed to send shutdown to padding worker {i}: {e}"),
            }
        }

        let mut handles = self.handles.lock();
        let mut acked = vec![false; handles.len()];
        for (i, rx) in acks {
            match rx.recv_timeout(SHUTDOWN_TIMEOUT) {
                Ok(()) => {
                    tracing::trace!("Padding worker {i} shutdown acknowledged");
                    acked[i] = true;
                }
                Err(_) => tracing::warn!("Padding worker {i} shutdown timed out"),
            }
        }

        for (i, handle) in handles.drain(..).enumerate() {
            if acked[i] && handle.join().is_err() {
                tracing::error!("Padding worker {i} panicked");
            }
        }
    }
}

fn worker_loop<F: Fn()>(worker_id: usize, rx: &Receiver<WorkRequest>, task: &F) {
    tracing::trace!("Padding worker {worker_id} started");

    while let Ok(work) = rx.recv() {
        match work {
            WorkRequest::Pad => task(),
            WorkRequest::Shutdown { response } => {
                tracing::debug!("Padding worker {worker_id} received shutdown signal");
                if response.send(()).is_err() {
                    tracing::error!("Padding worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Padding worker {worker_id} stopped");
}
