//! Error types for UID generation.
//!
//! Construction-time variants (`ConfigInvalid`, `WorkerIdOutOfRange`,
//! `WorkerAssignment`) abort startup. Clock variants are surfaced to the
//! immediate caller and never swallowed. `BufferExhausted` is the only error
//! expected under sustained load and is safe to retry.

/// A result type defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `ringflake` can produce.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The bit layout or another configuration value is unusable.
    #[error("invalid configuration: {reason}")]
    ConfigInvalid {
        /// Human readable description of the rejected value.
        reason: String,
    },

    /// The assigned worker id does not fit in the worker-id field.
    #[error("worker id {worker_id} exceeds the max {max_worker_id}")]
    WorkerIdOutOfRange {
        /// The id returned by the assigner.
        worker_id: u64,
        /// Largest id the layout can encode.
        max_worker_id: u64,
    },

    /// The worker id assigner could not produce an id.
    #[error("worker id assignment failed: {reason}")]
    WorkerAssignment {
        /// Underlying failure, usually from the registry backend.
        reason: String,
    },

    /// The wall clock regressed relative to the last issued second.
    ///
    /// No id was produced. Retrying once the clock has caught up is safe.
    #[error("clock moved backwards, refusing for {seconds} seconds")]
    ClockMovedBackward {
        /// How many seconds the clock regressed.
        seconds: u64,
    },

    /// The timestamp field can no longer represent the current second.
    ///
    /// This is unrecoverable for the configured epoch.
    #[error("timestamp bits exhausted at second {second} (max delta {max_delta_seconds})")]
    TimestampExhausted {
        /// The unix second that could not be encoded.
        second: i64,
        /// Largest delta the layout can encode.
        max_delta_seconds: u64,
    },

    /// The requested second precedes the configured epoch.
    #[error("second {second} is before the epoch {epoch_seconds}")]
    BeforeEpoch {
        /// The unix second that was requested.
        second: i64,
        /// The configured epoch, in unix seconds.
        epoch_seconds: i64,
    },

    /// The ring buffer had no ready id. A refill has been scheduled.
    #[error("ring buffer exhausted, no UID ready")]
    BufferExhausted,

    /// A padding worker or ticker thread could not be started.
    #[error("failed to spawn {context}: {reason}")]
    ThreadSpawn {
        /// Which thread was being started.
        context: String,
        /// The OS error.
        reason: String,
    },
}

impl Error {
    /// Returns `true` if the caller may retry the same operation later.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BufferExhausted | Self::ClockMovedBackward { .. })
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
        }
    }
}
