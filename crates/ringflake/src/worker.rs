use crate::Result;

/// Hands out the worker id a generator embeds in every identifier.
///
/// Called exactly once, when a generator is constructed. Production
/// implementations persist a registration in durable storage and return a
/// cluster-unique small integer. The generator only requires that the value
/// fits in the layout's worker-id field.
pub trait WorkerIdAssigner {
    /// Returns the worker id for this process.
    ///
    /// # Errors
    ///
    /// Implementations return [`Error::WorkerAssignment`] when their backend
    /// cannot register the worker.
    ///
    /// [`Error::WorkerAssignment`]: crate::Error::WorkerAssignment
    fn assign_worker_id(&self) -> Result<u64>;
}

impl<A: WorkerIdAssigner + ?Sized> WorkerIdAssigner for &A {
    fn assign_worker_id(&self) -> Result<u64> {
        (**self).assign_worker_id()
    }
}

impl<A: WorkerIdAssigner + ?Sized> WorkerIdAssigner for Box<A> {
    fn assign_worker_id(&self) -> Result<u64> {
        (**self).assign_worker_id()
    }
}

/// Always assigns the same, externally coordinated worker id.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StaticWorkerIdAssigner(pub u64);

impl WorkerIdAssigner for StaticWorkerIdAssigner {
    fn assign_worker_id(&self) -> Result<u64> {
        Ok(self.0)
    }
}
