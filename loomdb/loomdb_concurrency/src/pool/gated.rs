//! Semaphore-gated access to a fixed pool.
//!
//! `FixedPool` rejects callers beyond its capacity instead of queueing them.
//! `GatedPool` pairs it with a semaphore of the same size so that excess
//! callers block until a resource comes back.

use log::trace;

use loomdb_core::error::Result;
use loomdb_core::traits::Resource;

use super::fixed::FixedPool;
use crate::sync::Semaphore;

/// A fixed pool whose acquisitions wait for a free slot
pub struct GatedPool<R: Resource> {
    gate: Semaphore,
    pool: FixedPool<R>,
}

impl<R: Resource> GatedPool<R> {
    /// Create a gated pool of `capacity` lazily created resources.
    pub fn new<F>(capacity: usize, factory: F) -> Result<Self>
    where
        F: Fn() -> Result<R> + Send + Sync + 'static,
    {
        let pool = FixedPool::new(capacity, factory)?;
        Ok(Self {
            gate: Semaphore::new(capacity),
            pool,
        })
    }

    /// Run `f` with exclusive use of one pooled resource.
    ///
    /// Blocks while all resources are in use. The resource goes back to the
    /// pool before the permit is released, so a waiter woken by the permit
    /// always finds a free slot.
    pub fn with_resource<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut R) -> Result<T>,
    {
        let _permit = self.gate.acquire();
        trace!(
            "Gate passed ({} permits left)",
            self.gate.available_permits()
        );

        let mut handle = self.pool.acquire()?;
        let outcome = f(&mut *handle);
        let returned = handle.close();

        let value = outcome?;
        returned?;
        Ok(value)
    }

    /// Close the underlying pool
    pub fn close(&self) -> Result<()> {
        self.pool.close()
    }

    /// The underlying fixed pool
    pub fn pool(&self) -> &FixedPool<R> {
        &self.pool
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }
}
