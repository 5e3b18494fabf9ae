//! Fixed-capacity pool for scarce resources like database connections.
//!
//! The pool preallocates `capacity` empty slots and a cursor. Slots below the
//! cursor are checked out; slots at or above it hold an idle resource or
//! nothing yet (resources are created lazily on first use). The slot array
//! and cursor are only touched under one short-held lock; creating and
//! closing resources always happens outside of it.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use loomdb_core::error::{Error, PoolError, Result};
use loomdb_core::traits::Resource;

/// Factory invoked (outside the pool lock) for every empty slot handed out
pub type ResourceFactory<R> = Box<dyn Fn() -> Result<R> + Send + Sync>;

/// Position of the next free slot, or closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Open(usize),
    Closed,
}

struct Slots<R> {
    slots: Vec<Option<R>>,
    cursor: Cursor,
}

struct PoolInner<R: Resource> {
    slots: Mutex<Slots<R>>,
    factory: ResourceFactory<R>,
    capacity: usize,
}

/// A pool handing out at most `capacity` resources at a time.
///
/// Cloning the pool yields another handle to the same slots.
pub struct FixedPool<R: Resource> {
    inner: Arc<PoolInner<R>>,
}

impl<R: Resource> Clone for FixedPool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> FixedPool<R> {
    /// Create a pool of `capacity` empty slots.
    pub fn new<F>(capacity: usize, factory: F) -> Result<Self>
    where
        F: Fn() -> Result<R> + Send + Sync + 'static,
    {
        if capacity == 0 {
            return Err(PoolError::InvalidCapacity(capacity).into());
        }

        info!("Creating fixed resource pool with capacity {}", capacity);

        let slots = std::iter::repeat_with(|| None).take(capacity).collect();
        Ok(Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(Slots {
                    slots,
                    cursor: Cursor::Open(0),
                }),
                factory: Box::new(factory),
                capacity,
            }),
        })
    }

    /// Check out one resource.
    ///
    /// Fails with `PoolError::CapacityExceeded` when `capacity` resources are
    /// already out; callers are expected to gate acquisition themselves, so
    /// this signals a usage error rather than a transient condition.
    pub fn acquire(&self) -> Result<PooledResource<R>> {
        let idle = {
            let mut state = self.inner.slots.lock();
            let index = match state.cursor {
                Cursor::Closed => return Err(PoolError::Closed.into()),
                Cursor::Open(index) if index >= self.inner.capacity => {
                    return Err(PoolError::CapacityExceeded {
                        capacity: self.inner.capacity,
                    }
                    .into())
                }
                Cursor::Open(index) => index,
            };
            state.cursor = Cursor::Open(index + 1);
            state.slots[index].take()
        };

        let resource = match idle {
            Some(resource) => {
                trace!("Reusing idle resource");
                resource
            }
            None => {
                // Frees the slot again if the factory fails or panics
                let reservation = SlotReservation {
                    pool: &*self.inner,
                    armed: true,
                };
                let resource = (self.inner.factory)().map_err(|e| {
                    warn!("Failed to create pooled resource: {}", e);
                    e
                })?;
                reservation.disarm();
                debug!("Created new pooled resource");
                resource
            }
        };

        Ok(PooledResource {
            resource: Some(resource),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Close the pool and every idle resource it holds.
    ///
    /// Resources still checked out are not touched; returning them later
    /// closes them and reports `PoolError::Closed`. Closing twice is a no-op.
    /// Every idle resource is closed even if an earlier one fails; the first
    /// failure is returned.
    pub fn close(&self) -> Result<()> {
        let to_close: Vec<R> = {
            let mut state = self.inner.slots.lock();
            if state.cursor == Cursor::Closed {
                return Ok(());
            }
            state.cursor = Cursor::Closed;
            state.slots.iter_mut().filter_map(Option::take).collect()
        };

        info!("Closing fixed resource pool ({} idle resources)", to_close.len());
        close_all(to_close)
    }

    /// Fixed capacity of the pool
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of resources currently checked out
    pub fn outstanding(&self) -> usize {
        match self.inner.slots.lock().cursor {
            Cursor::Open(index) => index,
            Cursor::Closed => 0,
        }
    }

    /// Number of created resources waiting in the pool
    pub fn idle_count(&self) -> usize {
        self.inner
            .slots
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Whether the pool has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.slots.lock().cursor == Cursor::Closed
    }
}

impl<R: Resource> PoolInner<R> {
    /// Store `resource` into the most recently checked-out slot.
    ///
    /// On failure the resource is handed back to the caller so it can be
    /// closed outside the lock.
    fn put_back(&self, resource: Option<R>) -> std::result::Result<(), (PoolError, Option<R>)> {
        let mut state = self.slots.lock();
        match state.cursor {
            Cursor::Closed => Err((PoolError::Closed, resource)),
            Cursor::Open(0) => Err((PoolError::TooManyReturned, resource)),
            Cursor::Open(index) => {
                let slot = index - 1;
                state.slots[slot] = resource;
                state.cursor = Cursor::Open(slot);
                Ok(())
            }
        }
    }

    fn return_resource(&self, resource: R) -> Result<()> {
        match self.put_back(Some(resource)) {
            Ok(()) => Ok(()),
            Err((error, resource)) => {
                if let Some(mut resource) = resource {
                    if let Err(e) = resource.close() {
                        warn!("Failed to close resource rejected by the pool: {}", e);
                    }
                }
                Err(error.into())
            }
        }
    }
}

impl<R: Resource> Drop for PoolInner<R> {
    fn drop(&mut self) {
        let state = self.slots.get_mut();
        let leftovers: Vec<R> = state.slots.iter_mut().filter_map(Option::take).collect();
        if !leftovers.is_empty() {
            debug!("Closing {} idle resources of a dropped pool", leftovers.len());
            if let Err(e) = close_all(leftovers) {
                warn!("Failed to close idle resource: {}", e);
            }
        }
    }
}

/// A checked-out slot whose resource is still being created
struct SlotReservation<'a, R: Resource> {
    pool: &'a PoolInner<R>,
    armed: bool,
}

impl<R: Resource> SlotReservation<'_, R> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<R: Resource> Drop for SlotReservation<'_, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // The slot stays empty for the next caller
        if let Err((e, _)) = self.pool.put_back(None) {
            warn!("Failed to restore slot after creation failure: {}", e);
        }
    }
}

/// Close every resource, returning the first failure
fn close_all<R: Resource>(resources: Vec<R>) -> Result<()> {
    let mut first_error: Option<Error> = None;
    for mut resource in resources {
        if let Err(e) = resource.close() {
            match first_error {
                None => first_error = Some(e),
                Some(_) => warn!("Additional failure while closing resources: {}", e),
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// A resource checked out of a `FixedPool`.
///
/// Closing (explicitly or by dropping) returns the resource to the pool
/// instead of destroying it. Only the first close has an effect.
pub struct PooledResource<R: Resource> {
    resource: Option<R>,
    pool: Arc<PoolInner<R>>,
}

impl<R: Resource> PooledResource<R> {
    /// Return the resource to the pool.
    ///
    /// A second call is a no-op. If the pool was closed meanwhile, the
    /// resource is closed and `PoolError::Closed` is returned.
    pub fn close(&mut self) -> Result<()> {
        match self.resource.take() {
            Some(resource) => self.pool.return_resource(resource),
            None => Ok(()),
        }
    }

    /// Whether this handle has already been closed
    pub fn is_closed(&self) -> bool {
        self.resource.is_none()
    }

    /// Get a reference to the resource, unless the handle was closed
    pub fn get(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    /// Get a mutable reference to the resource, unless the handle was closed
    pub fn get_mut(&mut self) -> Option<&mut R> {
        self.resource.as_mut()
    }
}

impl<R: Resource> Deref for PooledResource<R> {
    type Target = R;

    /// Panics when used after `close`.
    fn deref(&self) -> &R {
        match self.resource.as_ref() {
            Some(resource) => resource,
            None => panic!("pooled resource used after close"),
        }
    }
}

impl<R: Resource> DerefMut for PooledResource<R> {
    fn deref_mut(&mut self) -> &mut R {
        match self.resource.as_mut() {
            Some(resource) => resource,
            None => panic!("pooled resource used after close"),
        }
    }
}

impl<R: Resource> Drop for PooledResource<R> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Pooled resource could not be returned: {}", e);
        }
    }
}
