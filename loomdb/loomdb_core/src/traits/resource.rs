//! Pooled resource trait.

use crate::error::Result;

/// A scarce resource that can be held in a fixed-capacity pool.
///
/// The pool never destroys a resource a caller hands back; it only calls
/// `close` when the pool itself is closed, or when a resource is returned to
/// a pool that no longer accepts it.
pub trait Resource: Send + 'static {
    /// Release the underlying resource.
    fn close(&mut self) -> Result<()>;
}
