//! Fork scope trait definitions.
//!
//! A fork scope is a structured join barrier: work forked into it may fork
//! more work, and closing the scope blocks until all of it has finished.
//!
//! # Concurrency Model
//!
//! - Tasks are failable closures run on an execution substrate (a bounded
//!   worker pool or one lightweight thread per task)
//! - No ordering is guaranteed between sibling tasks
//! - `close` is the single place where the aggregate outcome of a fan-out
//!   becomes visible
//! - There is no cancellation: once forked, a task runs to completion

use crate::error::Result;

/// A unit of work submitted to a fork scope.
pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Core trait for structured fan-out execution.
///
/// Both execution substrates and the scopes layered on top of them implement
/// this trait, so a child scope can be opened under any of them.
///
/// # Examples
///
/// ```
/// use loomdb_core::error::Result;
/// use loomdb_core::traits::concurrency::{ForkScope, Task};
///
/// struct InlineScope;
///
/// impl ForkScope for InlineScope {
///     fn fork(&self, task: Task) -> Result<()> {
///         task()
///     }
///
///     fn close(&self) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait ForkScope: Send + Sync {
    /// Schedule a task for concurrent execution.
    ///
    /// Callable from any thread, including from inside a task previously
    /// forked into the same scope.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the task was handed to the substrate.
    /// * `Err(Error)` if the substrate rejected it.
    fn fork(&self, task: Task) -> Result<()>;

    /// Stop contributing to the scope and wait for everything forked into it.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if every task completed successfully.
    /// * `Err(Error)` with the first recorded failure otherwise.
    fn close(&self) -> Result<()>;
}

/// Convenience methods for any fork scope.
pub trait ForkScopeExt: ForkScope {
    /// Fork a closure without boxing it at the call site.
    fn spawn<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.fork(Box::new(task))
    }
}

impl<T: ForkScope + ?Sized> ForkScopeExt for T {}

impl<T: ForkScope + ?Sized> ForkScope for std::sync::Arc<T> {
    fn fork(&self, task: Task) -> Result<()> {
        (**self).fork(task)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}
