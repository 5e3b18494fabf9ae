//! Nested join barrier.

use std::sync::Arc;

use log::{debug, trace, warn};

use loomdb_core::error::{ConcurrencyError, Error, Result};
use loomdb_core::traits::{ForkScope, Task};

use super::run_task;
use crate::sync::{AtomicFlag, FirstFailure, OutstandingCounter, WaitableSignal};

/// Bookkeeping shared by a child scope and every task forked through it
struct ScopeState {
    parent: Arc<dyn ForkScope>,
    outstanding: OutstandingCounter,
    done: WaitableSignal,
    failure: FirstFailure<Error>,
    released: AtomicFlag,
}

impl ScopeState {
    fn complete_one(&self) {
        if self.outstanding.decrement() {
            trace!("Child scope drained");
            self.done.signal();
        }
    }
}

/// A join barrier layered on a parent scope.
///
/// Every task forked into the child is wrapped and forked into the parent,
/// so the parent's accounting covers it too. Closing the child waits only
/// for the child's own tasks (and whatever they fork into it), then reports
/// the first failure among them.
///
/// The child holds a plain reference to its parent; the parent never sees
/// the child.
#[derive(Clone)]
pub struct ChildScope {
    state: Arc<ScopeState>,
}

impl ChildScope {
    /// Open a child scope under `parent`
    pub fn open(parent: Arc<dyn ForkScope>) -> Self {
        debug!("Opening child scope");
        Self {
            state: Arc::new(ScopeState {
                parent,
                outstanding: OutstandingCounter::new(),
                done: WaitableSignal::new(),
                failure: FirstFailure::new(),
                released: AtomicFlag::new(),
            }),
        }
    }

    /// Open a grandchild scope under this one
    pub fn open_child(&self) -> ChildScope {
        ChildScope::open(Arc::new(self.clone()))
    }

    /// Units not yet completed, including the scope's own until it is closed
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.get()
    }

    /// Whether a task failure has been captured
    pub fn has_failed(&self) -> bool {
        self.state.failure.is_recorded()
    }
}

impl ForkScope for ChildScope {
    /// Fork `task` into this scope and its parent.
    ///
    /// Must not be called after `close` has returned. Forking from a task of
    /// this scope, or from the owner before `close`, is always counted.
    /// A fork that races the final completion of a drained scope may run a
    /// task that nobody waits for; one made after draining is rejected with
    /// `ConcurrencyError::ShuttingDown`.
    fn fork(&self, task: Task) -> Result<()> {
        if self.state.done.is_signaled() {
            return Err(ConcurrencyError::ShuttingDown.into());
        }

        self.state.outstanding.increment();
        let completion = Completion::new(Arc::clone(&self.state));

        let wrapped: Task = Box::new(move || {
            completion.finish(run_task(task));
            Ok(())
        });

        // A rejected wrapper has already been dropped by the parent, which
        // released its count through `Completion`
        self.state.parent.fork(wrapped).map_err(|e| {
            warn!("Parent scope rejected a forked task: {}", e);
            e
        })
    }

    fn close(&self) -> Result<()> {
        if self.state.released.try_set() {
            self.state.complete_one();
        }

        self.state.done.wait();
        debug!("Child scope closed");

        match self.state.failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Releases one outstanding unit exactly once, when dropped.
///
/// A completion dropped without `finish` belongs to a task that never ran,
/// which is recorded as a failure.
struct Completion {
    state: Arc<ScopeState>,
    ran: bool,
}

impl Completion {
    fn new(state: Arc<ScopeState>) -> Self {
        Self { state, ran: false }
    }

    fn finish(mut self, outcome: Result<()>) {
        self.ran = true;
        if let Err(error) = outcome {
            trace!("Forked task failed: {}", error);
            self.state.failure.record(error);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.ran {
            self.state
                .failure
                .record(ConcurrencyError::TaskDropped.into());
        }
        self.state.complete_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomdb_core::traits::ForkScopeExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runs every task on its own std thread
    struct SpawnScope;

    impl ForkScope for SpawnScope {
        fn fork(&self, task: Task) -> Result<()> {
            std::thread::spawn(move || {
                let _ = task();
            });
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Refuses everything
    struct RejectingScope;

    impl ForkScope for RejectingScope {
        fn fork(&self, _task: Task) -> Result<()> {
            Err(ConcurrencyError::ShuttingDown.into())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_close_without_tasks() {
        let scope = ChildScope::open(Arc::new(SpawnScope));
        assert_eq!(scope.outstanding(), 1);
        scope.close().unwrap();
        assert_eq!(scope.outstanding(), 0);
    }

    #[test]
    fn test_close_waits_for_nested_forks() {
        let scope = ChildScope::open(Arc::new(SpawnScope));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let inner_scope = scope.clone();
            let counter = Arc::clone(&counter);
            scope
                .spawn(move || {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst);
                    let counter = Arc::clone(&counter);
                    inner_scope.spawn(move || {
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
                .unwrap();
        }

        scope.close().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_first_failure_is_reported_once() {
        let scope = ChildScope::open(Arc::new(SpawnScope));
        let completed = Arc::new(AtomicUsize::new(0));

        for i in 0..10 {
            let completed = Arc::clone(&completed);
            scope
                .spawn(move || {
                    completed.fetch_add(1, Ordering::SeqCst);
                    if i % 3 == 0 {
                        Err(Error::task(format!("task {} failed", i)))
                    } else {
                        Ok(())
                    }
                })
                .unwrap();
        }

        assert!(matches!(scope.close(), Err(Error::Task(_))));
        assert_eq!(completed.load(Ordering::SeqCst), 10);

        // The failure was handed out; a repeated close neither blocks nor repeats it
        assert!(scope.close().is_ok());
    }

    #[test]
    fn test_rejected_fork_releases_count() {
        let scope = ChildScope::open(Arc::new(RejectingScope));
        let result = scope.spawn(|| Ok(()));
        assert!(matches!(
            result,
            Err(Error::Concurrency(ConcurrencyError::ShuttingDown))
        ));
        assert_eq!(scope.outstanding(), 1);

        assert!(matches!(
            scope.close(),
            Err(Error::Concurrency(ConcurrencyError::TaskDropped))
        ));
    }

    #[test]
    fn test_fork_after_drain_is_rejected() {
        let scope = ChildScope::open(Arc::new(SpawnScope));
        scope.close().unwrap();
        assert!(scope.spawn(|| Ok(())).is_err());
    }

    #[test]
    fn test_grandchild_failure_stays_in_grandchild() {
        let child = ChildScope::open(Arc::new(SpawnScope));
        let grandchild = child.open_child();

        grandchild.spawn(|| Err(Error::task("deep failure"))).unwrap();

        assert!(grandchild.close().is_err());
        assert!(child.close().is_ok());
    }
}
