//! Top-level failure capture over a substrate.

use std::sync::Arc;

use log::{debug, warn};

use loomdb_core::error::{Error, Result};
use loomdb_core::traits::{ForkScope, Task};

use super::run_task;
use crate::sync::FirstFailure;

/// Wraps a substrate so that every failure, including a fork the substrate
/// refuses, is kept and raised once from `close`.
///
/// Unlike a `ChildScope` the tracker is not a join barrier of its own;
/// waiting is left to the substrate's close.
pub struct ExceptionTracker<S: ForkScope> {
    inner: S,
    failure: Arc<FirstFailure<Error>>,
}

impl<S: ForkScope> ExceptionTracker<S> {
    /// Track failures of `inner`
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failure: Arc::new(FirstFailure::new()),
        }
    }

    /// The wrapped substrate
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Whether a failure has been captured
    pub fn has_failed(&self) -> bool {
        self.failure.is_recorded()
    }
}

impl<S: ForkScope> ForkScope for ExceptionTracker<S> {
    fn fork(&self, task: Task) -> Result<()> {
        let failure = Arc::clone(&self.failure);
        let wrapped: Task = Box::new(move || {
            if let Err(error) = run_task(task) {
                failure.record(error);
            }
            Ok(())
        });

        if let Err(error) = self.inner.fork(wrapped) {
            warn!("Substrate rejected a task: {}", error);
            self.failure.record(error);
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        debug!("Closing exception tracker");
        self.inner.close()?;

        match self.failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomdb_core::error::ConcurrencyError;
    use loomdb_core::traits::ForkScopeExt;
    use parking_lot::Mutex;

    /// Runs tasks inline, optionally refusing them or failing on close
    #[derive(Default)]
    struct InlineScope {
        reject: bool,
        close_error: Mutex<Option<Error>>,
    }

    impl ForkScope for InlineScope {
        fn fork(&self, task: Task) -> Result<()> {
            if self.reject {
                return Err(ConcurrencyError::ShuttingDown.into());
            }
            task()
        }

        fn close(&self) -> Result<()> {
            match self.close_error.lock().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn test_task_failure_raised_on_close() {
        let tracker = ExceptionTracker::new(InlineScope::default());
        tracker.spawn(|| Err(Error::task("first"))).unwrap();
        tracker.spawn(|| Err(Error::task("second"))).unwrap();
        assert!(tracker.has_failed());

        match tracker.close() {
            Err(Error::Task(message)) => assert_eq!(message, "first"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_rejected_fork_is_captured() {
        let tracker = ExceptionTracker::new(InlineScope {
            reject: true,
            ..Default::default()
        });

        // The rejection does not surface at the fork site
        assert!(tracker.spawn(|| Ok(())).is_ok());
        assert!(matches!(
            tracker.close(),
            Err(Error::Concurrency(ConcurrencyError::ShuttingDown))
        ));
    }

    #[test]
    fn test_substrate_close_error_wins() {
        let tracker = ExceptionTracker::new(InlineScope {
            close_error: Mutex::new(Some(
                ConcurrencyError::ShutdownTimeout(std::time::Duration::from_secs(1)).into(),
            )),
            ..Default::default()
        });
        tracker.spawn(|| Err(Error::task("ignored"))).unwrap();

        assert!(matches!(
            tracker.close(),
            Err(Error::Concurrency(ConcurrencyError::ShutdownTimeout(_)))
        ));
    }
}
