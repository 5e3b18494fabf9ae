//! Structured fan-out over interchangeable execution substrates.
//!
//! A substrate runs tasks: either a bounded worker pool or one small thread
//! per task. A `ChildScope` opened under any `ForkScope` adds an independent
//! join barrier and first-failure capture; child scopes nest to any depth.
//! An `ExceptionTracker` at the top captures failures raised by the
//! substrate itself.

pub mod child;
pub mod substrate;
pub mod tracker;

pub use child::ChildScope;
pub use substrate::{Substrate, ThreadPerTaskScope, ThreadPoolScope};
pub use tracker::ExceptionTracker;

use std::panic::{catch_unwind, AssertUnwindSafe};

use loomdb_core::error::{ConcurrencyError, Result};
use loomdb_core::traits::Task;

use crate::pool::thread::panic_message;

/// Run a task, turning a panic into an error
pub(crate) fn run_task(task: Task) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(ConcurrencyError::TaskPanicked(panic_message(&*payload)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomdb_core::error::Error;

    #[test]
    fn test_run_task_outcomes() {
        assert!(run_task(Box::new(|| Ok(()))).is_ok());
        assert!(matches!(
            run_task(Box::new(|| Err(Error::task("boom")))),
            Err(Error::Task(_))
        ));
        match run_task(Box::new(|| -> Result<()> { panic!("kaboom") })) {
            Err(Error::Concurrency(ConcurrencyError::TaskPanicked(message))) => {
                assert_eq!(message, "kaboom")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
