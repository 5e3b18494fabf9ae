//! Synchronization primitives for fork scopes and pools.
//!
//! - Atomic counters and a first-failure holder for lock-free scope bookkeeping
//! - A single-fire waitable signal used as a join barrier
//! - A counting semaphore used to gate pool admission

pub mod atomic;
pub mod semaphore;
pub mod signal;

pub use atomic::{AtomicFlag, FirstFailure, OutstandingCounter};
pub use semaphore::{Semaphore, SemaphorePermit};
pub use signal::WaitableSignal;
