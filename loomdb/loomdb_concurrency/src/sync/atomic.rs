//! Atomic operations and data structures.
//!
//! Lock-free bookkeeping used on the hot path of every task completion.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::trace;
use parking_lot::Mutex;

/// Count of not-yet-completed units of a scope.
///
/// Starts at one, representing the scope's own contribution, so the count
/// cannot reach zero before the owner has released it.
#[derive(Debug)]
pub struct OutstandingCounter {
    value: AtomicUsize,
}

impl OutstandingCounter {
    /// Create a counter holding the owner's own unit.
    pub fn new() -> Self {
        Self {
            value: AtomicUsize::new(1),
        }
    }

    /// Register one more outstanding unit and return the new count.
    pub fn increment(&self) -> usize {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Complete one unit.
    ///
    /// Returns true for exactly one caller: the one whose decrement crossed
    /// zero.
    pub fn decrement(&self) -> bool {
        let previous = self.value.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "outstanding counter underflow");
        previous == 1
    }

    /// Get the current count.
    pub fn get(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }
}

impl Default for OutstandingCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A flag that can be atomically set once.
#[derive(Debug, Default)]
pub struct AtomicFlag {
    flag: AtomicBool,
}

impl AtomicFlag {
    /// Create a new, unset flag.
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// Set the flag if it's not already set.
    ///
    /// Returns true if the flag was set by this call, false if it was already set.
    pub fn try_set(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Get the current state of the flag.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Holder for the first failure recorded by any of many concurrent units.
///
/// The winner is decided by a single compare-and-set; later failures are
/// dropped. The slot behind the flag is written at most once, by the winner,
/// so its lock is never contended on the recording path.
#[derive(Debug)]
pub struct FirstFailure<E> {
    claimed: AtomicFlag,
    slot: Mutex<Option<E>>,
}

impl<E> FirstFailure<E> {
    /// Create an empty holder.
    pub fn new() -> Self {
        Self {
            claimed: AtomicFlag::new(),
            slot: Mutex::new(None),
        }
    }

    /// Record `error` if no failure was recorded before.
    ///
    /// Returns true if this call won.
    pub fn record(&self, error: E) -> bool {
        if self.claimed.try_set() {
            *self.slot.lock() = Some(error);
            true
        } else {
            trace!("Dropping failure, an earlier one is already recorded");
            false
        }
    }

    /// Whether any failure has been recorded.
    pub fn is_recorded(&self) -> bool {
        self.claimed.is_set()
    }

    /// Take the recorded failure, leaving the holder claimed but empty.
    pub fn take(&self) -> Option<E> {
        self.slot.lock().take()
    }
}

impl<E> Default for FirstFailure<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_outstanding_counter() {
        let counter = OutstandingCounter::new();

        assert_eq!(counter.get(), 1);
        assert_eq!(counter.increment(), 2);
        assert!(!counter.decrement());
        assert!(counter.decrement());
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_outstanding_counter_single_zero_crossing() {
        let counter = Arc::new(OutstandingCounter::new());
        let threads = 8;
        for _ in 0..threads {
            counter.increment();
        }

        let zero_crossings = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];
        for _ in 0..threads {
            let counter = Arc::clone(&counter);
            let zero_crossings = Arc::clone(&zero_crossings);
            handles.push(thread::spawn(move || {
                if counter.decrement() {
                    zero_crossings.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(zero_crossings.load(Ordering::SeqCst), 0);
        assert!(counter.decrement());
    }

    #[test]
    fn test_atomic_flag_threads() {
        let flag = Arc::new(AtomicFlag::new());
        let success_count = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let flag = Arc::clone(&flag);
            let success_count = Arc::clone(&success_count);
            handles.push(thread::spawn(move || {
                if flag.try_set() {
                    success_count.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Only one thread should have successfully set the flag
        assert_eq!(success_count.load(Ordering::SeqCst), 1);
        assert!(flag.is_set());
    }

    #[test]
    fn test_first_failure_wins() {
        let failures = Arc::new(FirstFailure::new());

        let mut handles = vec![];
        for i in 0..10 {
            let failures = Arc::clone(&failures);
            handles.push(thread::spawn(move || failures.record(i)));
        }
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(failures.is_recorded());
        assert!(failures.take().is_some());
        assert!(failures.take().is_none());
        assert!(!failures.record(99));
    }
}
