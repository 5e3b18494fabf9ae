//! Single-fire completion signal.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A signal that fires once and stays fired.
///
/// Any number of threads may wait on it; all of them are released when the
/// signal fires, and later waiters return immediately.
#[derive(Debug, Default)]
pub struct WaitableSignal {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl WaitableSignal {
    /// Create an unsignaled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking every waiter.
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_all();
    }

    /// Whether the signal has fired.
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
    }

    /// Block until the signal fires or `timeout` elapses.
    ///
    /// Returns true if the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }
}
