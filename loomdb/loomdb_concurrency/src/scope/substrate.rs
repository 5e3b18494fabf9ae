//! Execution substrates.
//!
//! Both substrates run forked tasks to completion and never let a failing
//! task take down the substrate: failures that reach this level are logged
//! and discarded. Scopes that need them wrap the task before it gets here.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info};

use loomdb_core::config::{BenchConfig, ForkType};
use loomdb_core::error::{ConcurrencyError, Result};
use loomdb_core::traits::{ForkScope, Task};

use super::run_task;
use crate::pool::thread::{ThreadPool, ThreadPoolConfig, ThreadPoolStats};

/// Substrate backed by a fixed number of worker threads
pub struct ThreadPoolScope {
    pool: ThreadPool,
    shutdown_timeout: Duration,
}

impl ThreadPoolScope {
    /// Start `threads` workers; `close` waits at most `shutdown_timeout`.
    pub fn new(threads: usize, shutdown_timeout: Duration) -> Result<Self> {
        let pool = ThreadPool::with_config(ThreadPoolConfig {
            threads,
            thread_name_prefix: "loomdb-fork".to_string(),
            collect_stats: true,
        })?;
        Ok(Self {
            pool,
            shutdown_timeout,
        })
    }

    /// Statistics of the underlying worker pool
    pub fn stats(&self) -> ThreadPoolStats {
        self.pool.get_stats()
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.pool.threads()
    }
}

impl ForkScope for ThreadPoolScope {
    fn fork(&self, task: Task) -> Result<()> {
        self.pool.execute(move || {
            if let Err(e) = run_task(task) {
                error!("Forked task failed: {}", e);
            }
        })
    }

    fn close(&self) -> Result<()> {
        self.pool.shutdown_and_wait(self.shutdown_timeout)
    }
}

/// Substrate that starts a fresh small-stack thread for every task.
///
/// There is no queue and no backpressure; `close` has nothing to release.
pub struct ThreadPerTaskScope {
    stack_size: usize,
    spawned: AtomicUsize,
}

impl ThreadPerTaskScope {
    /// Create a substrate whose threads get `stack_size` bytes of stack
    pub fn new(stack_size: usize) -> Self {
        Self {
            stack_size,
            spawned: AtomicUsize::new(0),
        }
    }

    /// Number of threads started so far
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl ForkScope for ThreadPerTaskScope {
    fn fork(&self, task: Task) -> Result<()> {
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new()
            .name(format!("loomdb-task-{}", id))
            .stack_size(self.stack_size)
            .spawn(move || {
                if let Err(e) = run_task(task) {
                    error!("Forked task failed: {}", e);
                }
            })
            .map(drop)
            .map_err(|e| ConcurrencyError::SpawnFailed(e.to_string()).into())
    }

    fn close(&self) -> Result<()> {
        debug!("Thread-per-task substrate closed after {} threads", self.spawned());
        Ok(())
    }
}

/// The substrate selected by `ForkType`
pub enum Substrate {
    /// Bounded worker pool
    Pooled(ThreadPoolScope),
    /// One lightweight thread per task
    PerTask(ThreadPerTaskScope),
}

impl Substrate {
    /// Build the substrate named by `config.fork_type`.
    ///
    /// The bounded pool gets one worker per processor.
    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        let substrate = match config.fork_type {
            ForkType::LimitedExecutor => Substrate::Pooled(ThreadPoolScope::new(
                config.processor_count(),
                config.shutdown_timeout(),
            )?),
            ForkType::VirtualThreads => {
                Substrate::PerTask(ThreadPerTaskScope::new(config.lightweight_stack_size))
            }
        };
        info!("Using {} substrate", substrate.fork_type());
        Ok(substrate)
    }

    /// Which kind of substrate this is
    pub fn fork_type(&self) -> ForkType {
        match self {
            Substrate::Pooled(_) => ForkType::LimitedExecutor,
            Substrate::PerTask(_) => ForkType::VirtualThreads,
        }
    }

    /// Worker pool statistics, for the pooled substrate
    pub fn pool_stats(&self) -> Option<ThreadPoolStats> {
        match self {
            Substrate::Pooled(scope) => Some(scope.stats()),
            Substrate::PerTask(_) => None,
        }
    }
}

impl ForkScope for Substrate {
    fn fork(&self, task: Task) -> Result<()> {
        match self {
            Substrate::Pooled(scope) => scope.fork(task),
            Substrate::PerTask(scope) => scope.fork(task),
        }
    }

    fn close(&self) -> Result<()> {
        match self {
            Substrate::Pooled(scope) => scope.close(),
            Substrate::PerTask(scope) => scope.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomdb_core::error::Error;
    use loomdb_core::traits::ForkScopeExt;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_pooled_close_drains_queue() {
        let scope = ThreadPoolScope::new(2, Duration::from_secs(10)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            scope
                .spawn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        scope.spawn(|| Err(Error::task("logged only"))).unwrap();

        scope.close().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(scope.stats().tasks_completed, 21);

        assert!(matches!(
            scope.spawn(|| Ok(())),
            Err(Error::Concurrency(ConcurrencyError::ShuttingDown))
        ));
    }

    #[test]
    fn test_pooled_close_timeout_is_fatal() {
        let scope = ThreadPoolScope::new(1, Duration::from_millis(20)).unwrap();
        scope
            .spawn(|| {
                thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            scope.close(),
            Err(Error::Concurrency(ConcurrencyError::ShutdownTimeout(_)))
        ));
    }

    #[test]
    fn test_per_task_threads() {
        let scope = ThreadPerTaskScope::new(128 * 1024);
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..5 {
            let tx = tx.clone();
            scope
                .spawn(move || {
                    let name = thread::current().name().map(str::to_string);
                    tx.send((i, name)).map_err(|e| Error::task(e.to_string()))
                })
                .unwrap();
        }
        drop(tx);

        let mut received: Vec<_> = rx.iter().collect();
        received.sort();
        assert_eq!(received.len(), 5);
        assert!(received
            .iter()
            .all(|(_, name)| name.as_deref().unwrap_or("").starts_with("loomdb-task-")));
        assert_eq!(scope.spawned(), 5);
        scope.close().unwrap();
    }

    #[test]
    fn test_substrate_from_config() {
        let config = BenchConfig {
            fork_type: ForkType::VirtualThreads,
            ..Default::default()
        };
        let substrate = Substrate::from_config(&config).unwrap();
        assert_eq!(substrate.fork_type(), ForkType::VirtualThreads);
        assert!(substrate.pool_stats().is_none());

        let config = BenchConfig {
            fork_type: ForkType::LimitedExecutor,
            processors: Some(2),
            ..Default::default()
        };
        let substrate = Substrate::from_config(&config).unwrap();
        assert_eq!(substrate.fork_type(), ForkType::LimitedExecutor);
        assert!(substrate.pool_stats().is_some());
        substrate.close().unwrap();
    }
}
