//! Thread pool implementation for parallel execution.
//!
//! A fixed number of worker threads drain a shared, unbounded queue. Tasks
//! may submit further tasks from inside a worker; shutdown stops accepting
//! new work and waits for the queue to drain.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, trace};
use parking_lot::{Mutex, RwLock};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use loomdb_core::error::{ConcurrencyError, Result};

use crate::sync::WaitableSignal;

/// Statistics about the thread pool
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ThreadPoolStats {
    /// Number of tasks queued
    pub tasks_queued: usize,

    /// Number of tasks completed
    pub tasks_completed: usize,

    /// Number of tasks that panicked
    pub tasks_panicked: usize,

    /// Total task execution time (microseconds)
    pub total_execution_time_us: u64,

    /// Queue wait time (microseconds)
    pub total_queue_time_us: u64,

    /// Maximum task execution time (microseconds)
    pub max_execution_time_us: u64,
}

/// Configuration for the thread pool
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads
    pub threads: usize,

    /// Name prefix for worker threads
    pub thread_name_prefix: String,

    /// Whether to collect performance statistics
    pub collect_stats: bool,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            thread_name_prefix: "loomdb-worker".to_string(),
            collect_stats: true,
        }
    }
}

/// Task with metadata for tracking
struct Job {
    /// The closure to execute
    func: Box<dyn FnOnce() + Send + 'static>,

    /// When the task was enqueued
    enqueued_at: Instant,
}

impl Job {
    fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            func: Box::new(f),
            enqueued_at: Instant::now(),
        }
    }
}

/// Counters shared between the pool handle and its workers
#[derive(Debug, Default)]
struct StatsCounters {
    tasks_queued: AtomicUsize,
    tasks_completed: AtomicUsize,
    tasks_panicked: AtomicUsize,
    total_execution_time_us: AtomicUsize,
    total_queue_time_us: AtomicUsize,
    max_execution_time_us: AtomicUsize,
}

/// Worker context holding shared state for the worker loop
struct WorkerContext {
    receiver: Receiver<Job>,
    collect_stats: bool,
    stats: Arc<StatsCounters>,
    live_workers: Arc<AtomicUsize>,
    drained: Arc<WaitableSignal>,
}

/// A fixed-size thread pool
pub struct ThreadPool {
    /// Sending half of the task queue; `None` once shutdown has begun
    task_sender: RwLock<Option<Sender<Job>>>,

    /// Worker threads, joined on shutdown
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Fires when the last worker has exited
    drained: Arc<WaitableSignal>,

    /// Statistics counters
    stats: Arc<StatsCounters>,

    /// Configuration
    config: ThreadPoolConfig,
}

impl ThreadPool {
    /// Create a new thread pool with the default configuration
    pub fn new(threads: usize) -> Result<Self> {
        let config = ThreadPoolConfig {
            threads,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Create a new thread pool with the specified configuration
    pub fn with_config(config: ThreadPoolConfig) -> Result<Self> {
        let threads = config.threads.max(1);
        let (task_sender, task_receiver) = unbounded();
        let stats = Arc::new(StatsCounters::default());
        let live_workers = Arc::new(AtomicUsize::new(threads));
        let drained = Arc::new(WaitableSignal::new());

        info!("Creating thread pool with {} workers", threads);

        let mut workers = Vec::with_capacity(threads);

        for id in 0..threads {
            let ctx = WorkerContext {
                receiver: task_receiver.clone(),
                collect_stats: config.collect_stats,
                stats: Arc::clone(&stats),
                live_workers: Arc::clone(&live_workers),
                drained: Arc::clone(&drained),
            };

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, id))
                .spawn(move || Self::worker_loop(id, ctx));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!("Failed to spawn worker thread {}: {}", id, e);
                    // Workers already started exit once the sender is dropped
                    drop(task_sender);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(ConcurrencyError::SpawnFailed(e.to_string()).into());
                }
            }
        }

        Ok(Self {
            task_sender: RwLock::new(Some(task_sender)),
            workers: Mutex::new(workers),
            drained,
            stats,
            config: ThreadPoolConfig { threads, ..config },
        })
    }

    /// Worker thread main loop; runs until the queue is closed and empty
    fn worker_loop(id: usize, ctx: WorkerContext) {
        debug!("Worker {}: Starting", id);

        for job in ctx.receiver.iter() {
            let queue_time = job.enqueued_at.elapsed();

            if ctx.collect_stats {
                ctx.stats
                    .total_queue_time_us
                    .fetch_add(queue_time.as_micros() as usize, Ordering::Relaxed);
            }

            trace!(
                "Worker {}: Executing task (queue time: {:.2}ms)",
                id,
                queue_time.as_micros() as f64 / 1000.0
            );

            let exec_start = Instant::now();

            // Execute the task and catch any panics
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                (job.func)();
            }));

            let exec_time = exec_start.elapsed();

            if ctx.collect_stats {
                let exec_time_us = exec_time.as_micros() as usize;
                ctx.stats
                    .total_execution_time_us
                    .fetch_add(exec_time_us, Ordering::Relaxed);
                ctx.stats
                    .max_execution_time_us
                    .fetch_max(exec_time_us, Ordering::Relaxed);
            }

            match result {
                Ok(()) => {
                    if ctx.collect_stats {
                        ctx.stats.tasks_completed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    error!("Worker {}: Task panicked: {}", id, panic_message(&*e));

                    if ctx.collect_stats {
                        ctx.stats.tasks_panicked.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        debug!("Worker {}: Shutting down", id);
        if ctx.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            ctx.drained.signal();
        }
    }

    /// Submit a task to be executed by the thread pool
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.task_sender.read();
        let sender = sender.as_ref().ok_or(ConcurrencyError::ShuttingDown)?;

        sender
            .send(Job::new(f))
            .map_err(|_| ConcurrencyError::ShuttingDown)?;

        if self.config.collect_stats {
            self.stats.tasks_queued.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.config.threads
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.task_sender.read().is_none()
    }

    /// Get current statistics for the thread pool
    pub fn get_stats(&self) -> ThreadPoolStats {
        if !self.config.collect_stats {
            return ThreadPoolStats::default();
        }
        ThreadPoolStats {
            tasks_queued: self.stats.tasks_queued.load(Ordering::Relaxed),
            tasks_completed: self.stats.tasks_completed.load(Ordering::Relaxed),
            tasks_panicked: self.stats.tasks_panicked.load(Ordering::Relaxed),
            total_execution_time_us: self.stats.total_execution_time_us.load(Ordering::Relaxed)
                as u64,
            total_queue_time_us: self.stats.total_queue_time_us.load(Ordering::Relaxed) as u64,
            max_execution_time_us: self.stats.max_execution_time_us.load(Ordering::Relaxed) as u64,
        }
    }

    /// Stop accepting tasks. Queued tasks still run.
    pub fn shutdown(&self) {
        if self.task_sender.write().take().is_some() {
            info!("Shutting down thread pool");
        }
    }

    /// Shut down the thread pool and wait for the queue to drain
    ///
    /// Exceeding `timeout` is fatal: the workers are left running and
    /// `ConcurrencyError::ShutdownTimeout` is returned.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> Result<()> {
        self.shutdown();

        if !self.drained.wait_timeout(timeout) {
            error!("Thread pool did not terminate within {:?}", timeout);
            return Err(ConcurrencyError::ShutdownTimeout(timeout).into());
        }

        for worker in self.workers.lock().drain(..) {
            if let Err(e) = worker.join() {
                error!("Worker thread panicked during shutdown: {}", panic_message(&*e));
            }
        }

        info!("Thread pool shutdown complete");
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<unknown panic>".to_string()
    }
}
