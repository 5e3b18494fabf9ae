//! Benchmark driver.
//!
//! One run builds a tracked substrate and a gated connection pool, runs the
//! `init` script, then times iterations. Each iteration opens a child scope
//! and forks chains of alternating CPU and connection steps; every step forks
//! its successor when it finishes, so the child scope only drains once the
//! last step of every chain is done.

use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use loomdb_concurrency::{ChildScope, ExceptionTracker, GatedPool, Substrate};
use loomdb_core::config::BenchConfig;
use loomdb_core::error::{Error, Result};
use loomdb_core::traits::{ForkScope, ForkScopeExt, Resource};
use loomdb_script::load_script_statements;

/// Counters shared by every simulated connection of a run
#[derive(Debug, Default)]
pub struct ConnectionStats {
    created: AtomicUsize,
    closed: AtomicUsize,
    queries: AtomicUsize,
    statements: AtomicUsize,
}

impl ConnectionStats {
    /// Connections opened
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Connections closed
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulated queries run
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Script statements executed
    pub fn statements(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }
}

/// Stand-in for a database connection
#[derive(Debug)]
pub struct SimulatedConnection {
    id: usize,
    delay: Duration,
    executed: Vec<String>,
    stats: Arc<ConnectionStats>,
}

impl SimulatedConnection {
    fn open(delay: Duration, stats: Arc<ConnectionStats>) -> Self {
        let id = stats.created.fetch_add(1, Ordering::SeqCst);
        debug!("Opened simulated connection {}", id);
        Self {
            id,
            delay,
            executed: Vec::new(),
            stats,
        }
    }

    /// Run one query, holding the connection for the configured delay
    pub fn query(&mut self) -> Result<()> {
        thread::sleep(self.delay);
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Execute a script statement
    pub fn execute(&mut self, statement: &str) -> Result<()> {
        self.executed.push(statement.to_string());
        self.stats.statements.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Statements executed on this connection
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

impl Resource for SimulatedConnection {
    fn close(&mut self) -> Result<()> {
        debug!("Closing simulated connection {}", self.id);
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One link of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Cpu,
    Connection,
}

const CHAIN: [Step; 4] = [Step::Cpu, Step::Connection, Step::Cpu, Step::Connection];

/// What each step does
struct Workload {
    cpu_work: u64,
    cpu_sleep: Duration,
    pool: Arc<GatedPool<SimulatedConnection>>,
}

impl Workload {
    fn run(&self, step: Step) -> Result<()> {
        match step {
            Step::Cpu => {
                let mut acc = 0u64;
                for i in 0..self.cpu_work {
                    acc = black_box(acc.wrapping_mul(31).wrapping_add(i));
                }
                black_box(acc);
                if !self.cpu_sleep.is_zero() {
                    thread::sleep(self.cpu_sleep);
                }
                Ok(())
            }
            Step::Connection => self.pool.with_resource(SimulatedConnection::query),
        }
    }
}

/// Fork `CHAIN[step]`; it forks the following step when done
fn fork_chain(scope: &ChildScope, workload: Arc<Workload>, step: usize) -> Result<()> {
    let next_scope = scope.clone();
    scope.spawn(move || {
        workload.run(CHAIN[step])?;
        if step + 1 < CHAIN.len() {
            fork_chain(&next_scope, workload, step + 1)?;
        }
        Ok(())
    })
}

/// Everything a run keeps alive between iterations
pub struct Harness {
    root: Arc<ExceptionTracker<Substrate>>,
    pool: Arc<GatedPool<SimulatedConnection>>,
    workload: Arc<Workload>,
    stats: Arc<ConnectionStats>,
    chains: usize,
}

impl Harness {
    /// Build the substrate and pool and run the `init` script
    pub fn setup(config: &BenchConfig) -> Result<Self> {
        let pool_size = config.resolved_pool_size()?;
        let stats = Arc::new(ConnectionStats::default());

        let delay = Duration::from_millis(config.resource_delay_ms);
        let factory_stats = Arc::clone(&stats);
        let pool = Arc::new(GatedPool::new(pool_size, move || {
            Ok(SimulatedConnection::open(delay, Arc::clone(&factory_stats)))
        })?);

        let root = Arc::new(ExceptionTracker::new(Substrate::from_config(config)?));

        let harness = Self {
            root,
            pool: Arc::clone(&pool),
            workload: Arc::new(Workload {
                cpu_work: config.cpu_work,
                cpu_sleep: Duration::from_millis(config.cpu_sleep_ms),
                pool,
            }),
            stats,
            chains: config.chains_per_iteration(),
        };

        if let Some(dir) = &config.script_dir {
            let statements = load_script_statements(dir, &config.db_name, "init")?;
            if !statements.is_empty() {
                info!("Running {} init statements", statements.len());
                harness.pool.with_resource(|conn| {
                    statements
                        .iter()
                        .try_for_each(|statement| conn.execute(statement))?;
                    debug!(
                        "Connection {} executed {} init statements",
                        conn.id,
                        conn.executed().len()
                    );
                    Ok(())
                })?;
            }
        }

        info!(
            "Harness ready: pool size {}, {} chains per iteration",
            pool_size, harness.chains
        );
        Ok(harness)
    }

    /// Run one iteration and return its wall-clock time
    pub fn run_iteration(&self) -> Result<Duration> {
        let start = Instant::now();
        let scope = ChildScope::open(self.root.clone());

        let mut forked = Ok(());
        for _ in 0..self.chains {
            forked = fork_chain(&scope, Arc::clone(&self.workload), 0);
            if forked.is_err() {
                break;
            }
        }

        // Always join what was forked before reporting a fork failure
        let joined = scope.close();
        forked?;
        joined?;
        Ok(start.elapsed())
    }

    /// Connection counters
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// The tracked substrate
    pub fn substrate(&self) -> &Substrate {
        self.root.inner()
    }

    /// Close the substrate and the pool.
    ///
    /// Both are closed even if the first fails; the first failure is
    /// returned.
    pub fn teardown(&self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        for outcome in [self.root.close(), self.pool.close()] {
            if let Err(e) = outcome {
                match first_error {
                    None => first_error = Some(e),
                    Some(_) => warn!("Additional teardown failure: {}", e),
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Timings of one run
#[derive(Debug, Clone)]
pub struct RunTimings {
    /// Warmup iterations that were run
    pub warmup: u32,
    /// Measured iteration times
    pub samples: Vec<Duration>,
}

/// Run warmup and measured iterations against a prepared harness
pub fn run_iterations(harness: &Harness, config: &BenchConfig) -> Result<RunTimings> {
    for i in 0..config.warmup_iterations {
        let elapsed = harness.run_iteration()?;
        debug!("Warmup iteration {} took {:?}", i + 1, elapsed);
    }

    let mut samples = Vec::with_capacity(config.iterations as usize);
    for i in 0..config.iterations {
        let elapsed = harness.run_iteration()?;
        info!("Iteration {} took {:.2}ms", i + 1, elapsed.as_secs_f64() * 1000.0);
        samples.push(elapsed);
    }

    Ok(RunTimings {
        warmup: config.warmup_iterations,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomdb_core::config::ForkType;
    use std::fs;

    fn quick_config(fork_type: ForkType) -> BenchConfig {
        BenchConfig {
            fork_type,
            pool_size: 2,
            processors: Some(2),
            resource_delay_ms: 1,
            cpu_work: 100,
            iterations: 2,
            warmup_iterations: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_iteration_runs_every_step() {
        for fork_type in [ForkType::LimitedExecutor, ForkType::VirtualThreads] {
            let config = quick_config(fork_type);
            let harness = Harness::setup(&config).unwrap();

            harness.run_iteration().unwrap();

            // Two connection steps per chain
            assert_eq!(harness.stats().queries(), 2 * config.chains_per_iteration());
            assert!(harness.stats().created() <= 2);

            harness.teardown().unwrap();
            assert_eq!(harness.stats().closed(), harness.stats().created());
        }
    }

    #[test]
    fn test_run_iterations_collects_samples() {
        let config = quick_config(ForkType::VirtualThreads);
        let harness = Harness::setup(&config).unwrap();

        let timings = run_iterations(&harness, &config).unwrap();
        assert_eq!(timings.samples.len(), 2);
        assert_eq!(timings.warmup, 1);
        assert_eq!(harness.stats().queries(), 3 * 2 * config.chains_per_iteration());

        harness.teardown().unwrap();
    }

    #[test]
    fn test_init_script_runs_on_a_pooled_connection() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("simulated")).unwrap();
        fs::write(
            dir.path().join("simulated").join("init.sql"),
            "CREATE TABLE t (id INT); INSERT INTO t SELECT ';';",
        )
        .unwrap();

        let config = BenchConfig {
            script_dir: Some(dir.path().to_path_buf()),
            ..quick_config(ForkType::VirtualThreads)
        };
        let harness = Harness::setup(&config).unwrap();
        assert_eq!(harness.stats().statements(), 2);

        let executed = harness
            .pool
            .with_resource(|conn| Ok(conn.executed().to_vec()))
            .unwrap();
        assert_eq!(
            executed,
            vec!["CREATE TABLE t (id INT)", "INSERT INTO t SELECT ';'"]
        );

        harness.teardown().unwrap();
    }

    #[test]
    fn test_teardown_closes_pool_even_if_substrate_fails() {
        let config = BenchConfig {
            shutdown_timeout_secs: 1,
            ..quick_config(ForkType::LimitedExecutor)
        };
        let harness = Harness::setup(&config).unwrap();
        harness.run_iteration().unwrap();

        // Keep a worker busy past the shutdown timeout
        harness
            .root
            .spawn(|| {
                thread::sleep(Duration::from_millis(1500));
                Ok(())
            })
            .unwrap();

        assert!(harness.teardown().is_err());
        assert!(harness.pool.pool().is_closed());
        assert_eq!(harness.stats().closed(), harness.stats().created());
    }
}
