//! Run the simulated benchmark

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use log::{error, info};
use uuid::Uuid;

use loomdb_core::config::{BenchConfig, ForkType};

use crate::bench::{run_iterations, Harness};
use crate::report::{ResourceSummary, RunReport, TimingSummary, WorkerPoolSummary};

/// Arguments for the run command; each overrides the configuration file
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Substrate for forked work (limited-executor or virtual-threads)
    #[clap(long)]
    pub fork_type: Option<ForkType>,

    /// Connection pool size; zero or negative is relative to the processor count
    #[clap(long, allow_hyphen_values = true)]
    pub pool_size: Option<i64>,

    /// Processor count to size the run for
    #[clap(long)]
    pub processors: Option<usize>,

    /// Spin iterations per CPU step
    #[clap(long)]
    pub cpu_work: Option<u64>,

    /// Sleep after each CPU step (milliseconds)
    #[clap(long)]
    pub cpu_sleep_ms: Option<u64>,

    /// Time a connection is held per query (milliseconds)
    #[clap(long)]
    pub resource_delay_ms: Option<u64>,

    /// Measured iterations
    #[clap(long)]
    pub iterations: Option<u32>,

    /// Warmup iterations
    #[clap(long)]
    pub warmup_iterations: Option<u32>,

    /// Print the report as JSON
    #[clap(long)]
    pub json: bool,
}

impl RunArgs {
    /// Apply the command-line overrides to `config`
    pub fn apply(&self, config: &mut BenchConfig) {
        if let Some(fork_type) = self.fork_type {
            config.fork_type = fork_type;
        }
        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(processors) = self.processors {
            config.processors = Some(processors);
        }
        if let Some(cpu_work) = self.cpu_work {
            config.cpu_work = cpu_work;
        }
        if let Some(cpu_sleep_ms) = self.cpu_sleep_ms {
            config.cpu_sleep_ms = cpu_sleep_ms;
        }
        if let Some(resource_delay_ms) = self.resource_delay_ms {
            config.resource_delay_ms = resource_delay_ms;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(warmup_iterations) = self.warmup_iterations {
            config.warmup_iterations = warmup_iterations;
        }
    }
}

/// Run one benchmark and print its report
pub fn execute(args: &RunArgs, mut config: BenchConfig) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("Invalid benchmark configuration")?;

    let report = run(&config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

/// Set up, iterate and tear down; teardown happens even when an iteration fails
pub fn run(config: &BenchConfig) -> Result<RunReport> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!("Starting run {} with {} substrate", run_id, config.fork_type);

    let harness = Harness::setup(config).context("Failed to set up the benchmark")?;
    let timings = run_iterations(&harness, config);
    let teardown = harness.teardown();

    let timings = match (timings, teardown) {
        (Ok(timings), Ok(())) => timings,
        (Err(e), teardown) => {
            if let Err(teardown_error) = teardown {
                error!("Teardown also failed: {}", teardown_error);
            }
            return Err(e).context("Benchmark iteration failed");
        }
        (Ok(_), Err(e)) => return Err(e).context("Benchmark teardown failed"),
    };

    let stats = harness.stats();
    Ok(RunReport {
        run_id,
        started_at,
        fork_type: harness.substrate().fork_type(),
        processors: config.processor_count(),
        pool_size: config.resolved_pool_size()?,
        chains_per_iteration: config.chains_per_iteration(),
        warmup_iterations: timings.warmup,
        timings: TimingSummary::from_samples(&timings.samples),
        resources: ResourceSummary {
            created: stats.created(),
            closed: stats.closed(),
            queries: stats.queries(),
            init_statements: stats.statements(),
        },
        worker_pool: harness.substrate().pool_stats().map(WorkerPoolSummary::from),
    })
}
