//! Run report.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use loomdb_concurrency::ThreadPoolStats;
use loomdb_core::config::ForkType;

/// Summary of iteration times in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingSummary {
    /// Mean iteration time
    pub mean_ms: f64,
    /// Fastest iteration
    pub min_ms: f64,
    /// Slowest iteration
    pub max_ms: f64,
    /// Every measured iteration, in order
    pub samples_ms: Vec<f64>,
}

impl TimingSummary {
    /// Summarize measured iteration times
    pub fn from_samples(samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let samples_ms: Vec<f64> = samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        let total: f64 = samples_ms.iter().sum();
        Self {
            mean_ms: total / samples_ms.len() as f64,
            min_ms: samples_ms.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: samples_ms.iter().copied().fold(0.0, f64::max),
            samples_ms,
        }
    }
}

/// Connection usage over the whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceSummary {
    /// Connections opened
    pub created: usize,
    /// Connections closed
    pub closed: usize,
    /// Simulated queries
    pub queries: usize,
    /// Init script statements executed
    pub init_statements: usize,
}

/// Bounded worker pool counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerPoolSummary {
    /// Tasks queued
    pub tasks_queued: usize,
    /// Tasks completed
    pub tasks_completed: usize,
    /// Tasks that panicked
    pub tasks_panicked: usize,
    /// Mean queue wait (microseconds)
    pub mean_queue_time_us: u64,
    /// Longest task (microseconds)
    pub max_execution_time_us: u64,
}

impl From<ThreadPoolStats> for WorkerPoolSummary {
    fn from(stats: ThreadPoolStats) -> Self {
        let finished = (stats.tasks_completed + stats.tasks_panicked).max(1) as u64;
        Self {
            tasks_queued: stats.tasks_queued,
            tasks_completed: stats.tasks_completed,
            tasks_panicked: stats.tasks_panicked,
            mean_queue_time_us: stats.total_queue_time_us / finished,
            max_execution_time_us: stats.max_execution_time_us,
        }
    }
}

/// Everything reported about one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of the run
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Substrate used for forked work
    pub fork_type: ForkType,
    /// Processors the run was sized for
    pub processors: usize,
    /// Resolved connection pool size
    pub pool_size: usize,
    /// Chains forked per iteration
    pub chains_per_iteration: usize,
    /// Unmeasured iterations
    pub warmup_iterations: u32,
    /// Iteration times
    pub timings: TimingSummary,
    /// Connection usage
    pub resources: ResourceSummary,
    /// Worker pool counters, for the bounded substrate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_pool: Option<WorkerPoolSummary>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} ({})", self.run_id, self.started_at.to_rfc3339())?;
        writeln!(
            f,
            "  substrate: {}, processors: {}, pool size: {}",
            self.fork_type, self.processors, self.pool_size
        )?;
        writeln!(
            f,
            "  iterations: {} measured, {} warmup, {} chains each",
            self.timings.samples_ms.len(),
            self.warmup_iterations,
            self.chains_per_iteration
        )?;
        writeln!(
            f,
            "  time per iteration: mean {:.2}ms, min {:.2}ms, max {:.2}ms",
            self.timings.mean_ms, self.timings.min_ms, self.timings.max_ms
        )?;
        writeln!(
            f,
            "  connections: {} created, {} closed, {} queries, {} init statements",
            self.resources.created,
            self.resources.closed,
            self.resources.queries,
            self.resources.init_statements
        )?;
        if let Some(pool) = &self.worker_pool {
            writeln!(
                f,
                "  worker pool: {} queued, {} completed, {} panicked, mean queue wait {}us",
                pool.tasks_queued, pool.tasks_completed, pool.tasks_panicked, pool.mean_queue_time_us
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_summary() {
        let summary = TimingSummary::from_samples(&[
            Duration::from_millis(10),
            Duration::from_millis(30),
            Duration::from_millis(20),
        ]);
        assert!((summary.mean_ms - 20.0).abs() < 1e-9);
        assert!((summary.min_ms - 10.0).abs() < 1e-9);
        assert!((summary.max_ms - 30.0).abs() < 1e-9);
        assert_eq!(summary.samples_ms.len(), 3);

        let empty = TimingSummary::from_samples(&[]);
        assert_eq!(empty.mean_ms, 0.0);
    }

    #[test]
    fn test_worker_pool_summary() {
        let summary = WorkerPoolSummary::from(ThreadPoolStats {
            tasks_queued: 4,
            tasks_completed: 3,
            tasks_panicked: 1,
            total_execution_time_us: 400,
            total_queue_time_us: 80,
            max_execution_time_us: 150,
        });
        assert_eq!(summary.mean_queue_time_us, 20);
        assert_eq!(summary.max_execution_time_us, 150);
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            fork_type: ForkType::VirtualThreads,
            processors: 2,
            pool_size: 1,
            chains_per_iteration: 4,
            warmup_iterations: 0,
            timings: TimingSummary::from_samples(&[Duration::from_millis(5)]),
            resources: ResourceSummary::default(),
            worker_pool: None,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fork_type"], "virtual-threads");
        assert!(json.get("worker_pool").is_none());
        assert!(report.to_string().contains("substrate: virtual-threads"));
    }
}
