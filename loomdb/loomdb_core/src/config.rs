//! Harness configuration.
//!
//! Selects the concurrency strategy, pool size and simulated workload of a
//! benchmark run. The configuration is an explicit value handed to the
//! constructors that need it; nothing here is process-wide state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::utils::LogLevel;

/// Execution substrate a fork scope schedules onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ForkType {
    /// A fixed number of worker threads fed by a shared queue
    #[default]
    LimitedExecutor,
    /// One freshly started lightweight thread per task
    VirtualThreads,
}

impl ForkType {
    /// Canonical kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LimitedExecutor => "limited-executor",
            Self::VirtualThreads => "virtual-threads",
        }
    }
}

impl FromStr for ForkType {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "limited-executor" | "executor" => Ok(Self::LimitedExecutor),
            "virtual-threads" | "threads" => Ok(Self::VirtualThreads),
            _ => Err(ConfigError::UnknownForkType(s.to_string())),
        }
    }
}

impl fmt::Display for ForkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Maximum concurrent resources; non-positive values are relative to
    /// the processor count
    pub pool_size: i64,

    /// Execution substrate for forked work
    pub fork_type: ForkType,

    /// Spin iterations per CPU step
    pub cpu_work: u64,

    /// Sleep after the spin in each CPU step (milliseconds)
    pub cpu_sleep_ms: u64,

    /// Simulated I/O time while a resource is held (milliseconds)
    pub resource_delay_ms: u64,

    /// Measured iterations
    pub iterations: u32,

    /// Unmeasured iterations run before measurement
    pub warmup_iterations: u32,

    /// Resource-using tasks per processor in one iteration
    pub tasks_per_processor: usize,

    /// Processor count override; the detected count is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processors: Option<usize>,

    /// Upper bound on draining the bounded worker pool (seconds)
    pub shutdown_timeout_secs: u64,

    /// Stack size of per-task threads (bytes)
    pub lightweight_stack_size: usize,

    /// Root directory of per-database setup scripts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_dir: Option<PathBuf>,

    /// Database name used to pick the script subdirectory
    pub db_name: String,

    /// Default log level of the binary
    pub log_level: LogLevel,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            pool_size: 0,
            fork_type: ForkType::default(),
            cpu_work: 0,
            cpu_sleep_ms: 0,
            resource_delay_ms: 60,
            iterations: 5,
            warmup_iterations: 1,
            tasks_per_processor: 4,
            processors: None,
            shutdown_timeout_secs: 600,
            lightweight_stack_size: 256 * 1024,
            script_dir: None,
            db_name: "simulated".to_string(),
            log_level: LogLevel::default(),
        }
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(path)?;
                Self::from_toml(&content)?
            }
            None => {
                debug!("No configuration file specified, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(ConfigError::Invalid("Iterations cannot be zero".to_string()).into());
        }

        if self.tasks_per_processor == 0 {
            return Err(
                ConfigError::Invalid("Tasks per processor cannot be zero".to_string()).into(),
            );
        }

        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::Invalid("Shutdown timeout cannot be zero".to_string()).into());
        }

        if self.processors == Some(0) {
            return Err(ConfigError::Invalid("Processor count cannot be zero".to_string()).into());
        }

        self.resolved_pool_size()?;
        Ok(())
    }

    /// Processor count used for sizing pools and fan-out
    pub fn processor_count(&self) -> usize {
        self.processors.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Pool size after resolving relative values
    pub fn resolved_pool_size(&self) -> Result<usize> {
        normalize_pool_size(self.pool_size, self.processor_count())
    }

    /// Number of cpu/resource chains forked per iteration
    pub fn chains_per_iteration(&self) -> usize {
        (self.processor_count() * self.tasks_per_processor / 2).max(1)
    }

    /// Bound on bounded-pool shutdown
    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Resolve a pool size parameter against the processor count.
///
/// Positive values are taken as is; zero and negative values are added to
/// `processors`, so `-1` means "one less than the number of processors".
pub fn normalize_pool_size(pool_size: i64, processors: usize) -> Result<usize> {
    if pool_size > 0 {
        return Ok(pool_size as usize);
    }

    let resolved = processors as i64 + pool_size;
    if resolved <= 0 {
        return Err(ConfigError::Invalid(format!(
            "Pool size cannot be set to {}, because the number of available processors is {}",
            pool_size, processors
        ))
        .into());
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_normalize_pool_size() {
        assert_eq!(normalize_pool_size(3, 8).unwrap(), 3);
        assert_eq!(normalize_pool_size(0, 8).unwrap(), 8);
        assert_eq!(normalize_pool_size(-1, 8).unwrap(), 7);
        assert!(matches!(
            normalize_pool_size(-8, 8),
            Err(Error::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_fork_type_parsing() {
        assert_eq!(
            "limited-executor".parse::<ForkType>().unwrap(),
            ForkType::LimitedExecutor
        );
        assert_eq!(
            "VIRTUAL_THREADS".parse::<ForkType>().unwrap(),
            ForkType::VirtualThreads
        );
        assert!("fibers".parse::<ForkType>().is_err());
        assert_eq!(ForkType::VirtualThreads.to_string(), "virtual-threads");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = BenchConfig::from_toml(
            r#"
            fork_type = "virtual-threads"
            pool_size = -1
            processors = 4
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.fork_type, ForkType::VirtualThreads);
        assert_eq!(config.resolved_pool_size().unwrap(), 3);
        assert_eq!(config.iterations, 5);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.chains_per_iteration(), 8);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = BenchConfig {
            iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BenchConfig {
            pool_size: -4,
            processors: Some(2),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_selection() {
        let config = BenchConfig {
            fork_type: ForkType::VirtualThreads,
            script_dir: Some(PathBuf::from("scripts")),
            ..Default::default()
        };
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("fork_type = \"virtual-threads\""));

        let parsed = BenchConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.fork_type, ForkType::VirtualThreads);
        assert_eq!(parsed.script_dir, Some(PathBuf::from("scripts")));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loomdb.toml");
        std::fs::write(&path, "iterations = 2\ncpu_sleep_ms = 5\n").unwrap();

        let config = BenchConfig::load(Some(&path)).unwrap();
        assert_eq!(config.iterations, 2);
        assert_eq!(config.cpu_sleep_ms, 5);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            BenchConfig::load(Some(&missing)),
            Err(Error::Io(_))
        ));
    }
}
