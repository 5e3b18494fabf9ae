//! Error types for the loomdb harness.
//!
//! Each subsystem has its own error enum. The root error type, `Error`,
//! wraps all of them so a forked task, a pool operation and a script load
//! can all be reported through the same channel.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Root error type for loomdb.
#[derive(Debug, Error)]
pub enum Error {
    /// Fork scope and worker pool errors
    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    /// Resource pool errors
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Script loading errors
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A task body failed
    #[error("Task failed: {0}")]
    Task(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a task failure from anything printable.
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task(message.into())
    }
}

/// Errors raised by fork scopes and their execution substrates.
#[derive(Debug, Error)]
pub enum ConcurrencyError {
    /// The substrate no longer accepts tasks
    #[error("Substrate is shutting down")]
    ShuttingDown,

    /// The bounded worker pool did not drain in time
    #[error("Worker pool did not terminate within {0:?}")]
    ShutdownTimeout(Duration),

    /// A forked task panicked
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// A forked task was discarded before it could run
    #[error("Task was dropped before it ran")]
    TaskDropped,

    /// A worker or task thread could not be started
    #[error("Failed to spawn thread: {0}")]
    SpawnFailed(String),
}

/// Errors raised by the fixed-capacity resource pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool capacity must be at least one
    #[error("Invalid pool capacity: {0}")]
    InvalidCapacity(usize),

    /// More resources were requested than the pool can hold
    #[error("Requested too many resources (capacity {capacity})")]
    CapacityExceeded {
        /// The fixed capacity of the pool
        capacity: usize,
    },

    /// The pool has been closed
    #[error("The pool is closed")]
    Closed,

    /// A resource was returned although none was checked out
    #[error("Returned too many resources")]
    TooManyReturned,
}

/// Errors raised while loading SQL scripts.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script file exists but could not be read
    #[error("Failed to read script {path}: {source}")]
    Read {
        /// Path of the script file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while building the harness configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Unknown fork type name
    #[error("Unknown fork type: {0} (expected limited-executor or virtual-threads)")]
    UnknownForkType(String),

    /// Unknown log level name
    #[error("Unknown log level: {0}")]
    UnknownLogLevel(String),
}

/// Result type used throughout loomdb.
pub type Result<T> = std::result::Result<T, Error>;
