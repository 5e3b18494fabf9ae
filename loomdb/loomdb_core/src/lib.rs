#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # loomdb Core
//!
//! `loomdb_core` provides the shared building blocks of the loomdb
//! benchmark harness, which measures how concurrency strategies (a bounded
//! worker pool vs. one lightweight thread per task) behave when many workers
//! compete for a scarce pooled resource.
//!
//! ## Crate Structure
//!
//! - **error**: Error types for every loomdb component
//! - **traits**: `ForkScope` (structured fan-out) and `Resource` (pooled resource)
//! - **config**: Benchmark configuration and pool size resolution
//! - **utils**: Log level parsing

pub mod config;
pub mod error;
pub mod traits;
pub mod utils;

// Re-export key types and traits for convenience
pub use config::{normalize_pool_size, BenchConfig, ForkType};
pub use error::{ConcurrencyError, ConfigError, Error, PoolError, Result, ScriptError};
pub use traits::{ForkScope, ForkScopeExt, Resource, Task};
pub use utils::LogLevel;
