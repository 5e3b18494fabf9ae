#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # loomdb Concurrency
//!
//! Execution substrates, structured fan-out and resource pooling for the
//! loomdb harness.
//!
//! This crate provides:
//!
//! - Fork scopes: nested join barriers with first-failure capture
//! - Two substrates with the same contract: a bounded worker pool and one
//!   small-stack thread per task
//! - A fixed-capacity resource pool and a semaphore-gated front for it
//! - The lock-free counters and signals the scopes are built from
//!
//! ## Integration with Other loomdb Crates
//!
//! - **loomdb_core**: `ForkScope`, `Resource`, errors and configuration
//! - **loomdb_cli**: composes a tracked substrate and a gated pool per run

/// Structured fan-out over the execution substrates
pub mod scope;

/// Worker pool and resource pools
pub mod pool;

/// Synchronization primitives used by scopes and pools
pub mod sync;

// Re-export key types for easier access
pub use pool::{FixedPool, GatedPool, PooledResource, ThreadPool, ThreadPoolStats};
pub use scope::{ChildScope, ExceptionTracker, Substrate, ThreadPerTaskScope, ThreadPoolScope};
