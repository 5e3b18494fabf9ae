//! Pools for threads and for scarce resources.
//!
//! - A bounded thread pool backing the pooled fork substrate
//! - A fixed-capacity resource pool with lazy creation and reuse
//! - A semaphore-gated wrapper that makes excess acquirers wait

pub mod fixed;
pub mod gated;
pub mod thread;

pub use fixed::{FixedPool, PooledResource, ResourceFactory};
pub use gated::GatedPool;
pub use thread::{ThreadPool, ThreadPoolConfig, ThreadPoolStats};
