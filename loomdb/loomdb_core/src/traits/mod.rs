//! Core traits shared by the loomdb crates.
//!
//! - `ForkScope`: structured fan-out execution with a join barrier
//! - `Resource`: a scarce resource managed by a fixed-capacity pool

pub mod concurrency;
pub mod resource;

pub use concurrency::{ForkScope, ForkScopeExt, Task};
pub use resource::Resource;
