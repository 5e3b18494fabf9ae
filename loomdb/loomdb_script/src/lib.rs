#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # loomdb Script
//!
//! Turns SQL script text into individually executable statements.
//!
//! - **splitter**: statement splitting that understands quoting, comments,
//!   delimited `q'…'` literals and nested `BEGIN … END` blocks
//! - **loader**: locating and reading per-database setup scripts

pub mod loader;
pub mod splitter;

pub use loader::{load_script_statements, script_path};
pub use splitter::{split_statements, StatementSplitter, MAX_BLOCK_DEPTH};
