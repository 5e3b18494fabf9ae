//! Split a SQL script into statements

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::debug;

use loomdb_script::split_statements;

/// Arguments for the split command
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// SQL script to split
    pub file: PathBuf,

    /// Print the statements as a JSON array
    #[clap(long)]
    pub json: bool,
}

/// Print the statements of a script file
pub fn execute(args: &SplitArgs) -> Result<()> {
    let script = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let statements = split_statements(&script);
    debug!(
        "Split {} into {} statements",
        args.file.display(),
        statements.len()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statements)?);
    } else {
        println!("{}", statements.join("\n\n"));
    }
    Ok(())
}
