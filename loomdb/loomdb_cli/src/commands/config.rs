//! Print the effective configuration

use anyhow::{Context, Result};
use clap::Args;

use loomdb_core::config::BenchConfig;

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {}

/// Print `config` as TOML
pub fn execute(_args: &ConfigArgs, config: &BenchConfig) -> Result<()> {
    let rendered = config
        .to_toml()
        .context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
