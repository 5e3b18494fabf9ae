use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use loomdb_core::config::BenchConfig;
use loomdb_core::utils::LogLevel;

mod bench;
mod commands;
mod report;

use commands::config::ConfigArgs;
use commands::run::RunArgs;
use commands::split::SplitArgs;

/// loomdb benchmark harness
///
/// Compares a bounded worker pool with one lightweight thread per task when
/// many workers compete for a small pool of connections.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration file (RUST_LOG wins over both)
    #[clap(long, global = true)]
    log_level: Option<LogLevel>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulated benchmark
    Run(RunArgs),

    /// Split a SQL script into statements
    Split(SplitArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}

fn init_logging(level: LogLevel) {
    let filter = level.to_level_filter().to_string();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BenchConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Invalid default configuration".to_string(),
    })?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(config.log_level);

    match &cli.command {
        Commands::Run(args) => commands::run::execute(args, config),
        Commands::Split(args) => commands::split::execute(args),
        Commands::Config(args) => commands::config::execute(args, &config),
    }
}
