//! CLI commands.

mod rebalance;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// allocctl - preview and replay allocation rebalances.
#[derive(Debug, Parser)]
#[command(name = "allocctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Log level when RUST_LOG is unset.
    #[arg(long, global = true, env = "ALLOCSYNC_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Distribute a delta across an allocation file.
    Rebalance(rebalance::RebalanceCommand),
}

impl Cli {
    pub fn log_level(&self) -> String {
        self.log_level.clone()
    }

    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Rebalance(cmd) => cmd.run(self.format),
        }
    }
}
