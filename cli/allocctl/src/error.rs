//! Error handling and display for the CLI.

use allocsync_rebalance::{InvalidRebalanceInput, RebalanceError};
use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Could not read input {path}: {source}")]
    Input {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid input document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Pass exactly one of --delta or --used.")]
    DeltaSource,
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(rebalance_err) = err.downcast_ref::<RebalanceError>() {
        match rebalance_err {
            RebalanceError::InvalidInput(InvalidRebalanceInput::ReductionExceedsTotal {
                ..
            }) => {
                eprintln!(
                    "\n{}",
                    "Hint: a reduction can't take more than the allocations hold.".yellow()
                );
            }
            RebalanceError::InternalInvariantViolation(_) => {
                eprintln!(
                    "\n{}",
                    "This is a bug in the rebalancer. Please report it with the input file."
                        .yellow()
                );
            }
            _ => {}
        }
    }

    if let Some(CliError::Parse(_)) = err.downcast_ref::<CliError>() {
        eprintln!(
            "\n{}",
            "Hint: expected {\"allocations\": [{\"id\": ..., \"amount\": \"...\"}], \"delta\": \"...\"}"
                .yellow()
        );
    }
}
