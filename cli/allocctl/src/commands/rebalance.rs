//! Rebalance command.

use std::io::Read;
use std::path::PathBuf;

use allocsync_rebalance::{rebalance, AllocationSet, Amount, RebalanceRequest, SignedAmount};
use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tracing::debug;

use crate::error::CliError;
use crate::output::{print_json, print_summary, print_table, OutputFormat};

/// Rebalance command - split a delta over the allocations in a file.
///
/// The input is JSON: either a bare allocation list
/// `[{"id": "...", "amount": "..."}]` or a request object
/// `{"allocations": [...], "delta": "-500"}`.
#[derive(Debug, Args)]
pub struct RebalanceCommand {
    /// Input file, or `-` for stdin.
    #[arg(default_value = "-")]
    input: PathBuf,

    /// Aggregate change to distribute (negative for a reduction).
    #[arg(long, allow_hyphen_values = true, conflicts_with = "used")]
    delta: Option<SignedAmount>,

    /// Target total (e.g. the on-chain used stake); the delta is
    /// `used - sum(amounts)`.
    #[arg(long, conflicts_with = "delta")]
    used: Option<Amount>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputDocument {
    Request(RebalanceRequest<String>),
    Allocations(AllocationSet<String>),
}

#[derive(Debug, Serialize, Tabled)]
struct RebalanceRow {
    #[tabled(rename = "Allocation")]
    id: String,
    #[tabled(rename = "Amount")]
    amount: Amount,
    #[tabled(rename = "Delta")]
    delta: SignedAmount,
    #[tabled(rename = "New Amount")]
    new_amount: Amount,
}

#[derive(Debug, Serialize)]
struct RebalanceReport {
    total: Amount,
    delta: SignedAmount,
    new_total: Amount,
    allocations: Vec<RebalanceRow>,
}

impl RebalanceCommand {
    pub fn run(self, format: OutputFormat) -> Result<()> {
        let document = self.read_input()?;
        let (allocations, file_delta) = match document {
            InputDocument::Request(request) => (request.allocations, Some(request.delta)),
            InputDocument::Allocations(allocations) => (allocations, None),
        };

        let total = allocations.total()?;
        let delta = match (self.delta, self.used, file_delta) {
            (Some(delta), None, _) => delta,
            (None, Some(used), _) => SignedAmount::difference(used, total),
            (None, None, Some(delta)) => delta,
            _ => return Err(CliError::DeltaSource.into()),
        };
        debug!(allocations = allocations.len(), total = %total, delta = %delta, "Rebalancing");

        let result = rebalance(&allocations, delta)?;
        let updated = result.apply(&allocations)?;

        let rows: Vec<RebalanceRow> = allocations
            .iter()
            .zip(updated.iter())
            .map(|(before, after)| RebalanceRow {
                id: before.id.clone(),
                amount: before.amount,
                delta: result.get(&before.id).unwrap_or_default(),
                new_amount: after.amount,
            })
            .collect();

        let report = RebalanceReport {
            total,
            delta,
            new_total: updated.total()?,
            allocations: rows,
        };

        match format {
            OutputFormat::Table => {
                print_table(&report.allocations);
                print_summary("Total", &report.total.to_string());
                print_summary("Delta", &report.delta.to_string());
                print_summary("New total", &report.new_total.to_string());
            }
            OutputFormat::Json => print_json(&report),
        }

        Ok(())
    }

    fn read_input(&self) -> Result<InputDocument, CliError> {
        let display = self.input.display().to_string();
        let mut raw = String::new();
        let read = if display == "-" {
            std::io::stdin().read_to_string(&mut raw)
        } else {
            std::fs::File::open(&self.input).and_then(|mut f| f.read_to_string(&mut raw))
        };
        read.map_err(|source| CliError::Input {
            path: display,
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}
