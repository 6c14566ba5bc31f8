//! Apply a mutation plan read from a JSON file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use sheet_core::MutationPlan;

use super::{OutputFormat, StoreArgs, print_receipt};

/// Apply a JSON mutation plan
#[derive(Parser)]
pub struct Apply {
    /// Plan file
    #[arg(value_name = "PLAN")]
    plan: PathBuf,

    /// Only validate the plan; touch nothing
    #[arg(long)]
    dry_run: bool,

    /// Print the audit entries recorded while applying
    #[arg(long)]
    audit: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: OutputFormat,
}

impl Apply {
    pub async fn execute(self, store: &StoreArgs) -> Result<()> {
        let bytes = std::fs::read(&self.plan)
            .with_context(|| format!("Failed to read plan file: {}", self.plan.display()))?;
        let plan: MutationPlan = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse plan file: {}", self.plan.display()))?;

        if self.dry_run {
            let validated = plan.validate().context("Plan is invalid")?;
            println!(
                "{} {} create, {} delete, {} set, {} add, {} derive",
                style("Plan is valid:").bold().green(),
                validated.create.len(),
                validated.delete.len(),
                validated.set.values().map(Vec::len).sum::<usize>(),
                validated.add.len(),
                validated.derive.len(),
            );
            return Ok(());
        }

        let runtime = store.open(true).await?;
        let audited_before = runtime.guard().audit().len();
        let result = runtime.coordinator().apply(plan).await;

        if self.audit {
            let applied = runtime
                .guard()
                .audit()
                .len()
                .saturating_sub(audited_before);
            let mut entries = runtime.guard().audit().recent(applied);
            entries.reverse();
            println!("{}", style("Audit").bold().cyan());
            for entry in entries {
                println!(
                    "  {} {} entity {} by {} ({} change(s){})",
                    entry.timestamp.format("%H:%M:%S%.3f"),
                    entry.mutation_kind,
                    entry.entity_id,
                    entry.caller_id,
                    entry.change_count,
                    if entry.authorized { "" } else { ", UNAUTHORIZED" },
                );
            }
        }

        let receipt = result.context("Plan was not applied")?;
        print_receipt(&receipt, self.format)
    }
}
