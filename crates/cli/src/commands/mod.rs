//! Subcommands and the helpers they share.

mod apply;
mod hydrate;
mod ledger;
mod show;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use sheet_core::{Entity, EntityId};
use sheet_runtime::{
    FileEntityStore, GuardMode, MutationReceipt, RuntimeConfig, SheetRuntime,
};

pub use apply::Apply;
pub use hydrate::Hydrate;
pub use ledger::{Purchase, Resale, Sell};
pub use show::Show;

/// Where the entities live and how writes are governed.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Store directory (defaults to platform-specific location)
    #[arg(long, global = true, env = "SHEET_STORE_DIR", value_name = "DIR")]
    store: Option<PathBuf>,

    /// Guard mode override: permissive or strict (otherwise SHEET_GUARD_MODE)
    #[arg(long, global = true, value_parser = parse_guard_mode, value_name = "MODE")]
    guard_mode: Option<GuardMode>,
}

impl StoreArgs {
    pub fn store_dir(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(crate::dirs::store_dir)
    }

    /// Opens the store and assembles a runtime over it.
    ///
    /// With `hydrate`, derived state is recomputed before returning.
    pub async fn open(&self, hydrate: bool) -> Result<SheetRuntime> {
        let dir = self.store_dir();
        let store = FileEntityStore::new(&dir)
            .with_context(|| format!("Failed to open store: {}", dir.display()))?;

        let mut config = RuntimeConfig::from_env();
        if let Some(mode) = self.guard_mode {
            config.guard_mode = mode;
        }
        tracing::debug!(store = %dir.display(), ?config, "opening runtime");

        SheetRuntime::builder()
            .store(store)
            .config(config)
            .hydrate_on_build(hydrate)
            .build()
            .await
            .context("Failed to assemble runtime")
    }
}

fn parse_guard_mode(raw: &str) -> Result<GuardMode, String> {
    GuardMode::parse(raw).ok_or_else(|| format!("unknown guard mode '{raw}'"))
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Summary,
    /// Pretty-printed JSON
    Json,
}

pub async fn require_entity(runtime: &SheetRuntime, id: u64) -> Result<Entity> {
    runtime
        .entity(EntityId(id))
        .await?
        .with_context(|| format!("Entity {id} not found"))
}

pub fn print_receipt(receipt: &MutationReceipt, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(receipt)?);
        }
        OutputFormat::Summary => {
            let header = if receipt.is_degraded() {
                style("Plan applied (degraded)").bold().yellow()
            } else {
                style("Plan applied").bold().green()
            };
            println!("{header}");
            for (temp, id) in &receipt.created {
                println!("  {} ${temp} -> {id}", style("created").cyan());
            }
            println!("  {} {}", style("touched").cyan(), join_ids(&receipt.touched));
            if !receipt.deleted.is_empty() {
                println!("  {} {}", style("deleted").cyan(), join_ids(&receipt.deleted));
            }
            for delta in &receipt.deltas {
                println!(
                    "  {} entity {}: {} change(s)",
                    style("delta").cyan(),
                    delta.entity,
                    delta.change_count()
                );
            }
            for warning in &receipt.warnings {
                println!("  {} {warning}", style("warning").yellow());
            }
        }
    }
    Ok(())
}

fn join_ids(ids: &[EntityId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
