//! Recompute derived state for the whole store.

use anyhow::Result;
use clap::Parser;
use console::style;

use super::StoreArgs;

/// Recompute derived state for every stored entity
#[derive(Parser)]
pub struct Hydrate;

impl Hydrate {
    pub async fn execute(self, store: &StoreArgs) -> Result<()> {
        let runtime = store.open(false).await?;
        let report = runtime.hydrate().await?;

        println!(
            "{} {} entities in {}",
            style("Recomputed").bold().green(),
            report.recomputed.len(),
            store.store_dir().display()
        );
        for warning in &report.warnings {
            println!("  {} {warning}", style("warning").yellow());
        }
        Ok(())
    }
}
