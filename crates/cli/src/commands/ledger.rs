//! Purchases, sales and resale values.

use anyhow::{Context, Result};
use clap::Parser;
use sheet_core::{RecordId, RecordKind, RecordSpec, ledger};

use super::{OutputFormat, StoreArgs, print_receipt, require_entity};

/// Buy an item for an entity
#[derive(Parser)]
pub struct Purchase {
    /// Buying entity
    #[arg(value_name = "ENTITY")]
    entity: u64,

    /// Price in credits
    #[arg(value_name = "COST")]
    cost: u64,

    /// Name of the granted record
    #[arg(value_name = "NAME")]
    name: String,

    /// Kind of the granted record
    #[arg(long, default_value = "item", value_parser = parse_record_kind)]
    kind: RecordKind,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: OutputFormat,
}

impl Purchase {
    pub async fn execute(self, store: &StoreArgs) -> Result<()> {
        let runtime = store.open(true).await?;
        let buyer = require_entity(&runtime, self.entity).await?;

        let record = RecordSpec::new(self.kind, self.name);
        let plan = ledger::build_purchase(&buyer, self.cost, record)
            .context("Purchase refused")?;
        let receipt = runtime
            .coordinator()
            .apply(plan)
            .await
            .context("Purchase was not applied")?;
        print_receipt(&receipt, self.format)
    }
}

/// Sell an owned record
#[derive(Parser)]
pub struct Sell {
    /// Selling entity
    #[arg(value_name = "ENTITY")]
    entity: u64,

    /// Owned record to sell
    #[arg(value_name = "RECORD")]
    record: u64,

    /// What the record originally cost
    #[arg(value_name = "ORIGINAL_COST")]
    original_cost: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: OutputFormat,
}

impl Sell {
    pub async fn execute(self, store: &StoreArgs) -> Result<()> {
        let runtime = store.open(true).await?;
        let seller = require_entity(&runtime, self.entity).await?;

        let plan = ledger::build_sale(&seller, RecordId(self.record), self.original_cost)
            .context("Sale refused")?;
        let receipt = runtime
            .coordinator()
            .apply(plan)
            .await
            .context("Sale was not applied")?;
        print_receipt(&receipt, self.format)
    }
}

/// Print the resale value for an original cost
#[derive(Parser)]
pub struct Resale {
    /// Original cost in credits
    #[arg(value_name = "COST")]
    cost: u64,
}

impl Resale {
    pub fn execute(self) -> Result<()> {
        println!("{}", ledger::calculate_resale(self.cost));
        Ok(())
    }
}

fn parse_record_kind(raw: &str) -> Result<RecordKind, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("unknown record kind '{raw}'"))
}
