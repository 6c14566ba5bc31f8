//! Operator tool for file-backed character-sheet stores.
//!
//! Every command opens the store, recomputes derived state (persisted derived
//! values are never trusted) and then does its work through the mutation
//! coordinator, so writes made here are authorized and audited like any other.
//!
//! ```bash
//! sheetctl apply plans/purchase.json
//! sheetctl --store ./data show 3 --format json
//! sheetctl purchase 1 500 "Heavy Blaster" --kind equipment
//! sheetctl resale 1000
//! ```

mod commands;
mod dirs;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use commands::{Apply, Hydrate, Purchase, Resale, Sell, Show, StoreArgs};

/// Inspect and mutate character-sheet entities
#[derive(Parser)]
#[command(name = "sheetctl")]
#[command(about = "Character-sheet store tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Apply a JSON mutation plan
    Apply(Apply),

    /// Print one entity
    Show(Show),

    /// Recompute derived state for every stored entity
    Hydrate(Hydrate),

    /// Buy an item: debit credits and grant the record in one plan
    Purchase(Purchase),

    /// Sell an owned record for its resale value
    Sell(Sell),

    /// Print the resale value of an item
    Resale(Resale),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (for SHEET_* configuration)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = logging::setup_logging(cli.log_file.as_deref())?;

    match cli.command {
        Command::Apply(cmd) => cmd.execute(&cli.store).await,
        Command::Show(cmd) => cmd.execute(&cli.store).await,
        Command::Hydrate(cmd) => cmd.execute(&cli.store).await,
        Command::Purchase(cmd) => cmd.execute(&cli.store).await,
        Command::Sell(cmd) => cmd.execute(&cli.store).await,
        Command::Resale(cmd) => cmd.execute(),
    }
}
