//! Print one entity.

use anyhow::Result;
use clap::Parser;
use console::style;

use super::{OutputFormat, StoreArgs, require_entity};

/// Print one entity
#[derive(Parser)]
pub struct Show {
    /// Entity id
    #[arg(value_name = "ID")]
    id: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: OutputFormat,
}

impl Show {
    pub async fn execute(self, store: &StoreArgs) -> Result<()> {
        let runtime = store.open(true).await?;
        let entity = require_entity(&runtime, self.id).await?;

        if let OutputFormat::Json = self.format {
            println!("{}", serde_json::to_string_pretty(&entity)?);
            return Ok(());
        }

        println!(
            "{} {} ({}, id {})",
            style("Entity").bold().green(),
            entity.name,
            entity.kind,
            entity.id
        );
        for (label, set) in [
            ("base", &entity.base),
            ("derived", &entity.derived),
            ("flags", &entity.flags),
        ] {
            if set.is_empty() {
                continue;
            }
            println!("{}", style(label).bold().yellow());
            for (path, value) in set.iter() {
                println!("  {path} = {value}");
            }
        }
        if !entity.owned().is_empty() {
            println!("{}", style("owned").bold().yellow());
            for record in entity.owned() {
                println!(
                    "  [{}] {} ({}{}), {} rule(s)",
                    record.id,
                    record.name,
                    record.kind,
                    if record.active { "" } else { ", inactive" },
                    record.rules.len()
                );
            }
        }
        Ok(())
    }
}
