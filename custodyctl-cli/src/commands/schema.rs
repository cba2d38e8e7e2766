//! Schema command - read-only introspection

use anyhow::Result;
use clap::{Parser, Subcommand};
use custodyctl_store::introspect;

use super::Context;
use crate::ui;

#[derive(Parser, Debug)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommand,
}

#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Describe a table: columns, policies and constraints
    Inspect {
        table: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that a table (and optionally a column) exists; exits non-zero if not
    Check { table: String, column: Option<String> },
}

pub async fn run(ctx: &Context, args: SchemaArgs) -> Result<()> {
    let store = ctx.owner_store().await?;
    let mut conn = store.pool().acquire().await?;

    match args.command {
        SchemaCommand::Inspect { table, json } => {
            let summary = introspect::describe_table(&mut conn, &table).await?;
            if json {
                return ui::print_json(&summary);
            }
            if !summary.exists {
                println!("{table}: does not exist");
                return Ok(());
            }
            println!(
                "{} (row-level security {})",
                summary.table,
                if summary.row_level_security { "on" } else { "off" }
            );
            for column in &summary.columns {
                println!(
                    "  {:<24} {:<28} {}{}",
                    column.name,
                    column.data_type,
                    if column.is_nullable { "null" } else { "not null" },
                    column
                        .default
                        .as_deref()
                        .map(|d| format!(" default {d}"))
                        .unwrap_or_default()
                );
            }
            if !summary.constraints.is_empty() {
                println!("  constraints: {}", summary.constraints.join(", "));
            }
            if !summary.policies.is_empty() {
                println!("  policies: {}", summary.policies.join(", "));
            }
        }
        SchemaCommand::Check { table, column } => {
            let exists = match &column {
                Some(column) => introspect::column_exists(&mut conn, &table, column).await?,
                None => introspect::table_exists(&mut conn, &table).await?,
            };
            let name = match &column {
                Some(column) => format!("{table}.{column}"),
                None => table,
            };
            if !exists {
                anyhow::bail!("{name} does not exist");
            }
            println!("✓ {name} exists");
        }
    }
    Ok(())
}
