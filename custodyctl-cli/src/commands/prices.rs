//! Prices command - manager prices singleton

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use custodyctl_core::{ManagerPrices, PriceStep};
use custodyctl_store::PriceRepo;
use rust_decimal::Decimal;

use super::Context;
use crate::ui;

#[derive(Parser, Debug)]
pub struct PricesArgs {
    #[command(subcommand)]
    pub command: PricesCommand,
}

#[derive(Subcommand, Debug)]
pub enum PricesCommand {
    /// Show current prices
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Set prices (managers only)
    Set {
        #[arg(long)]
        sell_old: Decimal,
        #[arg(long)]
        sell_new: Decimal,
        #[arg(long)]
        buy_old: Decimal,
        #[arg(long)]
        buy_new: Decimal,
    },
    /// Rename legacy price columns and make sure the singleton row exists
    Normalize,
}

pub async fn run(ctx: &Context, args: PricesArgs) -> Result<()> {
    match args.command {
        PricesCommand::Show { json } => {
            let store = ctx.store().await?;
            let prices = PriceRepo::new(&store).get().await?;
            if json {
                ui::print_json(&prices)?;
            } else {
                print_prices(&prices);
            }
        }
        PricesCommand::Set {
            sell_old,
            sell_new,
            buy_old,
            buy_new,
        } => {
            let store = ctx.store().await?;
            let prices = PriceRepo::new(&store)
                .update(&ManagerPrices {
                    sell_old,
                    sell_new,
                    buy_old,
                    buy_new,
                })
                .await
                .context("Failed to update prices")?;
            print_prices(&prices);
        }
        PricesCommand::Normalize => {
            let store = ctx.owner_store().await?;
            let plan = PriceRepo::new(&store)
                .normalize()
                .await
                .context("Price column rename failed")?;
            if plan.is_empty() {
                println!("manager_prices already uses the current layout");
            }
            for step in &plan.steps {
                let field = step.field();
                match step {
                    PriceStep::Rename(_) => {
                        println!("✓ renamed {} -> {}", field.legacy(), field.column())
                    }
                    PriceStep::Merge(_) => println!(
                        "✓ merged {} into {} and dropped it",
                        field.legacy(),
                        field.column()
                    ),
                    PriceStep::Add(_) => println!("✓ added {}", field.column()),
                }
            }
        }
    }
    Ok(())
}

fn print_prices(prices: &ManagerPrices) {
    println!("           old        new");
    println!("sell  {:>10} {:>10}", prices.sell_old, prices.sell_new);
    println!("buy   {:>10} {:>10}", prices.buy_old, prices.buy_new);
}
