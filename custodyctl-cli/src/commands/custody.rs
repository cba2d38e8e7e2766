//! Custody command - the request/approve/reject/return workflow

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use custodyctl_core::{CashCustody, Currency, CustodyDetails, CustodyStatus, NewCustody, Profile};
use custodyctl_store::{CustodyFilter, CustodyRepo, Pagination};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::Context;
use crate::ui;

#[derive(Parser, Debug)]
pub struct CustodyArgs {
    #[command(subcommand)]
    pub command: CustodyCommand,
}

#[derive(Subcommand, Debug)]
pub enum CustodyCommand {
    /// List custody records, newest first
    List {
        /// pending, approved, rejected or returned
        #[arg(long)]
        status: Option<CustodyStatus>,
        /// Records where this user is treasurer or cashier
        #[arg(long)]
        party: Option<Uuid>,
        #[arg(long)]
        wallet: Option<Uuid>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        per_page: u32,
        /// Attach treasurer, cashier and wallet
        #[arg(long)]
        details: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show one record
    Show {
        id: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Hand custody to a cashier (acting user is the treasurer unless --treasurer)
    Request {
        #[arg(long)]
        cashier: Uuid,
        #[arg(long)]
        wallet: Uuid,
        /// ISO 4217 code, e.g. USD
        #[arg(long)]
        currency: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        treasurer: Option<Uuid>,
    },
    /// Accept a pending custody
    Approve { id: Uuid },
    /// Refuse a pending custody
    Reject {
        id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Hand an approved custody back
    Return {
        id: Uuid,
        #[arg(long, default_value = "")]
        notes: String,
    },
}

pub async fn run(ctx: &Context, args: CustodyArgs) -> Result<()> {
    let store = ctx.store().await?;
    let repo = CustodyRepo::new(&store);

    match args.command {
        CustodyCommand::List {
            status,
            party,
            wallet,
            page,
            per_page,
            details,
            json,
        } => {
            let filter = CustodyFilter {
                status,
                party_id: party,
                wallet_id: wallet,
                ..Default::default()
            };
            let page = Pagination::new(page, per_page);
            if details {
                let listed = repo.list_detailed(&filter, page).await?;
                if json {
                    return ui::print_json(&listed);
                }
                for d in &listed.items {
                    print_details(d);
                }
                println!("page {}/{} ({} records)", listed.page, listed.total_pages(), listed.total);
            } else {
                let listed = repo.list(&filter, page).await?;
                if json {
                    return ui::print_json(&listed);
                }
                for c in &listed.items {
                    print_row(c);
                }
                println!("page {}/{} ({} records)", listed.page, listed.total_pages(), listed.total);
            }
        }
        CustodyCommand::Show { id, json } => {
            let custody = repo.get(id).await?;
            if json {
                return ui::print_json(&custody);
            }
            print_row(&custody);
            if !custody.notes.is_empty() {
                println!("  notes: {}", custody.notes);
            }
            if let Some(original) = custody.original_custody_id {
                println!("  returns: {original}");
            }
        }
        CustodyCommand::Request {
            cashier,
            wallet,
            currency,
            amount,
            notes,
            treasurer,
        } => {
            let treasurer = match treasurer {
                Some(id) => id,
                None => ctx.require_user()?,
            };
            let custody = repo
                .request(&NewCustody {
                    treasurer_id: treasurer,
                    cashier_id: cashier,
                    wallet_id: wallet,
                    currency: Currency::parse(&currency)?,
                    amount,
                    notes,
                })
                .await
                .context("Failed to request custody")?;
            println!("✓ custody {} requested ({} {})", custody.id, custody.amount, custody.currency);
        }
        CustodyCommand::Approve { id } => {
            let custody = repo.approve(id).await.context("Failed to approve custody")?;
            println!("✓ custody {} approved", custody.id);
        }
        CustodyCommand::Reject { id, reason } => {
            let custody = repo
                .reject(id, reason.as_deref())
                .await
                .context("Failed to reject custody")?;
            println!("✓ custody {} rejected", custody.id);
        }
        CustodyCommand::Return { id, notes } => {
            let returned = repo
                .return_custody(id, &notes)
                .await
                .context("Failed to return custody")?;
            println!("✓ custody {id} returned as {}", returned.id);
        }
    }
    Ok(())
}

fn print_row(c: &CashCustody) {
    println!(
        "{}  {:<9} {:>12} {}  {} -> {}{}",
        c.id,
        c.status.as_str(),
        c.amount.to_string(),
        c.currency.as_str(),
        c.treasurer_id,
        c.cashier_id,
        if c.is_returned && c.status != CustodyStatus::Returned {
            "  (returned)"
        } else {
            ""
        }
    );
}

fn print_details(d: &CustodyDetails) {
    let name = |p: &Option<Profile>, id: Uuid| {
        p.as_ref()
            .map(|p| {
                if p.full_name.is_empty() {
                    p.email.clone()
                } else {
                    p.full_name.clone()
                }
            })
            .unwrap_or_else(|| id.to_string())
    };
    let c = &d.custody;
    println!(
        "{}  {:<9} {:>12} {}  {} -> {}  [{}]",
        c.id,
        c.status.as_str(),
        c.amount.to_string(),
        c.currency.as_str(),
        name(&d.treasurer, c.treasurer_id),
        name(&d.cashier, c.cashier_id),
        d.wallet
            .as_ref()
            .map(|w| w.name.as_str())
            .unwrap_or("unknown wallet")
    );
}
