//! Seed command - pending test custodies for a set of cashiers

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use custodyctl_core::{Currency, RoleName, SeedPlan};
use custodyctl_store::{seed, ProfileRepo, WalletRepo};
use uuid::Uuid;

use super::Context;
use crate::ui;

#[derive(Parser, Debug)]
pub struct SeedArgs {
    /// Treasurer handing out the custodies (defaults to --as-user)
    #[arg(long)]
    pub treasurer: Option<Uuid>,

    /// Cashiers to seed for (defaults to every cashier)
    #[arg(long, value_delimiter = ',')]
    pub users: Vec<Uuid>,

    /// Currency codes (defaults to the config file list)
    #[arg(long, value_delimiter = ',')]
    pub currencies: Vec<String>,

    /// Rows per insert statement
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Print the plan without inserting
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub async fn run(ctx: &Context, args: SeedArgs) -> Result<()> {
    let treasurer = match args.treasurer {
        Some(id) => id,
        None => ctx
            .require_user()
            .context("seed needs a treasurer: pass --treasurer or --as-user")?,
    };
    let settings = &ctx.settings.seed;
    let range = settings.amount_range()?;
    let batch_size = args.batch_size.unwrap_or(settings.batch_size);
    let codes = if args.currencies.is_empty() {
        settings.currencies.clone()
    } else {
        args.currencies
    };
    let currencies = codes
        .iter()
        .map(|code| Currency::parse(code))
        .collect::<Result<Vec<_>, _>>()?;

    let store = ctx.store().await?;
    let users = if args.users.is_empty() {
        ProfileRepo::new(&store)
            .list()
            .await?
            .into_iter()
            .filter(|p| p.role.as_deref() == Some(RoleName::Cashier.as_str()))
            .map(|p| p.profile.id)
            .filter(|id| *id != treasurer)
            .collect()
    } else {
        args.users
    };
    if users.is_empty() {
        bail!("no cashiers to seed for");
    }
    let wallets = WalletRepo::new(&store).list().await?;

    let plan = SeedPlan::build(
        treasurer,
        &users,
        &currencies,
        &wallets,
        range,
        &mut rand::thread_rng(),
    )?;

    println!(
        "{} custodies for {} cashiers in {} ({} in total)",
        plan.len(),
        users.len(),
        codes.join(", "),
        plan.total()
    );
    if args.dry_run {
        for record in &plan.records {
            println!(
                "  {} {:>12} {}",
                record.cashier_id,
                record.amount.to_string(),
                record.currency
            );
        }
        return Ok(());
    }
    if !ui::confirm("Insert these records?", args.yes)? {
        println!("Aborted");
        return Ok(());
    }

    let pb = ui::progress_bar(plan.len() as u64, "Seeding");
    let result = seed::insert_plan(&store, &plan, batch_size, |done| {
        if let Some(pb) = &pb {
            pb.set_position(done as u64);
        }
    })
    .await;

    match result {
        Ok(inserted) => {
            ui::finish_success(pb, format!("{inserted} custodies inserted"));
            if ui::is_quiet() {
                println!("{inserted}");
            }
            Ok(())
        }
        Err(e) => {
            ui::finish_error(pb, "Seeding stopped");
            Err(e).context("Seeding failed; earlier batches stay committed")
        }
    }
}
