//! Roles command - roles, profile assignment and the manager view

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use custodyctl_core::RoleName;
use custodyctl_store::{ProfileRepo, RoleRepo};
use uuid::Uuid;

use super::Context;
use crate::ui;

#[derive(Parser, Debug)]
pub struct RolesArgs {
    #[command(subcommand)]
    pub command: RolesCommand,
}

#[derive(Subcommand, Debug)]
pub enum RolesCommand {
    /// List roles, or profiles with their role
    List {
        /// List profiles instead of roles
        #[arg(long)]
        profiles: bool,
        #[arg(long)]
        json: bool,
    },
    /// Give every profile without a role the default role (manager)
    Backfill {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Assign a role to a user
    Assign {
        user: Uuid,
        /// manager, treasurer, cashier or dealings_executioner
        role: RoleName,
    },
    /// Print the ids in the manager view
    Managers,
}

pub async fn run(ctx: &Context, args: RolesArgs) -> Result<()> {
    match args.command {
        RolesCommand::List { profiles, json } => {
            let store = ctx.store().await?;
            if profiles {
                let profiles = ProfileRepo::new(&store).list().await?;
                if json {
                    return ui::print_json(&profiles);
                }
                for p in profiles {
                    println!(
                        "{}  {:<12} {}",
                        p.profile.id,
                        p.role.as_deref().unwrap_or("-"),
                        p.profile.email
                    );
                }
            } else {
                let roles = RoleRepo::new(&store).list().await?;
                if json {
                    return ui::print_json(&roles);
                }
                for role in roles {
                    println!("{:<22} {}", role.name.as_str(), role.description);
                }
            }
        }
        RolesCommand::Backfill { yes } => {
            let question = format!(
                "Give every profile without a role the '{}' role?",
                RoleName::DEFAULT
            );
            if !ui::confirm(&question, yes)? {
                println!("Aborted");
                return Ok(());
            }
            let store = ctx.owner_store().await?;
            RoleRepo::new(&store).ensure_defaults().await?;
            let updated = ProfileRepo::new(&store)
                .backfill_default_role()
                .await
                .context("Backfill failed")?;
            println!("✓ {updated} profiles updated");
        }
        RolesCommand::Assign { user, role } => {
            let store = ctx.store().await?;
            let profile = ProfileRepo::new(&store)
                .assign_role(user, role)
                .await
                .context("Failed to assign role")?;
            println!("✓ {} is now {role}", profile.email);
        }
        RolesCommand::Managers => {
            let store = ctx.store().await?;
            for id in ProfileRepo::new(&store).manager_ids().await? {
                println!("{id}");
            }
        }
    }
    Ok(())
}
