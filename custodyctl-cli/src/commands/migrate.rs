//! Migrate command - schema, roles and access policies
//!
//! Every step is idempotent; `migrate all` is safe to run on every deploy.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use custodyctl_core::PolicySet;
use custodyctl_store::migrations::{self, AddColumn};

use super::Context;
use crate::ui;

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommand,
}

#[derive(Subcommand, Debug)]
pub enum MigrateCommand {
    /// Run every migration in order
    All,
    /// Create tables, views, indexes and the action payload column
    Schema,
    /// Insert the fixed roles and give role-less profiles the default role
    Roles,
    /// Install row-level security policies
    Policies {
        /// Print the SQL instead of executing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Add a column to a table if it is missing
    AddColumn {
        /// Table name
        table: String,
        /// Column name
        column: String,
        /// SQL type (e.g. "JSONB NOT NULL DEFAULT '{}'")
        #[arg(long = "type", default_value = "TEXT")]
        sql_type: String,
    },
}

pub async fn run(ctx: &Context, args: MigrateArgs) -> Result<()> {
    let policies = PolicySet::standard();

    if let MigrateCommand::Policies { dry_run: true } = args.command {
        policies.validate()?;
        for statement in policies.to_sql() {
            println!("{statement};");
        }
        return Ok(());
    }

    let store = ctx.owner_store().await?;
    let pool = store.pool();

    match args.command {
        MigrateCommand::All => {
            ui::with_spinner_async(
                "Running migrations",
                "Migrations applied",
                migrations::run_all(pool, &policies),
            )
            .await
            .context("Migration failed")?;
        }
        MigrateCommand::Schema => {
            migrations::schema(pool).await.context("Schema migration failed")?;
            migrations::action_payload(pool)
                .await
                .context("action_payload migration failed")?;
            println!("✓ Schema up to date");
        }
        MigrateCommand::Roles => {
            migrations::roles(pool).await.context("Role migration failed")?;
            println!("✓ Roles up to date");
        }
        MigrateCommand::Policies { .. } => {
            migrations::app_role(pool).await?;
            let installed = migrations::install_policies(pool, &policies)
                .await
                .context("Policy installation failed")?;
            println!("✓ {installed} policies installed");
        }
        MigrateCommand::AddColumn {
            table,
            column,
            sql_type,
        } => match migrations::add_column(pool, &table, &column, &sql_type).await? {
            AddColumn::Added => println!("✓ Added {table}.{column}"),
            AddColumn::AlreadyPresent => println!("{table}.{column} already exists"),
        },
    }
    Ok(())
}
