//! Config command - show the effective configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use custodyctl_core::config::{RedactedConfig, API_KEY_VARS, AUTH_URL_VARS, DATABASE_URL_VARS};
use custodyctl_core::CustodyctlConfig;
use serde::Serialize;

use super::Context;
use crate::ui;

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print environment (secrets masked) and file settings
    Show {
        #[arg(long)]
        json: bool,
    },
    /// List config file locations, highest priority first
    Path,
}

#[derive(Serialize)]
struct Effective<'a> {
    environment: RedactedConfig,
    settings: &'a CustodyctlConfig,
}

pub fn run(ctx: &Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Show { json } => {
            let environment = ctx.env.redacted();
            if json {
                return ui::print_json(&Effective {
                    environment,
                    settings: &ctx.settings,
                });
            }
            println!("# environment");
            for (name, value) in [
                (DATABASE_URL_VARS[0], &environment.database_url),
                (AUTH_URL_VARS[0], &environment.auth_url),
                (API_KEY_VARS[0], &environment.api_key),
            ] {
                println!("{name} = {}", value.as_deref().unwrap_or("(unset)"));
            }
            println!();
            print!("{}", toml::to_string_pretty(&ctx.settings)?);
        }
        ConfigCommand::Path => {
            for path in CustodyctlConfig::search_paths().into_iter().rev() {
                let marker = if path.exists() { "✓" } else { " " };
                println!("{marker} {}", path.display());
            }
        }
    }
    Ok(())
}
