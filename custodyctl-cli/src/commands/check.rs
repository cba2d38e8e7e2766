//! Check command - offline password scoring and error wording

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use custodyctl_core::{format_driver_error, validate_password, DriverError};

use crate::ui;

#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(subcommand)]
    pub command: CheckCommand,
}

#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Score a password; exits non-zero if it would be rejected
    Password {
        password: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the user-facing message for a driver or auth error
    Error {
        /// SQLSTATE or auth error code, e.g. 23505
        #[arg(long)]
        code: Option<String>,
        #[arg(long, default_value = "")]
        message: String,
        /// What was being written, e.g. "custody record"
        #[arg(long, default_value = "record")]
        context: String,
    },
}

pub fn run(args: CheckArgs) -> Result<()> {
    match args.command {
        CheckCommand::Password { password, json } => {
            let check = validate_password(&password);
            if json {
                ui::print_json(&check)?;
            } else {
                println!("strength: {} ({}/6)", check.strength, check.score);
                for issue in &check.issues {
                    println!("  - {issue}");
                }
            }
            if !check.valid {
                bail!("password does not meet the requirements");
            }
        }
        CheckCommand::Error {
            code,
            message,
            context,
        } => {
            let err = DriverError::new(code.as_deref(), message);
            println!("{}", format_driver_error(&err, &context));
        }
    }
    Ok(())
}
