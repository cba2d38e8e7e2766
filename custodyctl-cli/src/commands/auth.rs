//! Auth command - sign-up, sign-in and the session watchdog

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use custodyctl_auth::{SessionWatchdog, SharedSession, SignUp};
use custodyctl_core::Session;
use inquire::Password;
use tokio::sync::RwLock;

use super::Context;

#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Create an account
    SignUp {
        email: String,
        #[arg(long)]
        full_name: Option<String>,
        /// Read from the environment instead of prompting
        #[arg(long, env = "CUSTODY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign in and print the session expiry
    SignIn {
        email: String,
        #[arg(long, env = "CUSTODY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign in and keep the session fresh until Ctrl+C
    Watch {
        email: String,
        #[arg(long, env = "CUSTODY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Seconds between checks (overrides the config file)
        #[arg(long)]
        interval: Option<u64>,
        /// Refresh this many seconds before expiry
        #[arg(long)]
        margin: Option<u64>,
    },
}

pub async fn run(ctx: &Context, args: AuthArgs) -> Result<()> {
    let client = ctx.auth_client()?;

    match args.command {
        AuthCommand::SignUp {
            email,
            full_name,
            password,
        } => {
            let password = password_or_prompt(password, true)?;
            let session = client
                .sign_up(&SignUp {
                    email: email.clone(),
                    password,
                    full_name,
                })
                .await
                .context("Sign-up failed")?;
            match session {
                Some(session) => {
                    println!("✓ {email} signed up");
                    print_session(&session);
                }
                None => println!("✓ {email} signed up; check your inbox to confirm"),
            }
        }
        AuthCommand::SignIn { email, password } => {
            let password = password_or_prompt(password, false)?;
            let session = client
                .sign_in_with_password(&email, &password)
                .await
                .context("Sign-in failed")?;
            print_session(&session);
        }
        AuthCommand::Watch {
            email,
            password,
            interval,
            margin,
        } => {
            let password = password_or_prompt(password, false)?;
            let session = client
                .sign_in_with_password(&email, &password)
                .await
                .context("Sign-in failed")?;
            print_session(&session);

            let settings = &ctx.settings.session;
            let watchdog = SessionWatchdog::new(
                Duration::from_secs(interval.unwrap_or(settings.interval_secs).max(1)),
                Duration::from_secs(margin.unwrap_or(settings.margin_secs)),
            );
            let shared: SharedSession = Arc::new(RwLock::new(Some(session)));
            let handle = watchdog.spawn(shared.clone(), Arc::new(client));
            println!("Watching session; Ctrl+C to stop");

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            handle.stop().await;

            let last = shared.read().await.clone();
            if let Some(session) = &last {
                print_session(session);
            }
        }
    }
    Ok(())
}

fn password_or_prompt(given: Option<String>, confirm: bool) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    if !std::io::stdin().is_terminal() {
        bail!("no password: set CUSTODY_PASSWORD or run in a terminal");
    }
    let prompt = Password::new("Password:");
    let prompt = if confirm {
        prompt
    } else {
        prompt.without_confirmation()
    };
    Ok(prompt.prompt()?)
}

/// Tokens are never printed.
fn print_session(session: &Session) {
    let remaining = session.remaining(Utc::now());
    println!(
        "user {}  expires {} (in {}m)",
        session.user_id,
        session.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
        remaining.num_minutes()
    );
}
