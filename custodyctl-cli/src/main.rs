//! custodyctl - cash custody maintenance and workflow tool
//!
//! One binary for what used to be separate scripts:
//! - Schema migrations and row-level security policies (`migrate`)
//! - Schema inspection (`schema`)
//! - Manager prices and the legacy column rename (`prices`)
//! - Roles, profiles and the manager view (`roles`)
//! - The custody request/approve/return workflow (`custody`, `notifications`)
//! - Test data seeding (`seed`)
//! - Sign-up, sign-in and session refresh (`auth`)
//! - Password and error-message checks (`check`)

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

mod commands;
mod tracing_setup;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "custodyctl",
    author,
    version,
    about = "Cash custody tracking: migrations, workflow and maintenance",
    long_about = "Manage the cash custody database: apply migrations and access policies, \
                  run the custody request/approve/return workflow, seed test data and \
                  keep auth sessions fresh."
)]
struct Cli {
    /// Act as this user; row-level security applies to their role
    #[arg(long = "as-user", global = true, env = "CUSTODY_ACT_AS", value_name = "UUID")]
    as_user: Option<Uuid>,

    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress progress spinners and informational logs
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Export traces over OTLP (requires the `telemetry` feature)
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply schema changes, roles and access policies
    Migrate(commands::migrate::MigrateArgs),
    /// Inspect tables and columns
    Schema(commands::schema::SchemaArgs),
    /// Show, update or normalize manager prices
    Prices(commands::prices::PricesArgs),
    /// List roles, backfill and assign them
    Roles(commands::roles::RolesArgs),
    /// Custody workflow (list, request, approve, reject, return)
    Custody(commands::custody::CustodyArgs),
    /// Read and acknowledge notifications
    Notifications(commands::notifications::NotificationsArgs),
    /// Insert pending test custody for a set of users
    Seed(commands::seed::SeedArgs),
    /// Sign up, sign in and keep a session fresh
    Auth(commands::auth::AuthArgs),
    /// Offline checks (password strength, error wording)
    Check(commands::check::CheckArgs),
    /// Show effective configuration
    Config(commands::config::ConfigArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[tokio::main]
async fn main() {
    custodyctl_core::config::load_dotenv();
    let cli = Cli::parse();

    let tracing_config = tracing_setup::TracingConfig {
        debug: cli.debug,
        quiet: cli.quiet,
        otel: cli.otel,
    };
    tracing_config.init().ok();
    ui::init_quiet_mode(cli.quiet);

    let result = run(cli).await;
    tracing_setup::shutdown_otel();

    if let Err(err) = result {
        tracing::debug!("{err:?}");
        eprintln!("Error: {}", commands::describe(&err));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = commands::Context::new(cli.as_user);
    match cli.command {
        Commands::Migrate(args) => commands::migrate::run(&ctx, args).await,
        Commands::Schema(args) => commands::schema::run(&ctx, args).await,
        Commands::Prices(args) => commands::prices::run(&ctx, args).await,
        Commands::Roles(args) => commands::roles::run(&ctx, args).await,
        Commands::Custody(args) => commands::custody::run(&ctx, args).await,
        Commands::Notifications(args) => commands::notifications::run(&ctx, args).await,
        Commands::Seed(args) => commands::seed::run(&ctx, args).await,
        Commands::Auth(args) => commands::auth::run(&ctx, args).await,
        Commands::Check(args) => commands::check::run(args),
        Commands::Config(args) => commands::config::run(&ctx, args),
        Commands::Completions(args) => run_completions(args),
    }
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());
    Ok(())
}
