//! Notifications command - the acting user's inbox

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use custodyctl_store::{NotificationRepo, Pagination};
use uuid::Uuid;

use super::Context;
use crate::ui;

#[derive(Parser, Debug)]
pub struct NotificationsArgs {
    #[command(subcommand)]
    pub command: NotificationsCommand,
}

#[derive(Subcommand, Debug)]
pub enum NotificationsCommand {
    /// List notifications, newest first
    List {
        #[arg(long)]
        unread: bool,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        per_page: u32,
        #[arg(long)]
        json: bool,
    },
    /// Print the unread count
    Count,
    /// Mark one notification read
    Read { id: Uuid },
    /// Mark every notification read
    ReadAll,
    /// Record that the requested action was taken
    Done { id: Uuid },
}

pub async fn run(ctx: &Context, args: NotificationsArgs) -> Result<()> {
    let user = ctx.require_user()?;
    let store = ctx.store().await?;
    let repo = NotificationRepo::new(&store);

    match args.command {
        NotificationsCommand::List {
            unread,
            page,
            per_page,
            json,
        } => {
            let listed = repo
                .list_for_user(user, unread, Pagination::new(page, per_page))
                .await?;
            if json {
                return ui::print_json(&listed);
            }
            if listed.items.is_empty() {
                println!("No notifications");
                return Ok(());
            }
            for n in &listed.items {
                let marker = if n.is_pending_action() {
                    "!"
                } else if n.is_read {
                    " "
                } else {
                    "*"
                };
                println!(
                    "{marker} {}  {}  {}",
                    n.created_at.format("%Y-%m-%d %H:%M"),
                    n.id,
                    n.title
                );
                println!("    {}", n.message);
            }
            println!("page {}/{} ({} total)", listed.page, listed.total_pages(), listed.total);
        }
        NotificationsCommand::Count => {
            println!("{}", repo.unread_count(user).await?);
        }
        NotificationsCommand::Read { id } => {
            repo.mark_read(id)
                .await
                .context("Failed to mark notification read")?;
            println!("✓ marked read");
        }
        NotificationsCommand::ReadAll => {
            let updated = repo.mark_all_read(user).await?;
            println!("✓ {updated} notifications marked read");
        }
        NotificationsCommand::Done { id } => {
            repo.mark_action_taken(id)
                .await
                .context("Failed to update notification")?;
            println!("✓ action recorded");
        }
    }
    Ok(())
}
