//! Command implementations for the custodyctl CLI

pub mod auth;
pub mod check;
pub mod config;
pub mod custody;
pub mod migrate;
pub mod notifications;
pub mod prices;
pub mod roles;
pub mod schema;
pub mod seed;

use anyhow::{Context as _, Result};
use custodyctl_auth::{AuthClient, AuthError};
use custodyctl_core::{CustodyConfig, CustodyctlConfig};
use custodyctl_store::{Store, StoreError};
use uuid::Uuid;

/// Environment and file configuration shared by every command
pub struct Context {
    pub as_user: Option<Uuid>,
    pub env: CustodyConfig,
    pub settings: CustodyctlConfig,
}

impl Context {
    pub fn new(as_user: Option<Uuid>) -> Self {
        Self {
            as_user,
            env: CustodyConfig::from_env(),
            settings: CustodyctlConfig::load(),
        }
    }

    /// Connect, acting as `--as-user` when given.
    pub async fn store(&self) -> Result<Store> {
        let store = Store::connect(&self.env, &self.settings.database)
            .await
            .context("Failed to connect to the database")?;
        Ok(match self.as_user {
            Some(user) => {
                tracing::debug!(%user, "acting as user");
                store.acting_as(user)
            }
            None => store,
        })
    }

    /// Maintenance connection; `--as-user` is ignored.
    pub async fn owner_store(&self) -> Result<Store> {
        if self.as_user.is_some() {
            tracing::warn!("--as-user ignored: this command runs as the database owner");
        }
        Store::connect(&self.env, &self.settings.database)
            .await
            .context("Failed to connect to the database")
    }

    pub fn auth_client(&self) -> Result<AuthClient> {
        Ok(AuthClient::new(self.env.auth()?))
    }

    /// The acting user, required by commands that act on "my" records.
    pub fn require_user(&self) -> Result<Uuid> {
        self.as_user
            .context("this command needs --as-user (or CUSTODY_ACT_AS)")
    }
}

/// One-line error for the terminal. Database and auth failures use their
/// user-facing wording; everything else shows the full context chain.
pub fn describe(err: &anyhow::Error) -> String {
    for cause in err.chain() {
        if let Some(store) = cause.downcast_ref::<StoreError>() {
            return with_context(err, store.user_message("record"));
        }
        if let Some(auth) = cause.downcast_ref::<AuthError>() {
            return with_context(err, auth.user_message());
        }
    }
    format!("{err:#}")
}

fn with_context(err: &anyhow::Error, friendly: String) -> String {
    let top = err.to_string();
    if top == friendly || err.chain().count() == 1 {
        friendly
    } else {
        format!("{top}: {friendly}")
    }
}
