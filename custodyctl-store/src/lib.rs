//! custodyctl-store: PostgreSQL access for custody tracking
//!
//! # Design Principles
//!
//! - One shared `Store` (pool + acting identity) per process
//! - Every operation runs in a transaction that carries the acting user
//!   (`app.user_id`) so row-level security sees the caller
//! - Multi-step workflows commit together or not at all
//! - All DDL is safe to re-run

pub mod enrich;
pub mod error;
pub mod introspect;
pub mod migrations;
pub mod pagination;
pub mod pool;
pub mod repos;
pub mod seed;

use std::sync::Arc;

use custodyctl_core::config::DatabaseConfig;
use custodyctl_core::policy::PolicyRow;
use custodyctl_core::{Actor, Command, CustodyConfig, PolicySet, PolicyTable, RoleName};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

pub use error::{Result, StoreError};
pub use pagination::{Paginated, Pagination};
pub use pool::{create_pool, create_pool_with_options};
pub use repos::*;

/// Database role row-level security applies to. The connecting role owns the
/// tables and bypasses policies; acting transactions switch to this role.
pub const APP_ROLE: &str = "custody_app";

/// Shared database handle
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    acting_user: Option<Uuid>,
    policies: Arc<PolicySet>,
}

impl Store {
    /// Connect using `DATABASE_URL` (or its alias).
    pub async fn connect(config: &CustodyConfig, database: &DatabaseConfig) -> Result<Self> {
        let url = config.database_url()?;
        let pool = create_pool_with_options(url, database.max_connections).await?;
        tracing::debug!(max_connections = database.max_connections, "connected to database");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            acting_user: None,
            policies: Arc::new(PolicySet::standard()),
        }
    }

    /// Same pool, operations performed as `user_id`.
    pub fn acting_as(&self, user_id: Uuid) -> Self {
        Self {
            acting_user: Some(user_id),
            ..self.clone()
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn acting_user(&self) -> Option<Uuid> {
        self.acting_user
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Start a transaction carrying the acting identity.
    ///
    /// Without an acting user the transaction runs as the connecting role
    /// (maintenance mode).
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        if let Some(user_id) = self.acting_user {
            sqlx::query("SELECT set_config('app.user_id', $1, true)")
                .bind(user_id.to_string())
                .execute(&mut *tx)
                .await?;
            sqlx::query(&format!("SET LOCAL ROLE {APP_ROLE}"))
                .execute(&mut *tx)
                .await?;
        }
        Ok(tx)
    }

    /// Resolve the acting user through the `user_roles` and `manager_ids`
    /// views. `None` in maintenance mode.
    pub async fn actor(&self, conn: &mut PgConnection) -> Result<Option<Actor>> {
        let Some(user_id) = self.acting_user else {
            return Ok(None);
        };

        let role: Option<(String,)> =
            sqlx::query_as("SELECT role_name FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&mut *conn)
                .await?;
        let (is_manager,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM manager_ids WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;

        let role = role.map(|(name,)| name.parse::<RoleName>()).transpose()?;
        Ok(Some(Actor {
            user_id,
            role,
            is_manager,
        }))
    }

    /// Pre-check an operation against the policy set. Always allowed in
    /// maintenance mode.
    pub async fn authorize(
        &self,
        conn: &mut PgConnection,
        table: PolicyTable,
        command: Command,
        row: &dyn PolicyRow,
    ) -> Result<Option<Actor>> {
        let actor = self.actor(conn).await?;
        if let Some(actor) = &actor {
            self.policies.check(actor, table, command, row)?;
        }
        Ok(actor)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("acting_user", &self.acting_user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Store against `DATABASE_URL` with all migrations applied.
    pub async fn store() -> Store {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url).await.expect("pool creation failed");
        migrations::run_all(&pool, &PolicySet::standard())
            .await
            .expect("migrations failed");
        Store::from_pool(pool)
    }

    /// Insert a profile with the given role and return its id.
    pub async fn profile(store: &Store, role: RoleName) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO profiles (id, full_name, email, role_id)
            SELECT $1, $2, $3, r.id FROM roles r WHERE r.name = $4
            "#,
        )
        .bind(id)
        .bind(format!("Test {role}"))
        .bind(format!("{id}@example.com"))
        .bind(role.as_str())
        .execute(store.pool())
        .await
        .expect("insert profile");
        id
    }

    pub async fn wallet(store: &Store, currency: &str) -> Uuid {
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO wallets (name, currency) VALUES ($1, $2) RETURNING id",
        )
        .bind(format!("{currency} test wallet"))
        .bind(currency)
        .fetch_one(store.pool())
        .await
        .expect("insert wallet");
        id
    }
}
