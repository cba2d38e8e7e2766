//! Connection pool for the custody database
//!
//! Every connection is tagged with `application_name = custodyctl` so
//! maintenance sessions are easy to spot in `pg_stat_activity`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

/// Kept low; the CLI runs one command per process.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

pub const APPLICATION_NAME: &str = "custodyctl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolSettings {
    pub fn with_max_connections(max_connections: u32) -> Self {
        Self {
            max_connections: max_connections.max(1),
            ..Self::default()
        }
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
    }

    pub async fn connect(&self, database_url: &str) -> Result<PgPool, sqlx::Error> {
        let connect = PgConnectOptions::from_str(database_url)?.application_name(APPLICATION_NAME);
        let pool = self.options().connect_with(connect).await?;
        tracing::debug!(
            max_connections = self.max_connections,
            acquire_timeout_secs = self.acquire_timeout.as_secs(),
            "custody pool ready"
        );
        Ok(pool)
    }
}

/// ```ignore
/// let pool = create_pool("postgres://localhost/custody").await?;
/// ```
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PoolSettings::default().connect(database_url).await
}

pub async fn create_pool_with_options(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PoolSettings::with_max_connections(max_connections)
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_connections_rounds_up() {
        let settings = PoolSettings::with_max_connections(0);
        assert_eq!(settings.max_connections, 1);
        assert_eq!(settings.acquire_timeout, PoolSettings::default().acquire_timeout);
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_before_connecting() {
        let err = create_pool("not a url").await.unwrap_err();
        assert!(matches!(err, sqlx::Error::Configuration(_)), "{err:?}");
    }

    // Integration tests - run with DATABASE_URL set
    // cargo test -p custodyctl-store -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn connections_carry_application_name() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool_with_options(&url, 2).await.expect("pool creation failed");

        let name: String = sqlx::query_scalar("SELECT current_setting('application_name')")
            .fetch_one(&pool)
            .await
            .expect("query failed");

        assert_eq!(name, APPLICATION_NAME);
    }
}
