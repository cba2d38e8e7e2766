//! Idempotent schema migrations
//!
//! Every step checks or uses `IF NOT EXISTS` / `OR REPLACE` so any of them
//! can be re-run against a database in any intermediate state.

use custodyctl_core::{PolicySet, RoleName};
use sqlx::PgPool;

use crate::error::{Result, StoreError};
use crate::introspect;
use crate::repos::{PriceRepo, ProfileRepo, RoleRepo};
use crate::{Store, APP_ROLE};

/// Run every migration step in order.
pub async fn run_all(pool: &PgPool, policies: &PolicySet) -> Result<()> {
    tracing::info!("Running custody migrations...");

    schema(pool).await?;
    action_payload(pool).await?;
    roles(pool).await?;
    PriceRepo::new(&Store::from_pool(pool.clone())).normalize().await?;
    app_role(pool).await?;
    install_policies(pool, policies).await?;

    tracing::info!("Custody migrations complete");
    Ok(())
}

/// Tables, constraints, views and the identity helper function.
pub async fn schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Creating tables...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roles (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id UUID PRIMARY KEY,
            full_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL UNIQUE,
            role_id UUID REFERENCES roles(id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wallets (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL,
            currency TEXT NOT NULL CHECK (currency ~ '^[A-Z]{3}$'),
            balance NUMERIC(14, 2) NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cash_custody (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            treasurer_id UUID NOT NULL REFERENCES profiles(id),
            cashier_id UUID NOT NULL REFERENCES profiles(id),
            wallet_id UUID NOT NULL REFERENCES wallets(id),
            currency TEXT NOT NULL CHECK (currency ~ '^[A-Z]{3}$'),
            amount NUMERIC(14, 2) NOT NULL CHECK (amount > 0),
            notes TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected', 'returned')),
            is_returned BOOLEAN NOT NULL DEFAULT FALSE,
            original_custody_id UUID REFERENCES cash_custody(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Installations created before the return workflow lack this constraint
    ensure_constraint(
        pool,
        "cash_custody",
        "cash_custody_return_has_origin",
        "CHECK (status <> 'returned' OR original_custody_id IS NOT NULL)",
    )
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'general',
            related_id UUID,
            is_read BOOLEAN NOT NULL DEFAULT FALSE,
            requires_action BOOLEAN NOT NULL DEFAULT FALSE,
            action_taken BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Price columns are added by the price normalization step
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manager_prices (
            id INTEGER PRIMARY KEY DEFAULT 1 CHECK (id = 1),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    identity_function(pool).await?;
    role_views(pool).await?;
    role_guard(pool).await?;
    create_indexes(pool).await?;

    tracing::info!("Tables ready");
    Ok(())
}

/// `app_current_user_id()`: the acting user set by `Store::begin`, or NULL.
async fn identity_function(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION app_current_user_id() RETURNS UUID
        LANGUAGE sql STABLE
        AS $$ SELECT NULLIF(current_setting('app.user_id', true), '')::uuid $$
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Live views over profiles and roles. Views run with their owner's rights,
/// so policies can consult them without re-entering row-level security.
async fn role_views(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE OR REPLACE VIEW user_roles AS
        SELECT p.id AS user_id, r.name AS role_name
        FROM profiles p
        JOIN roles r ON r.id = p.role_id
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE OR REPLACE VIEW manager_ids AS SELECT user_id FROM user_roles WHERE role_name = '{}'",
        RoleName::Manager.as_str()
    ))
    .execute(pool)
    .await?;
    Ok(())
}

/// Only managers may set or change `profiles.role_id` while acting.
/// Maintenance connections (no acting user) are not restricted.
async fn role_guard(pool: &PgPool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE OR REPLACE FUNCTION app_guard_role_change() RETURNS trigger
        LANGUAGE plpgsql
        AS $$
        BEGIN
            IF app_current_user_id() IS NOT NULL
               AND ((TG_OP = 'INSERT' AND NEW.role_id IS NOT NULL)
                    OR (TG_OP = 'UPDATE' AND NEW.role_id IS DISTINCT FROM OLD.role_id))
               AND NOT EXISTS (SELECT 1 FROM manager_ids WHERE user_id = app_current_user_id())
            THEN
                RAISE EXCEPTION 'only a {manager} can change roles' USING ERRCODE = '42501';
            END IF;
            RETURN NEW;
        END
        $$
        "#,
        manager = RoleName::Manager.as_str()
    ))
    .execute(pool)
    .await?;

    sqlx::query("DROP TRIGGER IF EXISTS profiles_role_guard ON profiles")
        .execute(pool)
        .await?;
    sqlx::query(
        r#"
        CREATE TRIGGER profiles_role_guard
        BEFORE INSERT OR UPDATE OF role_id ON profiles
        FOR EACH ROW EXECUTE FUNCTION app_guard_role_change()
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_indexes(pool: &PgPool) -> Result<()> {
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_profiles_role ON profiles(role_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_custody_treasurer ON cash_custody(treasurer_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_custody_cashier ON cash_custody(cashier_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_custody_status ON cash_custody(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_custody_original ON cash_custody(original_custody_id) WHERE original_custody_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notifications_unread ON notifications(user_id) WHERE is_read = FALSE",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notifications_related ON notifications(related_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Add `notifications.action_payload` as `JSONB NOT NULL DEFAULT '{}'`.
///
/// Also repairs installations where the column was added nullable.
pub async fn action_payload(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await?;

    let existed = introspect::column_exists(&mut tx, "notifications", "action_payload").await?;
    if existed {
        tracing::info!("notifications.action_payload already exists, normalizing");
        sqlx::query("UPDATE notifications SET action_payload = '{}'::jsonb WHERE action_payload IS NULL")
            .execute(&mut *tx)
            .await?;
        sqlx::query("ALTER TABLE notifications ALTER COLUMN action_payload SET DEFAULT '{}'::jsonb")
            .execute(&mut *tx)
            .await?;
        sqlx::query("ALTER TABLE notifications ALTER COLUMN action_payload SET NOT NULL")
            .execute(&mut *tx)
            .await?;
    } else {
        tracing::info!("Adding notifications.action_payload");
        sqlx::query(
            "ALTER TABLE notifications ADD COLUMN IF NOT EXISTS action_payload JSONB NOT NULL DEFAULT '{}'::jsonb",
        )
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Default roles plus role backfill for profiles without one.
pub async fn roles(pool: &PgPool) -> Result<()> {
    let store = Store::from_pool(pool.clone());
    let inserted = RoleRepo::new(&store).ensure_defaults().await?;
    tracing::info!(inserted, "Default roles ensured");

    let updated = ProfileRepo::new(&store).backfill_default_role().await?;
    tracing::info!(updated, role = %RoleName::DEFAULT, "Backfilled profiles without a role");
    Ok(())
}

/// Database role used for acting transactions, with table privileges.
pub async fn app_role(pool: &PgPool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        DO $$
        BEGIN
            IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = '{APP_ROLE}') THEN
                CREATE ROLE {APP_ROLE} NOLOGIN;
            END IF;
        END
        $$
        "#
    ))
    .execute(pool)
    .await?;

    for statement in [
        format!("GRANT {APP_ROLE} TO CURRENT_USER"),
        format!("GRANT USAGE ON SCHEMA public TO {APP_ROLE}"),
        format!(
            "GRANT SELECT, INSERT, UPDATE, DELETE ON roles, profiles, wallets, cash_custody, notifications, manager_prices TO {APP_ROLE}"
        ),
        format!("GRANT SELECT ON user_roles, manager_ids TO {APP_ROLE}"),
        format!("GRANT EXECUTE ON FUNCTION app_current_user_id() TO {APP_ROLE}"),
    ] {
        sqlx::query(&statement).execute(pool).await?;
    }

    tracing::info!(role = APP_ROLE, "Application role ready");
    Ok(())
}

/// Validate the policy set and (re)install it in one transaction.
pub async fn install_policies(pool: &PgPool, policies: &PolicySet) -> Result<usize> {
    policies.validate()?;

    let mut tx = pool.begin().await?;
    let statements = policies.to_sql();
    for statement in &statements {
        tracing::debug!(%statement, "policy");
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!(
        policies = policies.policies().len(),
        "Row-level security policies installed"
    );
    Ok(policies.policies().len())
}

/// Outcome of `add_column`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddColumn {
    Added,
    AlreadyPresent,
}

/// Add a column if it is missing.
pub async fn add_column(pool: &PgPool, table: &str, column: &str, sql_type: &str) -> Result<AddColumn> {
    let table = identifier(table)?;
    let column = identifier(column)?;
    let sql_type = column_type(sql_type)?;

    let mut tx = pool.begin().await?;
    if !introspect::table_exists(&mut tx, table).await? {
        return Err(StoreError::not_found("table", table));
    }
    if introspect::column_exists(&mut tx, table, column).await? {
        tracing::info!("{table}.{column} already exists");
        return Ok(AddColumn::AlreadyPresent);
    }

    sqlx::query(&format!(
        "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {column} {sql_type}"
    ))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!("Added {table}.{column} {sql_type}");
    Ok(AddColumn::Added)
}

async fn ensure_constraint(pool: &PgPool, table: &str, name: &str, definition: &str) -> Result<()> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM pg_constraint con
            JOIN pg_class rel ON rel.oid = con.conrelid
            WHERE rel.relname = $1 AND con.conname = $2
        )
        "#,
    )
    .bind(table)
    .bind(name)
    .fetch_one(pool)
    .await?;

    if !exists {
        sqlx::query(&format!("ALTER TABLE {table} ADD CONSTRAINT {name} {definition}"))
            .execute(pool)
            .await?;
        tracing::info!("Added constraint {name} on {table}");
    }
    Ok(())
}

/// Plain lowercase SQL identifier.
pub fn identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63;
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_owned()))
    }
}

/// Column type with an optional default, e.g. `jsonb NOT NULL DEFAULT '{}'`.
/// Statement separators and comments are rejected.
pub fn column_type(sql_type: &str) -> Result<&str> {
    let sql_type = sql_type.trim();
    let forbidden = sql_type.is_empty()
        || sql_type.contains(';')
        || sql_type.contains("--")
        || sql_type.contains("/*")
        || sql_type.chars().filter(|c| *c == '\'').count() % 2 != 0;
    if forbidden {
        Err(StoreError::InvalidColumnType(sql_type.to_owned()))
    } else {
        Ok(sql_type)
    }
}
