//! Manager prices singleton
//!
//! `normalize` inspects the live columns, plans the rename of the legacy
//! mixed-case price columns and runs the plan together with the singleton
//! upsert in one transaction.

use std::collections::BTreeSet;

use custodyctl_core::model::SINGLETON_ID;
use custodyctl_core::policy::NoRow;
use custodyctl_core::{Command, ManagerPrices, PolicyTable, PriceColumnsPlan, PriceField, PriceStep};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::instrument;

use crate::error::Result;
use crate::introspect;
use crate::Store;

const TABLE: &str = "manager_prices";

fn prices_from_row(row: &PgRow) -> Result<ManagerPrices> {
    Ok(ManagerPrices {
        sell_old: row.try_get("sell_old")?,
        sell_new: row.try_get("sell_new")?,
        buy_old: row.try_get("buy_old")?,
        buy_new: row.try_get("buy_new")?,
    })
}

/// SQL for one plan step. Legacy names are quoted; they are mixed-case.
pub fn step_sql(step: PriceStep) -> Vec<String> {
    let legacy = step.field().legacy();
    let column = step.field().column();
    match step {
        PriceStep::Rename(_) => {
            vec![format!(r#"ALTER TABLE {TABLE} RENAME COLUMN "{legacy}" TO {column}"#)]
        }
        PriceStep::Merge(_) => vec![
            format!(r#"UPDATE {TABLE} SET {column} = "{legacy}" WHERE {column} IS NULL"#),
            format!(r#"ALTER TABLE {TABLE} DROP COLUMN "{legacy}""#),
        ],
        PriceStep::Add(_) => vec![format!(
            "ALTER TABLE {TABLE} ADD COLUMN IF NOT EXISTS {column} NUMERIC(14, 4) DEFAULT 0"
        )],
    }
}

pub struct PriceRepo<'a> {
    store: &'a Store,
}

impl<'a> PriceRepo<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Current prices; zeros when the singleton row is missing.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Result<ManagerPrices> {
        let mut tx = self.store.begin().await?;
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(sell_old, 0) AS sell_old,
                COALESCE(sell_new, 0) AS sell_new,
                COALESCE(buy_old, 0) AS buy_old,
                COALESCE(buy_new, 0) AS buy_new
            FROM manager_prices
            WHERE id = $1
            "#,
        )
        .bind(SINGLETON_ID)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        match row {
            Some(row) => prices_from_row(&row),
            None => Ok(ManagerPrices::default()),
        }
    }

    #[instrument(skip(self))]
    pub async fn update(&self, prices: &ManagerPrices) -> Result<ManagerPrices> {
        let mut tx = self.store.begin().await?;
        self.store
            .authorize(&mut tx, PolicyTable::ManagerPrices, Command::Update, prices)
            .await?;
        let row = sqlx::query(
            r#"
            INSERT INTO manager_prices (id, sell_old, sell_new, buy_old, buy_new)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                sell_old = EXCLUDED.sell_old,
                sell_new = EXCLUDED.sell_new,
                buy_old = EXCLUDED.buy_old,
                buy_new = EXCLUDED.buy_new,
                updated_at = NOW()
            RETURNING sell_old, sell_new, buy_old, buy_new
            "#,
        )
        .bind(SINGLETON_ID)
        .bind(prices.sell_old)
        .bind(prices.sell_new)
        .bind(prices.buy_old)
        .bind(prices.buy_new)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        prices_from_row(&row)
    }

    /// Bring the table to the lowercase layout and make sure the singleton
    /// row exists. Returns the plan that was executed (empty when nothing
    /// needed to change). Any failure rolls back every step.
    #[instrument(skip(self))]
    pub async fn normalize(&self) -> Result<PriceColumnsPlan> {
        let mut tx = self.store.begin().await?;
        self.store
            .authorize(&mut tx, PolicyTable::ManagerPrices, Command::Update, &NoRow)
            .await?;

        let columns: BTreeSet<String> = introspect::columns(&mut tx, TABLE)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let plan = PriceColumnsPlan::from_columns(&columns);

        for step in &plan.steps {
            for statement in step_sql(*step) {
                tracing::debug!(%statement, "price column step");
                sqlx::query(&statement).execute(&mut *tx).await?;
            }
        }
        ensure_singleton(&mut tx).await?;

        tx.commit().await?;
        if plan.is_empty() {
            tracing::info!("manager_prices already normalized");
        } else {
            tracing::info!(steps = plan.steps.len(), "manager_prices normalized");
        }
        Ok(plan)
    }
}

/// Insert the default row unless one exists. Existing values are untouched.
async fn ensure_singleton(conn: &mut PgConnection) -> Result<()> {
    let defaults = ManagerPrices::default();
    let columns: Vec<&str> = PriceField::ALL.iter().map(|f| f.column()).collect();
    sqlx::query(&format!(
        "INSERT INTO {TABLE} (id, {}) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING",
        columns.join(", ")
    ))
    .bind(SINGLETON_ID)
    .bind(defaults.sell_old)
    .bind(defaults.sell_new)
    .bind(defaults.buy_old)
    .bind(defaults.buy_new)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn step_statements() {
        assert_eq!(
            step_sql(PriceStep::Rename(PriceField::SellOld)),
            vec![r#"ALTER TABLE manager_prices RENAME COLUMN "SellOld" TO sell_old"#]
        );
        let merge = step_sql(PriceStep::Merge(PriceField::BuyNew));
        assert_eq!(merge.len(), 2);
        assert!(merge[0].starts_with("UPDATE manager_prices SET buy_new = \"BuyNew\""));
        assert!(merge[1].ends_with(r#"DROP COLUMN "BuyNew""#));
    }

    async fn reset_to_legacy(store: &Store) {
        let mut conn = store.pool().acquire().await.unwrap();
        sqlx::query("DROP TABLE IF EXISTS manager_prices CASCADE")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE manager_prices (
                id INTEGER PRIMARY KEY DEFAULT 1 CHECK (id = 1),
                "SellOld" NUMERIC(14, 4),
                "SellNew" NUMERIC(14, 4),
                "BuyOld" NUMERIC(14, 4),
                "BuyNew" NUMERIC(14, 4),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO manager_prices (id, "SellOld", "SellNew", "BuyOld", "BuyNew") VALUES (1, 48.5, 49.25, 47.75, 48)"#,
        )
        .execute(&mut *conn)
        .await
        .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn rename_is_idempotent_and_keeps_values() {
        let store = testing::store().await;
        reset_to_legacy(&store).await;
        let repo = PriceRepo::new(&store);

        let first = repo.normalize().await.unwrap();
        assert_eq!(first.steps.len(), 4);
        let second = repo.normalize().await.unwrap();
        assert!(second.is_empty());

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM manager_prices")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let prices = repo.get().await.unwrap();
        assert_eq!(prices.sell_old, Decimal::from_str("48.5").unwrap());
        assert_eq!(prices.buy_new, Decimal::from(48));
    }
}
