//! Wallet repository

use custodyctl_core::{Currency, Wallet};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::Store;

pub(crate) fn wallet_from_row(row: &PgRow) -> Result<Wallet> {
    let currency: String = row.try_get("currency")?;
    Ok(Wallet {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        currency: Currency::parse(&currency)?,
        balance: row.try_get("balance")?,
    })
}

pub struct WalletRepo<'a> {
    store: &'a Store,
}

impl<'a> WalletRepo<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Wallet>> {
        let mut tx = self.store.begin().await?;
        let rows = sqlx::query("SELECT id, name, currency, balance FROM wallets ORDER BY name")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        rows.iter().map(wallet_from_row).collect()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<Wallet>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.store.begin().await?;
        let rows = sqlx::query("SELECT id, name, currency, balance FROM wallets WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        rows.iter().map(wallet_from_row).collect()
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Wallet> {
        let mut tx = self.store.begin().await?;
        let row = sqlx::query("SELECT id, name, currency, balance FROM wallets WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("wallet", id))?;
        tx.commit().await?;
        wallet_from_row(&row)
    }
}
