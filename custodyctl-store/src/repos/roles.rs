//! Role repository

use custodyctl_core::{Role, RoleName};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::instrument;

use crate::error::{Result, StoreError};
use crate::Store;

pub(crate) fn role_from_row(row: &PgRow) -> Result<Role> {
    let name: String = row.try_get("name")?;
    Ok(Role {
        id: row.try_get("id")?,
        name: name.parse()?,
        description: row.try_get("description")?,
    })
}

pub struct RoleRepo<'a> {
    store: &'a Store,
}

impl<'a> RoleRepo<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert any of the fixed roles that are missing. Returns how many were
    /// inserted.
    #[instrument(skip(self))]
    pub async fn ensure_defaults(&self) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let mut inserted = 0;
        for role in RoleName::ALL {
            inserted += sqlx::query(
                r#"
                INSERT INTO roles (name, description)
                VALUES ($1, $2)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(role.as_str())
            .bind(role.description())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Roles the stored rows name; rows with names outside the fixed set are
    /// skipped with a warning.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Role>> {
        let mut tx = self.store.begin().await?;
        let rows = sqlx::query("SELECT id, name, description FROM roles ORDER BY name")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in &rows {
            match role_from_row(row) {
                Ok(role) => roles.push(role),
                Err(e) => tracing::warn!("skipping role row: {e}"),
            }
        }
        Ok(roles)
    }

    #[instrument(skip(self))]
    pub async fn by_name(&self, name: RoleName) -> Result<Role> {
        let mut tx = self.store.begin().await?;
        let row = sqlx::query("SELECT id, name, description FROM roles WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("role", name))?;
        tx.commit().await?;
        role_from_row(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn defaults_are_idempotent() {
        let store = testing::store().await;
        let repo = RoleRepo::new(&store);

        assert_eq!(repo.ensure_defaults().await.unwrap(), 0);
        let roles = repo.list().await.unwrap();
        for name in RoleName::ALL {
            assert!(roles.iter().any(|r| r.name == name));
        }
        assert_eq!(
            repo.by_name(RoleName::Cashier).await.unwrap().name,
            RoleName::Cashier
        );
    }
}
