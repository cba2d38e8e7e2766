//! Profile repository

use custodyctl_core::{Command, CustodyError, PolicyTable, Profile, RoleName};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::Store;

pub(crate) const PROFILE_COLUMNS: &str = "id, full_name, email, role_id";

pub(crate) fn profile_from_row(row: &PgRow) -> Result<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        role_id: row.try_get("role_id")?,
    })
}

/// Profile with its role name resolved
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProfileWithRole {
    #[serde(flatten)]
    pub profile: Profile,
    pub role: Option<String>,
}

pub struct ProfileRepo<'a> {
    store: &'a Store,
}

impl<'a> ProfileRepo<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<ProfileWithRole>> {
        let mut tx = self.store.begin().await?;
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.full_name, p.email, p.role_id, r.name AS role_name
            FROM profiles p
            LEFT JOIN roles r ON r.id = p.role_id
            ORDER BY p.full_name, p.email
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.iter()
            .map(|row| -> Result<ProfileWithRole> {
                Ok(ProfileWithRole {
                    profile: profile_from_row(row)?,
                    role: row.try_get("role_name")?,
                })
            })
            .collect()
    }

    /// Profiles whose id is in `ids`, in no particular order.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.store.begin().await?;
        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.iter().map(profile_from_row).collect()
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Profile> {
        let mut tx = self.store.begin().await?;
        let row = sqlx::query(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("profile", id))?;
        tx.commit().await?;
        profile_from_row(&row)
    }

    /// Give `user_id` the named role. Acting users must be managers, even for
    /// their own profile.
    #[instrument(skip(self))]
    pub async fn assign_role(&self, user_id: Uuid, role: RoleName) -> Result<Profile> {
        let mut tx = self.store.begin().await?;

        let current = sqlx::query(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("profile", user_id))?;
        let current = profile_from_row(&current)?;
        let actor = self
            .store
            .authorize(&mut tx, PolicyTable::Profiles, Command::Update, &current)
            .await?;
        if actor.is_some_and(|actor| !actor.is_manager) {
            return Err(CustodyError::Unauthorized {
                command: Command::Update,
                table: PolicyTable::Profiles,
            }
            .into());
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE profiles
            SET role_id = (SELECT id FROM roles WHERE name = $2), updated_at = NOW()
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let profile = profile_from_row(&row)?;
        if profile.role_id.is_none() {
            return Err(StoreError::not_found("role", role));
        }

        tx.commit().await?;
        tracing::info!(%user_id, %role, "role assigned");
        Ok(profile)
    }

    /// Give every profile without a role the default role. Returns the number
    /// of profiles updated.
    #[instrument(skip(self))]
    pub async fn backfill_default_role(&self) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE profiles
            SET role_id = (SELECT id FROM roles WHERE name = $1), updated_at = NOW()
            WHERE role_id IS NULL
              AND EXISTS (SELECT 1 FROM roles WHERE name = $1)
            "#,
        )
        .bind(RoleName::DEFAULT.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(updated)
    }

    /// Current contents of the `manager_ids` view.
    #[instrument(skip(self))]
    pub async fn manager_ids(&self) -> Result<Vec<Uuid>> {
        let mut tx = self.store.begin().await?;
        let ids: Vec<(Uuid,)> = sqlx::query_as("SELECT user_id FROM manager_ids ORDER BY user_id")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
