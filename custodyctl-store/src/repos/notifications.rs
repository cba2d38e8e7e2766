//! Notification repository
//!
//! Rows written before `action_payload` existed (or with it null) are read
//! back with an empty object.

use chrono::Utc;
use custodyctl_core::policy::NoRow;
use custodyctl_core::{Command, NewNotification, Notification, NotificationKind, PolicyTable};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::pagination::{Paginated, Pagination};
use crate::Store;

pub(crate) const NOTIFICATION_COLUMNS: &str = r#"
    id, user_id, title, message, type, related_id, is_read, requires_action,
    action_taken, COALESCE(action_payload, '{}'::jsonb) AS action_payload,
    created_at, updated_at
"#;

pub(crate) fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let kind: String = row.try_get("type")?;
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        kind: NotificationKind::from_tag(&kind),
        related_id: row.try_get("related_id")?,
        is_read: row.try_get("is_read")?,
        requires_action: row.try_get("requires_action")?,
        action_taken: row.try_get("action_taken")?,
        action_payload: row.try_get("action_payload")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert on an open connection so workflow steps can include it in their
/// transaction.
///
/// The row is usually addressed to someone other than the acting user, who
/// cannot read it back under row-level security, so there is no `RETURNING`:
/// id and timestamps are generated here.
pub(crate) async fn insert(conn: &mut PgConnection, new: &NewNotification) -> Result<Notification> {
    let now = Utc::now();
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id: new.user_id,
        title: new.title.clone(),
        message: new.message.clone(),
        kind: new.kind.clone(),
        related_id: new.related_id,
        is_read: false,
        requires_action: new.requires_action,
        action_taken: false,
        action_payload: new.action_payload.clone(),
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        r#"
        INSERT INTO notifications
            (id, user_id, title, message, type, related_id, requires_action,
             action_payload, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
        "#,
    )
    .bind(notification.id)
    .bind(notification.user_id)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.kind.as_str())
    .bind(notification.related_id)
    .bind(notification.requires_action)
    .bind(&notification.action_payload)
    .bind(notification.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(notification)
}

/// Close the pending request notification for a custody record.
pub(crate) async fn close_request(conn: &mut PgConnection, custody_id: Uuid) -> Result<u64> {
    let updated = sqlx::query(
        r#"
        UPDATE notifications
        SET action_taken = TRUE, is_read = TRUE, updated_at = NOW()
        WHERE related_id = $1
          AND type = $2
          AND action_taken = FALSE
        "#,
    )
    .bind(custody_id)
    .bind(NotificationKind::CustodyRequest.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(updated)
}

pub struct NotificationRepo<'a> {
    store: &'a Store,
}

impl<'a> NotificationRepo<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self, new), fields(user_id = %new.user_id, kind = %new.kind))]
    pub async fn create(&self, new: &NewNotification) -> Result<Notification> {
        let mut tx = self.store.begin().await?;
        self.store
            .authorize(&mut tx, PolicyTable::Notifications, Command::Insert, &NoRow)
            .await?;
        let notification = insert(&mut tx, new).await?;
        tx.commit().await?;
        Ok(notification)
    }

    /// Newest first.
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: Pagination,
    ) -> Result<Paginated<Notification>> {
        let mut tx = self.store.begin().await?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}, COUNT(*) OVER() AS total
            FROM notifications
            WHERE user_id = $1
              AND ($2 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Paginated::new(items, total, page))
    }

    #[instrument(skip(self))]
    pub async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        self.update_flags(id, "is_read = TRUE").await
    }

    #[instrument(skip(self))]
    pub async fn mark_action_taken(&self, id: Uuid) -> Result<Notification> {
        self.update_flags(id, "action_taken = TRUE, is_read = TRUE")
            .await
    }

    /// Returns how many notifications changed.
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, updated_at = NOW()
            WHERE user_id = $1 AND is_read = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        let mut tx = self.store.begin().await?;
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(count)
    }

    /// Another user's notification is invisible to the acting user and reads
    /// as not found, the same as a missing id.
    async fn update_flags(&self, id: Uuid, assignments: &'static str) -> Result<Notification> {
        let mut tx = self.store.begin().await?;

        let current = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("notification", id))?;
        let current = notification_from_row(&current)?;
        self.store
            .authorize(&mut tx, PolicyTable::Notifications, Command::Update, &current)
            .await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE notifications
            SET {assignments}, updated_at = NOW()
            WHERE id = $1
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        notification_from_row(&row)
    }
}
