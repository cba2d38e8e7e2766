//! Cash custody repository and workflow
//!
//! Each workflow step (request, approve, reject, return) writes the custody
//! change and its notifications in one transaction.

use chrono::Utc;
use custodyctl_core::{
    CashCustody, Command, Currency, CustodyDetails, CustodyError, CustodyStatus, NewCustody,
    NewNotification, PolicyTable,
};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::notifications;
use crate::error::{Result, StoreError};
use crate::pagination::{Paginated, Pagination};
use crate::{enrich, Store};

const CUSTODY_COLUMNS: &str = r#"
    id, treasurer_id, cashier_id, wallet_id, currency, amount, notes, status,
    is_returned, original_custody_id, created_at, updated_at
"#;

pub(crate) fn custody_from_row(row: &PgRow) -> Result<CashCustody> {
    let currency: String = row.try_get("currency")?;
    let status: String = row.try_get("status")?;
    Ok(CashCustody {
        id: row.try_get("id")?,
        treasurer_id: row.try_get("treasurer_id")?,
        cashier_id: row.try_get("cashier_id")?,
        wallet_id: row.try_get("wallet_id")?,
        currency: Currency::parse(&currency)?,
        amount: row.try_get("amount")?,
        notes: row.try_get("notes")?,
        status: status.parse()?,
        is_returned: row.try_get("is_returned")?,
        original_custody_id: row.try_get("original_custody_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Optional filters for listing custody records. Unset fields match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct CustodyFilter {
    pub status: Option<CustodyStatus>,
    pub treasurer_id: Option<Uuid>,
    pub cashier_id: Option<Uuid>,
    /// Either party
    pub party_id: Option<Uuid>,
    pub wallet_id: Option<Uuid>,
}

impl CustodyFilter {
    pub fn status(mut self, status: CustodyStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn party(mut self, user_id: Uuid) -> Self {
        self.party_id = Some(user_id);
        self
    }
}

pub struct CustodyRepo<'a> {
    store: &'a Store,
}

impl<'a> CustodyRepo<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &CustodyFilter,
        page: Pagination,
    ) -> Result<Paginated<CashCustody>> {
        let mut tx = self.store.begin().await?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CUSTODY_COLUMNS}, COUNT(*) OVER() AS total
            FROM cash_custody
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR treasurer_id = $2)
              AND ($3::uuid IS NULL OR cashier_id = $3)
              AND ($4::uuid IS NULL OR treasurer_id = $4 OR cashier_id = $4)
              AND ($5::uuid IS NULL OR wallet_id = $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#
        ))
        .bind(filter.status.map(CustodyStatus::as_str))
        .bind(filter.treasurer_id)
        .bind(filter.cashier_id)
        .bind(filter.party_id)
        .bind(filter.wallet_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(custody_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Paginated::new(items, total, page))
    }

    /// `list` with treasurer, cashier and wallet attached.
    pub async fn list_detailed(
        &self,
        filter: &CustodyFilter,
        page: Pagination,
    ) -> Result<Paginated<CustodyDetails>> {
        let mut listed = self.list(filter, page).await?;
        let rows = std::mem::take(&mut listed.items);
        let details = enrich::custody_details(self.store, rows).await;
        Ok(listed.with_items(details))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<CashCustody> {
        let mut tx = self.store.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {CUSTODY_COLUMNS} FROM cash_custody WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("custody", id))?;
        tx.commit().await?;
        custody_from_row(&row)
    }

    /// Hand custody to a cashier: a pending record plus an actionable
    /// notification for the cashier.
    #[instrument(skip(self, new), fields(treasurer = %new.treasurer_id, cashier = %new.cashier_id, amount = %new.amount))]
    pub async fn request(&self, new: &NewCustody) -> Result<CashCustody> {
        new.validate()?;

        let mut tx = self.store.begin().await?;
        let now = Utc::now();
        let prospective = CashCustody {
            id: Uuid::new_v4(),
            treasurer_id: new.treasurer_id,
            cashier_id: new.cashier_id,
            wallet_id: new.wallet_id,
            currency: new.currency.clone(),
            amount: new.amount,
            notes: new.notes.clone(),
            status: CustodyStatus::Pending,
            is_returned: false,
            original_custody_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store
            .authorize(&mut tx, PolicyTable::CashCustody, Command::Insert, &prospective)
            .await?;

        let custody = insert(&mut tx, &prospective).await?;
        notifications::insert(&mut tx, &NewNotification::custody_request(&custody)).await?;

        tx.commit().await?;
        tracing::info!(id = %custody.id, "custody requested");
        Ok(custody)
    }

    /// Cashier accepts a pending custody.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: Uuid) -> Result<CashCustody> {
        self.decide(id, CustodyStatus::Approved, None).await
    }

    /// Cashier refuses a pending custody.
    #[instrument(skip(self))]
    pub async fn reject(&self, id: Uuid, reason: Option<&str>) -> Result<CashCustody> {
        self.decide(id, CustodyStatus::Rejected, reason).await
    }

    async fn decide(
        &self,
        id: Uuid,
        next: CustodyStatus,
        reason: Option<&str>,
    ) -> Result<CashCustody> {
        let mut tx = self.store.begin().await?;
        let current = lock(&mut tx, id).await?;
        current.ensure_transition(next)?;

        let actor = self
            .store
            .authorize(&mut tx, PolicyTable::CashCustody, Command::Update, &current)
            .await?;
        if let Some(actor) = actor {
            if actor.user_id != current.cashier_id && !actor.is_manager {
                return Err(CustodyError::Unauthorized {
                    command: Command::Update,
                    table: PolicyTable::CashCustody,
                }
                .into());
            }
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE cash_custody
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {CUSTODY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let custody = custody_from_row(&row)?;

        let closed = notifications::close_request(&mut tx, id).await?;
        let notice = match next {
            CustodyStatus::Approved => NewNotification::custody_approval(&custody),
            _ => NewNotification::custody_rejection(&custody, reason),
        };
        notifications::insert(&mut tx, &notice).await?;

        tx.commit().await?;
        tracing::info!(%id, status = %next, closed, "custody decided");
        Ok(custody)
    }

    /// Hand an approved custody back. Creates the `returned` record that
    /// references `id` and flags the original as returned.
    #[instrument(skip(self, notes))]
    pub async fn return_custody(&self, id: Uuid, notes: &str) -> Result<CashCustody> {
        let mut tx = self.store.begin().await?;
        let original = lock(&mut tx, id).await?;
        original.ensure_returnable()?;

        let draft = NewCustody::returning(&original, notes);
        let now = Utc::now();
        let returned = CashCustody {
            id: Uuid::new_v4(),
            treasurer_id: draft.treasurer_id,
            cashier_id: draft.cashier_id,
            wallet_id: draft.wallet_id,
            currency: draft.currency,
            amount: draft.amount,
            notes: draft.notes,
            status: CustodyStatus::Returned,
            is_returned: true,
            original_custody_id: Some(original.id),
            created_at: now,
            updated_at: now,
        };
        returned.validate()?;
        self.store
            .authorize(&mut tx, PolicyTable::CashCustody, Command::Insert, &returned)
            .await?;
        self.store
            .authorize(&mut tx, PolicyTable::CashCustody, Command::Update, &original)
            .await?;

        let returned = insert(&mut tx, &returned).await?;
        sqlx::query("UPDATE cash_custody SET is_returned = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        notifications::insert(&mut tx, &NewNotification::custody_return(&returned)).await?;

        tx.commit().await?;
        tracing::info!(original = %id, returned = %returned.id, "custody returned");
        Ok(returned)
    }
}

async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<CashCustody> {
    let row = sqlx::query(&format!(
        "SELECT {CUSTODY_COLUMNS} FROM cash_custody WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::not_found("custody", id))?;
    custody_from_row(&row)
}

async fn insert(conn: &mut PgConnection, custody: &CashCustody) -> Result<CashCustody> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO cash_custody
            (id, treasurer_id, cashier_id, wallet_id, currency, amount, notes,
             status, is_returned, original_custody_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {CUSTODY_COLUMNS}
        "#
    ))
    .bind(custody.id)
    .bind(custody.treasurer_id)
    .bind(custody.cashier_id)
    .bind(custody.wallet_id)
    .bind(custody.currency.as_str())
    .bind(custody.amount)
    .bind(&custody.notes)
    .bind(custody.status.as_str())
    .bind(custody.is_returned)
    .bind(custody.original_custody_id)
    .fetch_one(&mut *conn)
    .await?;
    custody_from_row(&row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::NotificationRepo;
    use custodyctl_core::{NotificationKind, RoleName};
    use rust_decimal::Decimal;

    struct Parties {
        treasurer: Uuid,
        cashier: Uuid,
        wallet: Uuid,
    }

    async fn parties(store: &Store) -> Parties {
        Parties {
            treasurer: testing::profile(store, RoleName::Treasurer).await,
            cashier: testing::profile(store, RoleName::Cashier).await,
            wallet: testing::wallet(store, "USD").await,
        }
    }

    fn new_custody(p: &Parties) -> NewCustody {
        NewCustody {
            treasurer_id: p.treasurer,
            cashier_id: p.cashier,
            wallet_id: p.wallet,
            currency: Currency::parse("USD").unwrap(),
            amount: Decimal::new(150_000, 2),
            notes: "float for the morning shift".into(),
        }
    }

    // Integration tests - run with DATABASE_URL set
    // cargo test -p custodyctl-store -- --ignored --test-threads=1

    #[tokio::test]
    #[ignore = "requires database"]
    async fn request_approve_return() {
        let store = testing::store().await;
        let p = parties(&store).await;

        let as_treasurer = store.acting_as(p.treasurer);
        let requested = CustodyRepo::new(&as_treasurer)
            .request(&new_custody(&p))
            .await
            .unwrap();
        assert_eq!(requested.status, CustodyStatus::Pending);

        let inbox = NotificationRepo::new(&store)
            .list_for_user(p.cashier, true, Pagination::default())
            .await
            .unwrap();
        let request = inbox
            .items
            .iter()
            .find(|n| n.related_id == Some(requested.id))
            .unwrap();
        assert_eq!(request.kind, NotificationKind::CustodyRequest);
        assert!(request.is_pending_action());

        let as_cashier = store.acting_as(p.cashier);
        let repo = CustodyRepo::new(&as_cashier);
        let approved = repo.approve(requested.id).await.unwrap();
        assert_eq!(approved.status, CustodyStatus::Approved);

        let cashier_inbox = NotificationRepo::new(&as_cashier)
            .list_for_user(p.cashier, false, Pagination::default())
            .await
            .unwrap();
        assert!(cashier_inbox
            .items
            .iter()
            .filter(|n| n.related_id == Some(requested.id))
            .all(|n| !n.is_pending_action()));

        let returned = repo.return_custody(requested.id, "end of shift").await.unwrap();
        assert_eq!(returned.status, CustodyStatus::Returned);
        assert!(returned.is_returned);
        assert_eq!(returned.original_custody_id, Some(requested.id));
        assert!(repo.get(requested.id).await.unwrap().is_returned);

        // Notices written by the cashier land in the treasurer's inbox
        let treasurer_inbox = NotificationRepo::new(&as_treasurer)
            .list_for_user(p.treasurer, false, Pagination::default())
            .await
            .unwrap();
        let kinds: Vec<_> = treasurer_inbox
            .items
            .iter()
            .filter(|n| n.related_id == Some(requested.id) || n.related_id == Some(returned.id))
            .map(|n| n.kind.clone())
            .collect();
        assert!(kinds.contains(&NotificationKind::CustodyApproval));
        assert!(kinds.contains(&NotificationKind::CustodyReturn));

        let again = repo.return_custody(requested.id, "twice").await.unwrap_err();
        assert!(matches!(
            again,
            StoreError::Domain(CustodyError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn treasurer_cannot_approve_own_request() {
        let store = testing::store().await;
        let p = parties(&store).await;
        let as_treasurer = store.acting_as(p.treasurer);
        let repo = CustodyRepo::new(&as_treasurer);

        let requested = repo.request(&new_custody(&p)).await.unwrap();
        let err = repo.approve(requested.id).await.unwrap_err();
        assert_eq!(err.user_message("custody"), "not authorized");
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn rejected_custody_cannot_be_approved() {
        let store = testing::store().await;
        let p = parties(&store).await;
        let requested = CustodyRepo::new(&store.acting_as(p.treasurer))
            .request(&new_custody(&p))
            .await
            .unwrap();

        let as_cashier = store.acting_as(p.cashier);
        let repo = CustodyRepo::new(&as_cashier);
        repo.reject(requested.id, Some("count mismatch")).await.unwrap();
        assert!(repo.approve(requested.id).await.is_err());

        let treasurer_inbox = NotificationRepo::new(&store.acting_as(p.treasurer))
            .list_for_user(p.treasurer, false, Pagination::default())
            .await
            .unwrap();
        assert!(treasurer_inbox.items.iter().any(|n| {
            n.related_id == Some(requested.id) && n.kind == NotificationKind::CustodyRejection
        }));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn detailed_listing_keeps_every_row() {
        let store = testing::store().await;
        let p = parties(&store).await;
        let repo = CustodyRepo::new(&store);
        repo.request(&new_custody(&p)).await.unwrap();
        repo.request(&new_custody(&p)).await.unwrap();

        let filter = CustodyFilter::default().party(p.cashier);
        let page = repo
            .list_detailed(&filter, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|d| d.cashier.is_some() && d.wallet.is_some()));
    }
}
