//! Insert a seeding plan in sequential batches

use custodyctl_core::{CustodyStatus, NewNotification, SeedPlan};
use sqlx::QueryBuilder;
use tracing::instrument;

use crate::error::Result;
use crate::repos::custody::custody_from_row;
use crate::repos::notifications;
use crate::Store;

/// Insert every record of `plan`, `batch_size` rows per statement. Each
/// batch (records plus their request notifications) commits before the next
/// starts. `progress` is called with the running total after each batch.
#[instrument(skip(store, plan, progress), fields(records = plan.len()))]
pub async fn insert_plan(
    store: &Store,
    plan: &SeedPlan,
    batch_size: usize,
    mut progress: impl FnMut(usize),
) -> Result<usize> {
    let mut inserted = 0;
    for (index, batch) in plan.batches(batch_size).enumerate() {
        for record in batch {
            record.validate()?;
        }

        let mut tx = store.begin().await?;
        let mut builder = QueryBuilder::new(
            "INSERT INTO cash_custody (treasurer_id, cashier_id, wallet_id, currency, amount, notes, status) ",
        );
        builder.push_values(batch, |mut row, record| {
            row.push_bind(record.treasurer_id)
                .push_bind(record.cashier_id)
                .push_bind(record.wallet_id)
                .push_bind(record.currency.as_str())
                .push_bind(record.amount)
                .push_bind(&record.notes)
                .push_bind(CustodyStatus::Pending.as_str());
        });
        builder.push(
            " RETURNING id, treasurer_id, cashier_id, wallet_id, currency, amount, notes, status, \
             is_returned, original_custody_id, created_at, updated_at",
        );
        let rows = builder.build().fetch_all(&mut *tx).await?;

        for row in &rows {
            let custody = custody_from_row(row)?;
            notifications::insert(&mut tx, &NewNotification::custody_request(&custody)).await?;
        }
        tx.commit().await?;

        inserted += rows.len();
        tracing::debug!(batch = index + 1, inserted, "seed batch committed");
        progress(inserted);
    }
    tracing::info!(inserted, "seeding complete");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::{CustodyFilter, CustodyRepo, NotificationRepo, Pagination};
    use custodyctl_core::{AmountRange, Currency, RoleName, Wallet};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal::Decimal;

    // Integration tests - run with DATABASE_URL set
    // cargo test -p custodyctl-store -- --ignored --test-threads=1

    #[tokio::test]
    #[ignore = "requires database"]
    async fn seeds_users_times_currencies() {
        let store = testing::store().await;
        let treasurer = testing::profile(&store, RoleName::Treasurer).await;
        let mut users = Vec::new();
        for _ in 0..3 {
            users.push(testing::profile(&store, RoleName::Cashier).await);
        }
        let wallets = vec![
            Wallet {
                id: testing::wallet(&store, "USD").await,
                name: "USD".into(),
                currency: Currency::parse("USD").unwrap(),
                balance: Decimal::ZERO,
            },
            Wallet {
                id: testing::wallet(&store, "EUR").await,
                name: "EUR".into(),
                currency: Currency::parse("EUR").unwrap(),
                balance: Decimal::ZERO,
            },
        ];
        let currencies = vec![Currency::parse("USD").unwrap(), Currency::parse("EUR").unwrap()];
        let plan = SeedPlan::build(
            treasurer,
            &users,
            &currencies,
            &wallets,
            AmountRange::default(),
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();

        let mut seen = Vec::new();
        let inserted = insert_plan(&store.acting_as(treasurer), &plan, 4, |n| seen.push(n))
            .await
            .unwrap();
        assert_eq!(inserted, 6);
        assert_eq!(seen, vec![4, 6]);

        let filter = CustodyFilter {
            treasurer_id: Some(treasurer),
            ..Default::default()
        };
        let listed = CustodyRepo::new(&store)
            .list(&filter, Pagination::default())
            .await
            .unwrap();
        assert_eq!(listed.total, 6);
        assert!(listed
            .items
            .iter()
            .all(|c| AmountRange::default().contains(c.amount)));

        let inbox = NotificationRepo::new(&store.acting_as(users[0]))
            .list_for_user(users[0], true, Pagination::default())
            .await
            .unwrap();
        assert_eq!(inbox.total, 2);
        assert!(inbox.items.iter().all(|n| n.is_pending_action()));
    }
}
