//! Batched relation lookups for custody listings
//!
//! One `= ANY($1)` query per related table. A failed lookup is logged and
//! the rows come back without relations; rows are never dropped.

use custodyctl_core::enrich::{attach_custody, custody_profile_ids};
use custodyctl_core::{distinct_keys, CashCustody, CustodyDetails, Profile, Wallet};

use crate::error::Result;
use crate::repos::{ProfileRepo, WalletRepo};
use crate::Store;

pub async fn custody_details(store: &Store, rows: Vec<CashCustody>) -> Vec<CustodyDetails> {
    if rows.is_empty() {
        return Vec::new();
    }
    match fetch_related(store, &rows).await {
        Ok((profiles, wallets)) => attach_custody(rows, profiles, wallets),
        Err(e) => {
            tracing::warn!(rows = rows.len(), "relation lookup failed, returning bare rows: {e}");
            rows.into_iter().map(CustodyDetails::bare).collect()
        }
    }
}

async fn fetch_related(
    store: &Store,
    rows: &[CashCustody],
) -> Result<(Vec<Profile>, Vec<Wallet>)> {
    let profile_ids = custody_profile_ids(rows);
    let wallet_ids = distinct_keys(rows, |c| Some(c.wallet_id));

    let profiles = ProfileRepo::new(store).by_ids(&profile_ids).await?;
    let wallets = WalletRepo::new(store).by_ids(&wallet_ids).await?;
    tracing::debug!(
        profiles = profiles.len(),
        wallets = wallets.len(),
        "related rows fetched"
    );
    Ok((profiles, wallets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use chrono::Utc;
    use custodyctl_core::{Currency, CustodyStatus};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn dangling_references_attach_none() {
        let store = testing::store().await;
        let now = Utc::now();
        let orphan = CashCustody {
            id: Uuid::new_v4(),
            treasurer_id: Uuid::new_v4(),
            cashier_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            currency: Currency::parse("USD").unwrap(),
            amount: Decimal::new(100, 0),
            notes: String::new(),
            status: CustodyStatus::Pending,
            is_returned: false,
            original_custody_id: None,
            created_at: now,
            updated_at: now,
        };

        let details = custody_details(&store, vec![orphan.clone()]).await;
        assert_eq!(details, vec![CustodyDetails::bare(orphan)]);
    }
}
