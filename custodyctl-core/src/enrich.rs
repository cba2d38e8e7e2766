//! Client-side relation enrichment
//!
//! Base rows carry foreign keys; related rows are fetched in one batched
//! query per relation and attached here. Every base row is kept: a key with
//! no match attaches `None`.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

use crate::model::{CashCustody, Profile, Wallet};

/// Distinct non-null keys in first-seen order.
pub fn distinct_keys<B, K, F>(rows: &[B], key: F) -> Vec<K>
where
    K: Eq + Hash + Clone,
    F: Fn(&B) -> Option<K>,
{
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter_map(key)
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

/// Id → row map for attaching
pub fn index_by<R, K, F>(related: impl IntoIterator<Item = R>, key: F) -> HashMap<K, R>
where
    K: Eq + Hash,
    F: Fn(&R) -> K,
{
    related.into_iter().map(|r| (key(&r), r)).collect()
}

/// A base row with at most one attached relation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enriched<B, R> {
    #[serde(flatten)]
    pub row: B,
    pub related: Option<R>,
}

/// Attach `related[key(row)]` to each row. Output length equals input length.
pub fn attach<B, R, K, F>(rows: Vec<B>, related: &HashMap<K, R>, key: F) -> Vec<Enriched<B, R>>
where
    K: Eq + Hash,
    R: Clone,
    F: Fn(&B) -> Option<K>,
{
    rows.into_iter()
        .map(|row| {
            let related = key(&row).and_then(|k| related.get(&k).cloned());
            Enriched { row, related }
        })
        .collect()
}

/// Custody row with its parties and wallet resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustodyDetails {
    #[serde(flatten)]
    pub custody: CashCustody,
    pub treasurer: Option<Profile>,
    pub cashier: Option<Profile>,
    pub wallet: Option<Wallet>,
}

impl CustodyDetails {
    pub fn bare(custody: CashCustody) -> Self {
        Self {
            custody,
            treasurer: None,
            cashier: None,
            wallet: None,
        }
    }
}

/// Profile ids referenced by treasurer or cashier columns.
pub fn custody_profile_ids(rows: &[CashCustody]) -> Vec<uuid::Uuid> {
    let parties: Vec<uuid::Uuid> = rows
        .iter()
        .flat_map(|c| [c.treasurer_id, c.cashier_id])
        .collect();
    distinct_keys(&parties, |id| Some(*id))
}

pub fn attach_custody(
    rows: Vec<CashCustody>,
    profiles: Vec<Profile>,
    wallets: Vec<Wallet>,
) -> Vec<CustodyDetails> {
    let profiles = index_by(profiles, |p| p.id);
    let wallets = index_by(wallets, |w| w.id);
    rows.into_iter()
        .map(|custody| CustodyDetails {
            treasurer: profiles.get(&custody.treasurer_id).cloned(),
            cashier: profiles.get(&custody.cashier_id).cloned(),
            wallet: wallets.get(&custody.wallet_id).cloned(),
            custody,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Base {
        id: u32,
        parent: Option<u32>,
    }

    #[test]
    fn keys_are_distinct_and_skip_none() {
        let rows = vec![
            Base { id: 1, parent: Some(7) },
            Base { id: 2, parent: None },
            Base { id: 3, parent: Some(7) },
            Base { id: 4, parent: Some(9) },
        ];
        assert_eq!(distinct_keys(&rows, |r| r.parent), vec![7, 9]);
    }

    #[test]
    fn missing_relations_attach_none() {
        let rows = vec![
            Base { id: 1, parent: Some(7) },
            Base { id: 2, parent: None },
            Base { id: 3, parent: Some(8) },
        ];
        let related = index_by(vec![(7u32, "seven")], |r| r.0);
        let out = attach(rows, &related, |r| r.parent);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].related, Some((7, "seven")));
        assert_eq!(out[1].related, None);
        assert_eq!(out[2].related, None);
        assert_eq!(out[2].row.id, 3);
    }

    #[test]
    fn enriched_serializes_flat() {
        let out = attach(
            vec![Base { id: 1, parent: None }],
            &HashMap::<u32, String>::new(),
            |r| r.parent,
        );
        let json = serde_json::to_value(&out[0]).unwrap();
        assert_eq!(json["id"], 1);
        assert!(json["related"].is_null());
    }
}
