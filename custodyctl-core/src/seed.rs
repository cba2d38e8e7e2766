//! Test-data seeding plan
//!
//! `SeedPlan::build` is pure given the rng; the store inserts the plan in
//! sequential batches.

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CustodyError, Result};
use crate::model::{Currency, NewCustody, Wallet};

pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Half-open amount range in whole currency units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: u32,
    pub max: u32,
}

impl Default for AmountRange {
    fn default() -> Self {
        Self { min: 100, max: 10_000 }
    }
}

impl AmountRange {
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min == 0 || min >= max {
            return Err(CustodyError::invalid(
                "amount range",
                format!("expected 0 < min < max, got [{min}, {max})"),
            ));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= Decimal::from(self.min) && amount < Decimal::from(self.max)
    }

    /// Random amount in the range, rounded to cents.
    pub fn sample(&self, rng: &mut impl Rng) -> Decimal {
        let cents = rng.gen_range(i64::from(self.min) * 100..i64::from(self.max) * 100);
        Decimal::new(cents, 2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedPlan {
    pub records: Vec<NewCustody>,
}

impl SeedPlan {
    /// One pending custody per `(user, currency)` pair, drawn from a wallet
    /// in that currency (or the first wallet when none matches).
    pub fn build(
        treasurer: Uuid,
        users: &[Uuid],
        currencies: &[Currency],
        wallets: &[Wallet],
        range: AmountRange,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        if users.contains(&treasurer) {
            return Err(CustodyError::invalid(
                "users",
                "the seeding treasurer cannot also receive custody",
            ));
        }
        let fallback = wallets
            .first()
            .ok_or_else(|| CustodyError::invalid("wallets", "at least one wallet is required"))?;

        let mut records = Vec::with_capacity(users.len() * currencies.len());
        for &cashier in users {
            for currency in currencies {
                let wallet = wallets
                    .iter()
                    .find(|w| &w.currency == currency)
                    .unwrap_or(fallback);
                records.push(NewCustody {
                    treasurer_id: treasurer,
                    cashier_id: cashier,
                    wallet_id: wallet.id,
                    currency: currency.clone(),
                    amount: range.sample(rng),
                    notes: "Seeded test custody".to_owned(),
                });
            }
        }

        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records grouped into insert batches of at most `size`.
    pub fn batches(&self, size: usize) -> impl Iterator<Item = &[NewCustody]> {
        self.records.chunks(size.max(1))
    }

    pub fn total(&self) -> Decimal {
        self.records.iter().map(|r| r.amount).sum()
    }
}
