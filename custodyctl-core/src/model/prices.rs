//! Manager prices singleton and the legacy column rename plan
//!
//! Older installations stored the four prices under mixed-case column names.
//! `PriceColumnsPlan` works out, from the columns that currently exist, the
//! steps that bring the table to the lowercase layout. The store runs the
//! plan inside one transaction together with the singleton upsert.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Primary key of the only row in `manager_prices`
pub const SINGLETON_ID: i32 = 1;

/// The four manager prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManagerPrices {
    pub sell_old: Decimal,
    pub sell_new: Decimal,
    pub buy_old: Decimal,
    pub buy_new: Decimal,
}

/// One price column, with its legacy and current names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceField {
    SellOld,
    SellNew,
    BuyOld,
    BuyNew,
}

impl PriceField {
    pub const ALL: [PriceField; 4] = [
        PriceField::SellOld,
        PriceField::SellNew,
        PriceField::BuyOld,
        PriceField::BuyNew,
    ];

    /// Mixed-case name used before the rename (must be quoted in SQL)
    pub fn legacy(self) -> &'static str {
        match self {
            Self::SellOld => "SellOld",
            Self::SellNew => "SellNew",
            Self::BuyOld => "BuyOld",
            Self::BuyNew => "BuyNew",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::SellOld => "sell_old",
            Self::SellNew => "sell_new",
            Self::BuyOld => "buy_old",
            Self::BuyNew => "buy_new",
        }
    }
}

/// What to do with one price field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceStep {
    /// Only the legacy column exists
    Rename(PriceField),
    /// Both exist: copy legacy values into nulls, then drop the legacy column
    Merge(PriceField),
    /// Neither exists
    Add(PriceField),
}

impl PriceStep {
    pub fn field(self) -> PriceField {
        match self {
            Self::Rename(field) | Self::Merge(field) | Self::Add(field) => field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PriceColumnsPlan {
    pub steps: Vec<PriceStep>,
}

impl PriceColumnsPlan {
    /// Plan the rename from the table's current column names.
    pub fn from_columns(columns: &BTreeSet<String>) -> Self {
        let steps = PriceField::ALL
            .into_iter()
            .filter_map(|field| {
                let legacy = columns.contains(field.legacy());
                let current = columns.contains(field.column());
                match (legacy, current) {
                    (true, false) => Some(PriceStep::Rename(field)),
                    (true, true) => Some(PriceStep::Merge(field)),
                    (false, false) => Some(PriceStep::Add(field)),
                    (false, true) => None,
                }
            })
            .collect();
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Column set after the plan has run.
    pub fn apply_to(&self, columns: &mut BTreeSet<String>) {
        for step in &self.steps {
            let field = step.field();
            columns.remove(field.legacy());
            columns.insert(field.column().to_owned());
        }
    }
}
