//! Cash custody records and their lifecycle

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Currency;
use crate::error::{CustodyError, Result};

/// Lifecycle state of a custody record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl CustodyStatus {
    pub const ALL: [CustodyStatus; 4] = [
        CustodyStatus::Pending,
        CustodyStatus::Approved,
        CustodyStatus::Rejected,
        CustodyStatus::Returned,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
        }
    }

    /// Only pending requests can be decided; `returned` is never reached by
    /// updating a record, a return creates a new one.
    pub fn can_transition_to(self, next: CustodyStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected)
        )
    }
}

impl fmt::Display for CustodyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustodyStatus {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CustodyError::invalid("status", format!("unknown status '{s}'")))
    }
}

/// A custody record as stored in `cash_custody`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashCustody {
    pub id: Uuid,
    pub treasurer_id: Uuid,
    pub cashier_id: Uuid,
    pub wallet_id: Uuid,
    pub currency: Currency,
    pub amount: Decimal,
    pub notes: String,
    pub status: CustodyStatus,
    pub is_returned: bool,
    pub original_custody_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CashCustody {
    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn ensure_transition(&self, next: CustodyStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(CustodyError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            })
        }
    }

    /// Approved custody that has not been handed back yet.
    pub fn ensure_returnable(&self) -> Result<()> {
        if self.status == CustodyStatus::Approved && !self.is_returned {
            Ok(())
        } else {
            Err(CustodyError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: CustodyStatus::Returned,
            })
        }
    }

    /// Check the self-reference invariant for return records.
    pub fn validate(&self) -> Result<()> {
        if self.status == CustodyStatus::Returned && self.original_custody_id.is_none() {
            return Err(CustodyError::invalid(
                "original_custody_id",
                "a returned record must reference its originating custody",
            ));
        }
        if self.original_custody_id == Some(self.id) {
            return Err(CustodyError::invalid(
                "original_custody_id",
                "a custody record cannot reference itself",
            ));
        }
        Ok(())
    }
}

/// Input for a new custody request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCustody {
    pub treasurer_id: Uuid,
    pub cashier_id: Uuid,
    pub wallet_id: Uuid,
    pub currency: Currency,
    pub amount: Decimal,
    #[serde(default)]
    pub notes: String,
}

impl NewCustody {
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(CustodyError::invalid("amount", "must be greater than zero"));
        }
        if self.treasurer_id == self.cashier_id {
            return Err(CustodyError::invalid(
                "cashier_id",
                "treasurer and cashier must be different users",
            ));
        }
        Ok(())
    }

    /// Build the record handed back for `original`.
    pub fn returning(original: &CashCustody, notes: impl Into<String>) -> Self {
        Self {
            treasurer_id: original.treasurer_id,
            cashier_id: original.cashier_id,
            wallet_id: original.wallet_id,
            currency: original.currency.clone(),
            amount: original.amount,
            notes: notes.into(),
        }
    }
}
