//! Roles and user profiles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CustodyError;

/// The fixed set of role names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleName {
    Manager,
    Treasurer,
    Cashier,
    DealingsExecutioner,
}

impl RoleName {
    pub const ALL: [RoleName; 4] = [
        RoleName::Manager,
        RoleName::Treasurer,
        RoleName::Cashier,
        RoleName::DealingsExecutioner,
    ];

    /// Role assigned to profiles that have none.
    pub const DEFAULT: RoleName = RoleName::Manager;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Treasurer => "treasurer",
            Self::Cashier => "cashier",
            Self::DealingsExecutioner => "dealings_executioner",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Manager => "Full access to custody, pricing and user administration",
            Self::Treasurer => "Hands out cash custody to cashiers",
            Self::Cashier => "Receives, approves and returns cash custody",
            Self::DealingsExecutioner => "Executes currency dealings",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == lowered)
            .ok_or_else(|| CustodyError::UnknownRole(s.to_owned()))
    }
}

/// Row of the `roles` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: RoleName,
    pub description: String,
}

/// Row of the `profiles` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role_id: Option<Uuid>,
}
