//! Structured error types for custodyctl-core.
//!
//! Uses `thiserror` so the store and auth crates can wrap these errors,
//! while the `custodyctl` binary converts everything into `anyhow`.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::model::{CustodyStatus, RoleName};
use crate::policy::{Command, PolicyTable};

/// Main error type for custodyctl-core operations
#[derive(Error, Debug)]
pub enum CustodyError {
    /// Required configuration value is missing
    #[error("Missing configuration: {variable} is not set")]
    MissingConfig { variable: &'static str },

    /// Configuration file could not be read or parsed
    #[error("Configuration error in {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// Input failed domain validation
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Status change not allowed by the custody lifecycle
    #[error("Custody {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: CustodyStatus,
        to: CustodyStatus,
    },

    /// Unknown role name
    #[error("Unknown role '{0}'")]
    UnknownRole(String),

    /// Access policy denied the operation
    #[error("Not authorized to {command} on {table}")]
    Unauthorized {
        command: Command,
        table: PolicyTable,
    },

    /// A policy predicate reads a table whose own policy depends back on it
    #[error("Policy dependency cycle: {}", .path.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(" -> "))]
    PolicyCycle { path: Vec<PolicyTable> },

    /// Role required by the operation is not held by the actor
    #[error("Role {required} required")]
    RoleRequired { required: RoleName },
}

/// Result type alias for custodyctl-core operations
pub type Result<T> = std::result::Result<T, CustodyError>;

impl CustodyError {
    /// Create a validation error
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Create a config file error
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
