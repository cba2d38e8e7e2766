//! Error types for custodyctl-store

use custodyctl_core::messages::GENERIC_MESSAGE;
use custodyctl_core::{format_driver_error, CustodyError, DriverError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Domain(#[from] CustodyError),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("invalid column type '{0}'")]
    InvalidColumnType(String),
}

impl StoreError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Driver-neutral view of a database failure, if this is one.
    pub fn driver_error(&self) -> Option<DriverError> {
        match self {
            Self::Sqlx(sqlx::Error::Database(db)) => {
                Some(DriverError::new(db.code().as_deref(), db.message()))
            }
            _ => None,
        }
    }

    /// Message safe to show to end users. `context` names the record kind.
    pub fn user_message(&self, context: &str) -> String {
        if let Some(driver) = self.driver_error() {
            return format_driver_error(&driver, context);
        }
        match self {
            Self::Domain(CustodyError::Unauthorized { .. }) => "not authorized".to_owned(),
            Self::Domain(err) => err.to_string(),
            Self::NotFound { .. } => self.to_string(),
            _ => GENERIC_MESSAGE.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodyctl_core::{Command, PolicyTable};

    #[test]
    fn non_database_errors_are_generic_or_domain() {
        let err = StoreError::Sqlx(sqlx::Error::RowNotFound);
        assert!(err.driver_error().is_none());
        assert_eq!(err.user_message("custody"), GENERIC_MESSAGE);

        let err = StoreError::from(CustodyError::Unauthorized {
            command: Command::Update,
            table: PolicyTable::CashCustody,
        });
        assert_eq!(err.user_message("custody"), "not authorized");

        let err = StoreError::not_found("custody", "42");
        assert_eq!(err.user_message("custody"), "not found: custody '42'");
    }
}
