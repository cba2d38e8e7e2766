use custodyctl_core::messages::GENERIC_MESSAGE;
use custodyctl_core::validation::PasswordIssue;
use custodyctl_core::{format_driver_error, CustodyError, DriverError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with an error body
    #[error("Auth endpoint returned {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Password rejected: {}", .issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", "))]
    WeakPassword { issues: Vec<PasswordIssue> },

    #[error("Unexpected auth response: {0}")]
    Decode(String),

    #[error(transparent)]
    Domain(#[from] CustodyError),
}

impl AuthError {
    /// Message shown to users.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { code, message, .. } => {
                format_driver_error(&DriverError::new(code.as_deref(), message.clone()), "account")
            }
            Self::WeakPassword { .. } | Self::Domain(_) => self.to_string(),
            Self::Http(_) | Self::Decode(_) => GENERIC_MESSAGE.to_owned(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_use_shared_wording() {
        let err = AuthError::Api {
            status: 400,
            code: Some("invalid_grant".into()),
            message: "Invalid login credentials".into(),
        };
        assert_eq!(err.user_message(), "invalid email or password");

        let err = AuthError::Api {
            status: 400,
            code: Some("email_not_confirmed".into()),
            message: "Email not confirmed".into(),
        };
        assert_eq!(err.user_message(), "please confirm your email");
    }

    #[test]
    fn weak_password_lists_issues() {
        let err = AuthError::WeakPassword {
            issues: vec![PasswordIssue::TooShort, PasswordIssue::MissingDigit],
        };
        let message = err.user_message();
        assert!(message.contains("at least 8 characters"));
        assert!(message.contains("digit"));
    }
}
