//! User-facing messages for driver and auth failures
//!
//! Storage and auth crates convert their errors into a `DriverError` and
//! format it here, so every surface reports the same wording.

use serde::Serialize;

/// Driver-neutral view of a failure: SQLSTATE (or auth error code) plus message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DriverError {
    pub code: Option<String>,
    pub message: String,
}

impl DriverError {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_owned),
            message: message.into(),
        }
    }
}

pub const UNIQUE_VIOLATION: &str = "23505";
pub const FOREIGN_KEY_VIOLATION: &str = "23503";
pub const INVALID_TEXT_REPRESENTATION: &str = "22P02";
pub const INVALID_JSON_TEXT: &str = "22032";
pub const INSUFFICIENT_PRIVILEGE: &str = "42501";

pub const GENERIC_MESSAGE: &str = "an error occurred";

/// Map a failure to the message shown to users. `context` names the thing
/// being written (e.g. "custody record").
pub fn format_driver_error(err: &DriverError, context: &str) -> String {
    let code = err.code.as_deref().unwrap_or_default();
    let message = err.message.as_str();

    match code {
        UNIQUE_VIOLATION => {
            let context = context.trim();
            if context.is_empty() {
                "record already exists".to_owned()
            } else {
                format!("{context} already exists")
            }
        }
        FOREIGN_KEY_VIOLATION => "the referenced record does not exist".to_owned(),
        INVALID_TEXT_REPRESENTATION | INVALID_JSON_TEXT => "invalid JSON payload".to_owned(),
        INSUFFICIENT_PRIVILEGE => "not authorized".to_owned(),
        _ if message.contains("invalid input syntax for type json") => {
            "invalid JSON payload".to_owned()
        }
        _ if message.contains("row-level security") => "not authorized".to_owned(),
        _ if message.contains("Email not confirmed") => "please confirm your email".to_owned(),
        _ if message.contains("Invalid login credentials") => {
            "invalid email or password".to_owned()
        }
        _ => GENERIC_MESSAGE.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_mentions_context() {
        let err = DriverError::new(Some("23505"), "duplicate key value violates unique constraint");
        assert_eq!(format_driver_error(&err, "role"), "role already exists");
        assert!(format_driver_error(&err, "").contains("already exists"));
    }

    #[test]
    fn known_codes() {
        let fk = DriverError::new(Some("23503"), "insert or update violates foreign key");
        assert_eq!(
            format_driver_error(&fk, "custody"),
            "the referenced record does not exist"
        );

        let json = DriverError::new(Some("22P02"), "bad");
        assert_eq!(format_driver_error(&json, "x"), "invalid JSON payload");

        let rls = DriverError::new(
            None,
            "new row violates row-level security policy for table \"cash_custody\"",
        );
        assert_eq!(format_driver_error(&rls, "custody"), "not authorized");
    }

    #[test]
    fn auth_messages() {
        let unconfirmed = DriverError::new(None, "Email not confirmed");
        assert_eq!(
            format_driver_error(&unconfirmed, "session"),
            "please confirm your email"
        );

        let bad = DriverError::new(Some("400"), "Invalid login credentials");
        assert_eq!(format_driver_error(&bad, "session"), "invalid email or password");
    }

    #[test]
    fn json_message_without_code() {
        let err = DriverError::new(None, "invalid input syntax for type json at line 1");
        assert_eq!(format_driver_error(&err, "notification"), "invalid JSON payload");
    }

    #[test]
    fn anything_else_is_generic() {
        let err = DriverError::new(Some("08006"), "connection failure");
        assert_eq!(format_driver_error(&err, "custody"), GENERIC_MESSAGE);
        assert_eq!(format_driver_error(&DriverError::default(), ""), GENERIC_MESSAGE);
    }
}
