//! Input validation helpers

use std::fmt;

use serde::Serialize;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStrength {
    Weak,
    Fair,
    Strong,
    VeryStrong,
}

impl fmt::Display for PasswordStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Weak => "weak",
            Self::Fair => "fair",
            Self::Strong => "strong",
            Self::VeryStrong => "very strong",
        })
    }
}

/// A requirement the password does not meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordIssue {
    TooShort,
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
}

impl fmt::Display for PasswordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "must be at least {MIN_PASSWORD_LEN} characters"),
            Self::MissingUppercase => f.write_str("must contain an uppercase letter"),
            Self::MissingLowercase => f.write_str("must contain a lowercase letter"),
            Self::MissingDigit => f.write_str("must contain a digit"),
        }
    }
}

/// Result of scoring a password. Special characters and extra length raise
/// the score but are never required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordCheck {
    pub valid: bool,
    /// 0..=6
    pub score: u8,
    pub strength: PasswordStrength,
    pub issues: Vec<PasswordIssue>,
}

pub fn validate_password(password: &str) -> PasswordCheck {
    let length = password.chars().count();
    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    let mut issues = Vec::new();
    if length < MIN_PASSWORD_LEN {
        issues.push(PasswordIssue::TooShort);
    }
    if !has_upper {
        issues.push(PasswordIssue::MissingUppercase);
    }
    if !has_lower {
        issues.push(PasswordIssue::MissingLowercase);
    }
    if !has_digit {
        issues.push(PasswordIssue::MissingDigit);
    }

    let score = [
        length >= MIN_PASSWORD_LEN,
        length >= 12,
        has_upper,
        has_lower,
        has_digit,
        has_special,
    ]
    .into_iter()
    .filter(|met| *met)
    .count() as u8;

    let strength = match score {
        0..=2 => PasswordStrength::Weak,
        3..=4 => PasswordStrength::Fair,
        5 => PasswordStrength::Strong,
        _ => PasswordStrength::VeryStrong,
    };

    PasswordCheck {
        valid: issues.is_empty(),
        score,
        strength,
        issues,
    }
}

/// Loose `local@domain.tld` shape check for sign-up input.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_without_special_characters() {
        let check = validate_password("Abcdefg1");
        assert!(check.valid);
        assert!(check.issues.is_empty());
        assert_eq!(check.score, 4);
        assert_eq!(check.strength, PasswordStrength::Fair);
    }

    #[test]
    fn long_password_with_symbols_is_very_strong() {
        let check = validate_password("Correct-Horse-9");
        assert!(check.valid);
        assert_eq!(check.strength, PasswordStrength::VeryStrong);
    }

    #[test]
    fn reports_every_missing_requirement() {
        let check = validate_password("abc");
        assert!(!check.valid);
        assert_eq!(
            check.issues,
            vec![
                PasswordIssue::TooShort,
                PasswordIssue::MissingUppercase,
                PasswordIssue::MissingDigit,
            ]
        );
    }

    #[test]
    fn empty_password_is_weak_not_a_panic() {
        let check = validate_password("");
        assert!(!check.valid);
        assert_eq!(check.score, 0);
        assert_eq!(check.strength, PasswordStrength::Weak);
    }

    #[test]
    fn email_shape() {
        assert!(is_plausible_email("cashier@example.com"));
        assert!(!is_plausible_email("cashier@example"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("a b@example.com"));
    }
}
