//! Notifications addressed to a single user

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use uuid::Uuid;

use super::CashCustody;

/// Notification type tag.
///
/// Tags written by other clients are kept as `Other` instead of failing the read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    CustodyRequest,
    CustodyApproval,
    CustodyRejection,
    CustodyReturn,
    General,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CustodyRequest => "custody_request",
            Self::CustodyApproval => "custody_approval",
            Self::CustodyRejection => "custody_rejection",
            Self::CustodyReturn => "custody_return",
            Self::General => "general",
            Self::Other(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "custody_request" => Self::CustodyRequest,
            "custody_approval" => Self::CustodyApproval,
            "custody_rejection" => Self::CustodyRejection,
            "custody_return" => Self::CustodyReturn,
            "general" => Self::General,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NotificationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// Row of the `notifications` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_id: Option<Uuid>,
    pub is_read: bool,
    pub requires_action: bool,
    pub action_taken: bool,
    pub action_payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Still waiting for the recipient to act on it.
    pub fn is_pending_action(&self) -> bool {
        self.requires_action && !self.action_taken
    }
}

/// Input for a new notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_id: Option<Uuid>,
    pub requires_action: bool,
    pub action_payload: Value,
}

impl NewNotification {
    /// Sent to the cashier when a treasurer hands out custody.
    pub fn custody_request(custody: &CashCustody) -> Self {
        Self {
            user_id: custody.cashier_id,
            title: "New cash custody".to_owned(),
            message: format!(
                "You have received a custody of {} {} awaiting your approval",
                custody.amount, custody.currency
            ),
            kind: NotificationKind::CustodyRequest,
            related_id: Some(custody.id),
            requires_action: true,
            action_payload: json!({
                "custody_id": custody.id,
                "treasurer_id": custody.treasurer_id,
                "amount": custody.amount.to_string(),
                "currency": custody.currency,
                "actions": ["approve", "reject"],
            }),
        }
    }

    /// Sent back to the treasurer once the cashier accepted.
    pub fn custody_approval(custody: &CashCustody) -> Self {
        Self::informational(
            custody.treasurer_id,
            "Custody approved",
            format!(
                "Your custody of {} {} was approved",
                custody.amount, custody.currency
            ),
            NotificationKind::CustodyApproval,
            custody.id,
        )
    }

    /// Sent back to the treasurer when the cashier refused.
    pub fn custody_rejection(custody: &CashCustody, reason: Option<&str>) -> Self {
        let message = match reason {
            Some(reason) if !reason.trim().is_empty() => format!(
                "Your custody of {} {} was rejected: {}",
                custody.amount,
                custody.currency,
                reason.trim()
            ),
            _ => format!(
                "Your custody of {} {} was rejected",
                custody.amount, custody.currency
            ),
        };
        Self::informational(
            custody.treasurer_id,
            "Custody rejected",
            message,
            NotificationKind::CustodyRejection,
            custody.id,
        )
    }

    /// Sent to the treasurer when a cashier hands custody back.
    ///
    /// `returned` is the new record that references the original.
    pub fn custody_return(returned: &CashCustody) -> Self {
        Self::informational(
            returned.treasurer_id,
            "Custody returned",
            format!(
                "A custody of {} {} was returned",
                returned.amount, returned.currency
            ),
            NotificationKind::CustodyReturn,
            returned.id,
        )
    }

    fn informational(
        user_id: Uuid,
        title: &str,
        message: String,
        kind: NotificationKind,
        related_id: Uuid,
    ) -> Self {
        Self {
            user_id,
            title: title.to_owned(),
            message,
            kind,
            related_id: Some(related_id),
            requires_action: false,
            action_payload: json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Currency, CustodyStatus};
    use rust_decimal::Decimal;

    fn custody() -> CashCustody {
        CashCustody {
            id: Uuid::new_v4(),
            treasurer_id: Uuid::new_v4(),
            cashier_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            currency: Currency::parse("USD").unwrap(),
            amount: Decimal::new(150_050, 2),
            notes: String::new(),
            status: CustodyStatus::Pending,
            is_returned: false,
            original_custody_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unknown_tags_are_preserved() {
        let kind: NotificationKind = serde_json::from_str("\"price_update\"").unwrap();
        assert_eq!(kind, NotificationKind::Other("price_update".into()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"price_update\"");
    }

    #[test]
    fn request_targets_cashier_with_payload() {
        let custody = custody();
        let note = NewNotification::custody_request(&custody);

        assert_eq!(note.user_id, custody.cashier_id);
        assert!(note.requires_action);
        assert_eq!(note.related_id, Some(custody.id));
        assert_eq!(note.action_payload["amount"], "1500.50");
        assert_eq!(note.action_payload["currency"], "USD");
        assert!(note.message.contains("1500.50 USD"));
    }

    #[test]
    fn rejection_includes_reason_when_given() {
        let custody = custody();
        let note = NewNotification::custody_rejection(&custody, Some(" wrong amount "));
        assert_eq!(note.user_id, custody.treasurer_id);
        assert!(note.message.ends_with("rejected: wrong amount"));
        assert!(!note.requires_action);
        assert_eq!(note.action_payload, json!({}));

        let note = NewNotification::custody_rejection(&custody, Some("  "));
        assert!(note.message.ends_with("was rejected"));
    }
}
