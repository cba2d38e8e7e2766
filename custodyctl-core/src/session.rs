//! Authentication session and expiry arithmetic

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often the watchdog checks the session
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// How long before expiry a refresh is attempted
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 300;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: Uuid,
}

/// Upper bound on a server-supplied `expires_in`, about ten years.
const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 86_400;

impl Session {
    /// Build from an `expires_in` seconds value as returned by token endpoints.
    /// Values outside `0..=MAX_EXPIRES_IN_SECS` are clamped.
    pub fn from_expires_in(
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now + Duration::seconds(expires_in.clamp(0, MAX_EXPIRES_IN_SECS)),
            user_id,
        }
    }

    /// True once `now` is within `margin` of expiry (or past it).
    pub fn refresh_due(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now >= self.expires_at - margin
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_in: i64, now: DateTime<Utc>) -> Session {
        Session::from_expires_in("a".into(), "r".into(), expires_in, Uuid::nil(), now)
    }

    #[test]
    fn due_inside_margin() {
        let now = Utc::now();
        let margin = Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS as i64);

        assert!(!session(3600, now).refresh_due(now, margin));
        assert!(session(300, now).refresh_due(now, margin));
        assert!(session(120, now).refresh_due(now, margin));
        assert!(session(0, now).refresh_due(now, margin));
    }

    #[test]
    fn remaining_never_negative() {
        let now = Utc::now();
        let s = session(10, now);
        assert_eq!(s.remaining(now + Duration::seconds(60)), Duration::zero());
        assert!(s.is_expired(now + Duration::seconds(10)));
    }

    #[test]
    fn debug_hides_tokens() {
        let s = Session::from_expires_in(
            "secret-access".into(),
            "secret-refresh".into(),
            60,
            Uuid::nil(),
            Utc::now(),
        );
        let printed = format!("{s:?}");
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn out_of_range_expires_in_is_clamped() {
        let now = Utc::now();

        let huge = session(i64::MAX, now);
        assert_eq!(huge.expires_at, now + Duration::seconds(MAX_EXPIRES_IN_SECS));

        let negative = session(-30, now);
        assert_eq!(negative.expires_at, now);
        assert!(negative.is_expired(now));
    }
}
