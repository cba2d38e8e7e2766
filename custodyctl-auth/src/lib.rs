//! custodyctl-auth: sign-up, sign-in and session refresh
//!
//! `AuthClient` talks to a GoTrue-compatible auth endpoint. `SessionWatchdog`
//! keeps a shared session fresh by renewing it shortly before it expires.

pub mod client;
pub mod error;
pub mod watchdog;

pub use client::{AuthClient, SignUp};
pub use error::{AuthError, Result};
pub use watchdog::{SessionRefresher, SessionWatchdog, SharedSession, TickOutcome, WatchdogHandle};
