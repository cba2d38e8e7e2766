//! Repository implementations for database access
//!
//! Each repository follows these patterns:
//! - Borrows the shared `Store` and opens its transactions through it
//! - Handles conflicts via ON CONFLICT (no check-then-insert)
//! - Workflow steps and their notifications commit together

pub mod custody;
pub mod notifications;
pub mod prices;
pub mod profiles;
pub mod roles;
pub mod wallets;

pub use custody::{CustodyFilter, CustodyRepo};
pub use notifications::NotificationRepo;
pub use prices::PriceRepo;
pub use profiles::ProfileRepo;
pub use roles::RoleRepo;
pub use wallets::WalletRepo;
