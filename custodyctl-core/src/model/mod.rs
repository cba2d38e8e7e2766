//! Domain models for custody tracking
//!
//! Types validate at construction; storage crates convert their rows into
//! these types and never hand raw strings to callers.

pub mod custody;
pub mod notification;
pub mod prices;
pub mod role;
pub mod wallet;

pub use custody::{CashCustody, CustodyStatus, NewCustody};
pub use notification::{NewNotification, Notification, NotificationKind};
pub use prices::{ManagerPrices, PriceColumnsPlan, PriceField, PriceStep, SINGLETON_ID};
pub use role::{Profile, Role, RoleName};
pub use wallet::{Currency, Wallet};
