pub mod config;
pub mod enrich;
pub mod error;
pub mod messages;
pub mod model;
pub mod policy;
pub mod seed;
pub mod session;
pub mod validation;

pub use config::{AuthSettings, CustodyConfig, CustodyctlConfig};
pub use enrich::{attach, attach_custody, distinct_keys, index_by, CustodyDetails, Enriched};
pub use error::{CustodyError, Result};
pub use messages::{format_driver_error, DriverError};
pub use model::{
    CashCustody, Currency, CustodyStatus, ManagerPrices, NewCustody, NewNotification,
    Notification, NotificationKind, PriceColumnsPlan, PriceField, PriceStep, Profile, Role,
    RoleName, Wallet,
};
pub use policy::{Actor, Command, ManagerIds, PolicySet, PolicyTable, Predicate};
pub use seed::{AmountRange, SeedPlan};
pub use session::Session;
pub use validation::{validate_password, PasswordCheck, PasswordStrength};
