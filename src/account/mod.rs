//! Account Store, rotation state and the Account Manager that owns them.

pub mod audit;
pub mod lock;
pub mod manager;
pub mod state;
pub mod store;

pub use audit::{AuditEntry, AuditEvent, AuditLog, SwitchReason};
pub use manager::{
    AccountHealth, AccountManager, AccountSummary, RotationStats, DEFAULT_LOCK_TIMEOUT,
};
pub use state::{AccountMeta, RotationState};
