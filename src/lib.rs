//! Round-robin rotation of OAuth credentials for a quota-limited CLI tool.
//!
//! The [`account`] module owns the on-disk Account Store and the active
//! credential file; [`wrapper`] runs the tool and rotates on quota errors.

pub mod account;
pub mod config;
pub mod error;
pub mod paths;
pub mod setup;
pub mod wrapper;

pub use account::{AccountHealth, AccountManager, AccountSummary, RotationStats, SwitchReason};
pub use config::{RotationConfig, WrapperConfig};
pub use error::{Result, RotationError};
pub use paths::StorePaths;
pub use wrapper::{CallError, CallResult, InvocationWrapper};
