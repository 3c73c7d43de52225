//! Error types for account rotation.

use std::time::Duration;
use thiserror::Error;

/// Result type for Account Manager operations.
pub type Result<T> = std::result::Result<T, RotationError>;

/// Errors surfaced by the Account Manager.
///
/// Every variant is reported before any durable state is modified, except
/// `Storage` raised while persisting, in which case the active credential
/// file has already been rolled back.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("account {0} not found")]
    AccountNotFound(u32),

    #[error("no accounts available")]
    NoAccountsAvailable,

    #[error("account {0} is active; switch to another account before removing it")]
    CannotRemoveActive(u32),

    #[error("could not acquire rotation lock within {0:?}")]
    LockTimeout(Duration),

    #[error("credential swap failed: {0}")]
    SwapFailed(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl RotationError {
    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{}: {}", context, err))
    }

    pub(crate) fn swap(context: &str, err: impl std::fmt::Display) -> Self {
        Self::SwapFailed(format!("{}: {}", context, err))
    }
}
