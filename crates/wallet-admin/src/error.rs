//! Admin error types.

use ledger_store::StoreError;
use thiserror::Error;
use wallet::WalletError;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for admin results.
pub type Result<T> = std::result::Result<T, AdminError>;
