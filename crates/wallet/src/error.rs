//! Wallet error types.

use common::{AccountId, IdentityKey};
use ledger_store::StoreError;
use thiserror::Error;

/// Stable classification of a [`WalletError`].
///
/// Callers map kinds to status codes; they never compare individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InsufficientFunds,
    SerializationConflict,
    Internal,
}

impl ErrorKind {
    /// Only serialization conflicts are safe to re-run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::SerializationConflict)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::SerializationConflict => "serialization_conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Amount is zero or negative.
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),

    /// Quantity is zero or negative.
    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    /// Any other malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A write referenced a record that does not exist.
    #[error("Request references an unknown record")]
    InvalidReference { constraint: String },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Cannot transfer coins to yourself")]
    SelfTransfer,

    /// The identity key was already used by a committed request.
    #[error("Request {0} has already been processed")]
    DuplicateRequest(IdentityKey),

    /// A uniqueness constraint rejected the write.
    #[error("A conflicting record already exists")]
    AlreadyExists { constraint: String },

    /// A decrease would leave the balance negative.
    #[error("Insufficient funds on account {account_id}: short by {shortfall}")]
    InsufficientFunds { account_id: AccountId, shortfall: i64 },

    /// The store aborted the transaction to preserve serializability.
    #[error("Transaction aborted by a concurrent update")]
    SerializationConflict(#[source] StoreError),

    /// Every attempt ended in a serialization conflict. `last` is the final one.
    #[error("Too much contention: gave up after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: StoreError,
    },

    #[error("Transaction timed out")]
    Timeout,

    /// Unclassified store failure. The source is for logs only.
    #[error("Internal error")]
    Internal(#[source] StoreError),
}

impl WalletError {
    /// Returns the stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidAmount(_)
            | WalletError::InvalidQuantity(_)
            | WalletError::InvalidRequest(_)
            | WalletError::InvalidReference { .. } => ErrorKind::Validation,
            WalletError::AccountNotFound(_) | WalletError::ItemNotFound(_) => ErrorKind::NotFound,
            WalletError::SelfTransfer
            | WalletError::DuplicateRequest(_)
            | WalletError::AlreadyExists { .. } => ErrorKind::Conflict,
            WalletError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            WalletError::SerializationConflict(_) => ErrorKind::SerializationConflict,
            WalletError::RetriesExhausted { .. }
            | WalletError::Timeout
            | WalletError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<StoreError> for WalletError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SerializationConflict(_) => WalletError::SerializationConflict(err),
            StoreError::UniqueViolation { constraint } => WalletError::AlreadyExists { constraint },
            StoreError::IntegrityViolation { constraint } => {
                WalletError::InvalidReference { constraint }
            }
            StoreError::InvalidAmount(amount) => WalletError::InvalidAmount(amount),
            other => WalletError::Internal(other),
        }
    }
}

/// Convenience type alias for wallet results.
pub type Result<T> = std::result::Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_classified() {
        let cases = [
            (
                StoreError::SerializationConflict("40001".to_string()),
                ErrorKind::SerializationConflict,
            ),
            (
                StoreError::UniqueViolation {
                    constraint: "coin_transfer_identity_key_idx".to_string(),
                },
                ErrorKind::Conflict,
            ),
            (
                StoreError::IntegrityViolation {
                    constraint: "operation_account_id_fkey".to_string(),
                },
                ErrorKind::Validation,
            ),
            (StoreError::InvalidAmount(0), ErrorKind::Validation),
            (
                StoreError::InvalidRecord("bad row".to_string()),
                ErrorKind::Internal,
            ),
            (
                StoreError::NumericOverflow("balance out of range".to_string()),
                ErrorKind::Internal,
            ),
        ];

        for (store_err, kind) in cases {
            assert_eq!(WalletError::from(store_err).kind(), kind);
        }
    }

    #[test]
    fn only_serialization_conflicts_are_retryable() {
        assert!(ErrorKind::SerializationConflict.is_retryable());
        for kind in [
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::InsufficientFunds,
            ErrorKind::Internal,
        ] {
            assert!(!kind.is_retryable(), "{kind} must not be retryable");
        }
    }

    #[test]
    fn internal_errors_hide_store_details() {
        let err = WalletError::from(StoreError::InvalidRecord(
            "unknown operation direction 9".to_string(),
        ));
        assert_eq!(err.to_string(), "Internal error");

        let err = WalletError::from(StoreError::UniqueViolation {
            constraint: "account_username_key".to_string(),
        });
        assert!(!err.to_string().contains("account_username_key"));
    }

    #[test]
    fn exhausted_retries_are_internal() {
        let err = WalletError::RetriesExhausted {
            attempts: 3,
            last: StoreError::SerializationConflict("could not serialize access".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert!(source.is_some_and(|text| text.contains("could not serialize access")));
        assert!(!err.is_retryable());
        assert_eq!(WalletError::Timeout.kind(), ErrorKind::Internal);
    }
}
