use thiserror::Error;

/// SQLSTATE codes the store translates into classified errors.
mod sqlstate {
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const NOT_NULL_VIOLATION: &str = "23502";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";
}

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store aborted the transaction because it raced with another one.
    /// Re-running the whole unit of work is safe.
    #[error("Serialization conflict: {0}")]
    SerializationConflict(String),

    /// A unique constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A foreign key, not-null or check constraint rejected the write.
    #[error("Integrity constraint violated: {constraint}")]
    IntegrityViolation { constraint: String },

    /// A balance or aggregate does not fit in an `i64`.
    #[error("Numeric overflow: {0}")]
    NumericOverflow(String),

    /// An operation was built with a zero or negative magnitude.
    #[error("Invalid operation amount {0}: magnitude must be positive")]
    InvalidAmount(i64),

    /// A stored row could not be mapped back into a record.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Any other database error.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if the error is a transient write-write conflict.
    pub fn is_serialization_conflict(&self) -> bool {
        matches!(self, StoreError::SerializationConflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let (code, constraint, message) = match &err {
            sqlx::Error::Database(db_err) => (
                db_err.code().map(|code| code.into_owned()),
                db_err.constraint().unwrap_or_default().to_string(),
                db_err.message().to_string(),
            ),
            _ => (None, String::new(), String::new()),
        };

        match code.as_deref() {
            Some(sqlstate::SERIALIZATION_FAILURE) | Some(sqlstate::DEADLOCK_DETECTED) => {
                StoreError::SerializationConflict(message)
            }
            Some(sqlstate::UNIQUE_VIOLATION) => StoreError::UniqueViolation { constraint },
            Some(sqlstate::FOREIGN_KEY_VIOLATION)
            | Some(sqlstate::NOT_NULL_VIOLATION)
            | Some(sqlstate::CHECK_VIOLATION) => StoreError::IntegrityViolation { constraint },
            Some(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE) => StoreError::NumericOverflow(message),
            _ => StoreError::Database(err),
        }
    }
}

/// Result type for ledger store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_unclassified() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
        assert!(!err.is_serialization_conflict());
    }

    #[test]
    fn serialization_conflict_is_detected() {
        let err = StoreError::SerializationConflict("could not serialize access".into());
        assert!(err.is_serialization_conflict());
        assert!(!StoreError::InvalidAmount(0).is_serialization_conflict());
    }
}
