//! Error types for the PostgreSQL storage backend.

use kitsune_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique constraint violations (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for foreign key violations (23503).
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Connection(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A row could not be mapped to a record.
    #[error("Row mapping error: {message}")]
    Mapping { message: String },
}

impl PostgresError {
    /// Creates a new row mapping error.
    #[must_use]
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => match &e {
                SqlxError::Database(_) if has_pg_error_code(&e, PG_FOREIGN_KEY_VIOLATION) => {
                    StorageError::invalid_record(e.to_string())
                }
                SqlxError::Database(_) => StorageError::internal(e.to_string()),
                SqlxError::RowNotFound => StorageError::internal(e.to_string()),
                _ => StorageError::connection_error(e.to_string()),
            },
            PostgresError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            PostgresError::Mapping { message } => StorageError::invalid_record(message),
        }
    }
}

impl From<StorageError> for PostgresError {
    fn from(err: StorageError) -> Self {
        Self::mapping(err.to_string())
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
