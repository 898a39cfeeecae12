//! Error types for persistence operations

use thiserror::Error;

/// Result type alias for persistence operations
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while talking to the persistence collaborator
#[derive(Error, Debug)]
pub enum DbError {
    /// Record does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Database connection failed
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Database query failed
    #[error("database query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    /// Record serialization/deserialization error
    #[error("record serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        DbError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::QueryFailed(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}
