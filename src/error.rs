//! Error taxonomy shared across the alert pipeline and the collection tasks

use std::time::Duration;

use thiserror::Error;

/// Fatal startup errors: the trap listener cannot run
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("failed to load dictionary {module}: {reason}")]
    Dictionary { module: String, reason: String },

    #[error("failed to bind trap listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised by driver resolution and driver capability calls
///
/// None of these are retried automatically; they surface to the immediate
/// caller.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("storage {0} not found")]
    StorageNotFound(String),

    #[error("no driver registered for vendor '{0}'")]
    DriverNotFound(String),

    #[error("{0} is not supported by this driver")]
    NotSupported(&'static str),

    #[error("invalid alert data: {0}")]
    InvalidAlertData(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device call '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("device communication failed: {0}")]
    Transport(String),

    #[error("persistence error: {0}")]
    Database(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

impl From<crate::db::DbError> for DriverError {
    fn from(err: crate::db::DbError) -> Self {
        match err {
            crate::db::DbError::NotFound { kind: "storage", id } => DriverError::StorageNotFound(id),
            other => DriverError::Database(other.to_string()),
        }
    }
}
