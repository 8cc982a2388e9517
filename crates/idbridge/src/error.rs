//! Error types for the adapter

use idbridge_engine::EngineError;
use thiserror::Error;

use crate::schema::SchemaError;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by adapter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation attempted before the database finished opening, or after close
    #[error("database not initialized")]
    NotInitialized,

    /// The engine refused to open a transaction on the table
    #[error("failed to create transaction for table {table}: {message}")]
    TransactionFailed { table: String, message: String },

    /// A single request finished with an error event
    #[error("{op} on table {table} failed: {message}")]
    RequestFailed {
        table: String,
        op: &'static str,
        message: String,
    },

    /// A cursor scan finished with an error event
    #[error("cursor on table {table} failed: {message}")]
    CursorFailed { table: String, message: String },

    /// No record matched a read-one query
    #[error("record not found in table {table}")]
    NotFound { table: String },

    /// A record type's primary key could not be determined
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The query asks for something the adapter refuses to do, such as an
    /// unconditional delete
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Malformed query descriptor
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Database open or delete failed
    #[error("open error: {0}")]
    Open(String),

    /// No terminal event arrived within the configured timeout
    #[error("{op} on table {table} timed out after {after_ms}ms")]
    Timeout {
        table: String,
        op: &'static str,
        after_ms: u64,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn transaction(table: &str, err: &EngineError) -> Self {
        Error::TransactionFailed {
            table: table.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn request(table: &str, op: &'static str, err: &EngineError) -> Self {
        Error::RequestFailed {
            table: table.to_string(),
            op,
            message: err.to_string(),
        }
    }

    pub(crate) fn cursor(table: &str, err: &EngineError) -> Self {
        Error::CursorFailed {
            table: table.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether this is the read-one miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
