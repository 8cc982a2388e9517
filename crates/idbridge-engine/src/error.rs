//! Error types for the object-store engine

use std::fmt;

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// DOM-style error names reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Named database object (store, index) does not exist
    NotFound,
    /// A key or unique index constraint was violated
    Constraint,
    /// The data supplied is not valid for the operation (e.g. bad key)
    Data,
    /// The operation is not allowed in the object's current state
    InvalidState,
    /// The transaction is no longer accepting requests
    TransactionInactive,
    /// A write was attempted in a read-only transaction
    ReadOnly,
    /// The requested version is lower than the stored one
    Version,
    /// The transaction was aborted
    Abort,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Constraint => "ConstraintError",
            ErrorKind::Data => "DataError",
            ErrorKind::InvalidState => "InvalidStateError",
            ErrorKind::TransactionInactive => "TransactionInactiveError",
            ErrorKind::ReadOnly => "ReadOnlyError",
            ErrorKind::Version => "VersionError",
            ErrorKind::Abort => "AbortError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error reported by the engine, either synchronously or through an error event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Constraint, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    pub fn inactive(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransactionInactive, message)
    }

    pub fn read_only(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReadOnly, message)
    }

    pub fn version(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Version, message)
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Abort, message)
    }
}
