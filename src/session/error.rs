//! Session error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ErrorCode;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// State keys must be non-empty strings.
    #[error("state key must be a non-empty string")]
    InvalidKey,

    /// A value or trajectory payload could not be represented as JSON.
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },

    /// Artifact names must be non-empty strings.
    #[error("artifact name must be a non-empty string")]
    InvalidName,

    /// The named artifact does not exist.
    #[error("artifact not found: {name}")]
    ArtifactNotFound { name: String },

    /// The artifact exceeds the configured size ceiling.
    #[error("artifact size {size} bytes exceeds maximum {max} bytes")]
    ArtifactTooLarge { size: u64, max: u64 },

    /// Failed to read or write a file.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The underlying database rejected an operation.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The file was written with an incompatible schema version.
    #[error("incompatible schema version: expected {expected}, got {actual}")]
    SchemaMismatch { expected: i64, actual: i64 },

    /// The file is missing required data or contains unreadable rows.
    #[error("session file is corrupt: {reason}")]
    Corrupt { reason: String },
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Create an IO error with the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid-value error with the given reason.
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            reason: reason.into(),
        }
    }

    /// Create a corruption error with the given reason.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }

    /// The wire-level error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::InvalidKey => ErrorCode::InvalidKey,
            SessionError::InvalidValue { .. } => ErrorCode::InvalidValue,
            SessionError::InvalidName => ErrorCode::InvalidName,
            SessionError::ArtifactNotFound { .. } => ErrorCode::ArtifactNotFound,
            SessionError::ArtifactTooLarge { .. } => ErrorCode::ArtifactTooLarge,
            SessionError::Io { .. }
            | SessionError::Database(_)
            | SessionError::SchemaMismatch { .. }
            | SessionError::Corrupt { .. } => ErrorCode::PersistenceError,
        }
    }
}
