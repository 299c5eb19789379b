//! Error types for the dgnsync engine and CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=store, 3=not_found, 4=validation, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Store failures (`Error::Database`) are fatal to a run. A SyncInfo store
//! that failed mid-write cannot be trusted for deletion inference, so
//! nothing in the engine retries them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dgnsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Store (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    SourceNotFound,

    // Validation (exit 4)
    InvalidSource,
    InvalidArgument,

    // Sync (exit 6)
    Cancelled,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::SourceNotFound => "SOURCE_NOT_FOUND",
            Self::InvalidSource => "INVALID_SOURCE",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Cancelled => "CANCELLED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::SourceNotFound => 3,
            Self::InvalidSource | Self::InvalidArgument => 4,
            Self::Cancelled => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running with corrected input can succeed.
    ///
    /// Store errors are deliberately not retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidSource | Self::InvalidArgument | Self::Cancelled
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur while synchronizing.
#[derive(Error, Debug)]
pub enum Error {
    #[error("SyncInfo store not found: run `dgnsync convert` first")]
    NotInitialized,

    #[error("SyncInfo store already exists at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Invalid source file {path}: {message}")]
    InvalidSource { path: PathBuf, message: String },

    #[error("Run cancelled; records committed so far are kept, deletions were not inferred")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::SourceNotFound { .. } => ErrorCode::SourceNotFound,
            Self::InvalidSource { .. } => ErrorCode::InvalidSource,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some(
                "Run `dgnsync convert <sources..>` to create the SyncInfo store, \
                 or pass `--db` to point at an existing one."
                    .to_string(),
            ),

            Self::AlreadyInitialized { path } => Some(format!(
                "A SyncInfo store already exists at {}. Use `dgnsync update` to \
                 synchronize changes, or `convert --force` to start over.",
                path.display()
            )),

            Self::SourceNotFound { path } => Some(format!(
                "Check that {} exists and is readable.",
                path.display()
            )),

            Self::InvalidSource { .. } => Some(
                "Source snapshots must be JSON documents with `name`, `models` and `views`."
                    .to_string(),
            ),

            Self::Cancelled => Some(
                "Re-run `dgnsync update` to finish; unchanged records will be skipped.".to_string(),
            ),

            Self::Database(_) => Some(
                "The SyncInfo store could not be read or written. The run was aborted \
                 so that deletions are not inferred from partial state."
                    .to_string(),
            ),

            Self::Io(_) | Self::Json(_) | Self::InvalidArgument(_) | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_fatal() {
        let err = Error::Database(rusqlite::Error::InvalidQuery);
        assert_eq!(err.exit_code(), 2);
        assert!(!err.error_code().is_retryable());
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let json = Error::NotInitialized.to_structured_json();
        assert_eq!(json["error"]["code"], "NOT_INITIALIZED");
        assert!(json["error"]["hint"].is_string());
    }

    #[test]
    fn test_cancelled_is_retryable() {
        assert!(Error::Cancelled.error_code().is_retryable());
        assert_eq!(Error::Cancelled.exit_code(), 6);
    }
}
