//! Error types for archdoc.
//!
//! Library crates use [`ArchDocError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all archdoc operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchDocError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure talking to a collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// Text-generation service failure (API error or empty completion).
    #[error("generation error: {0}")]
    Generation(String),

    /// Embedding service failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Knowledge-retrieval infrastructure failure.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Malformed payload from a collaborator.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Input that cannot be coerced into the expected shape.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external call exceeded its per-call deadline.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArchDocError>;

impl ArchDocError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Generation(_)
                | Self::Embedding(_)
                | Self::Retrieval(_)
                | Self::Timeout { .. }
        )
    }
}
