//! Error types for DataBook.
//!
//! Library crates use [`DataBookError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all DataBook operations.
#[derive(Debug, thiserror::Error)]
pub enum DataBookError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A directory or file name does not follow the naming convention.
    #[error("naming error: {message}")]
    Naming { message: String },

    /// An external tool (renderer, attacher, ...) failed.
    #[error("command failed: {command}\n{diagnostic}")]
    Tool { command: String, diagnostic: String },

    /// A prepared document is older than the source it was produced from.
    #[error("{document:?} is older than its source {dependency:?}; re-export it")]
    Stale {
        document: PathBuf,
        dependency: PathBuf,
    },

    /// Reading, modifying, or writing PDF content failed.
    #[error("pdf error: {0}")]
    Pdf(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (manifest mismatch, unknown section, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DataBookError>;

impl DataBookError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a naming error from any displayable message.
    pub fn naming(msg: impl Into<String>) -> Self {
        Self::Naming {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Record a failed external command with its diagnostic output.
    pub fn tool(command: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::Tool {
            command: command.into(),
            diagnostic: diagnostic.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Naming problems are reported and skipped, never fatal.
    pub fn is_naming(&self) -> bool {
        matches!(self, Self::Naming { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DataBookError::config("missing title");
        assert_eq!(err.to_string(), "config error: missing title");

        let err = DataBookError::tool("pdftk a.pdf attach_files b.pdf output c.pdf", "boom");
        let text = err.to_string();
        assert!(text.contains("pdftk a.pdf"));
        assert!(text.ends_with("boom"));
    }

    #[test]
    fn naming_errors_are_flagged() {
        assert!(DataBookError::naming("bad").is_naming());
        assert!(!DataBookError::validation("bad").is_naming());
    }
}
