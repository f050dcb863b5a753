//! Error types shared by the reviewdb crates

use thiserror::Error;

/// Result type alias for reviewdb common operations
pub type Result<T> = std::result::Result<T, ReviewDbError>;

/// Main error type for the shared reviewdb helpers
#[derive(Error, Debug)]
pub enum ReviewDbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid source file '{path}': {reason}")]
    InvalidSource { path: String, reason: String },
}

impl ReviewDbError {
    /// Create an invalid source error with file context
    pub fn invalid_source(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
