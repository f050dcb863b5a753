//! Errors raised by the ingestion pipeline
//!
//! Only infrastructure failures are errors here. Problems with individual
//! input lines are [`crate::parser::RecordIssue`]s and never abort a run.

use reviewdb_common::ReviewDbError;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Which of the two stores a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Relational,
    Document,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Relational => write!(f, "relational store"),
            StoreKind::Document => write!(f, "document store"),
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    /// A store could not be reached when the run started
    #[error("Cannot connect to {store}: {source}")]
    Connection {
        store: StoreKind,
        #[source]
        source: sqlx::Error,
    },

    /// A row referenced a parent that was never written, or a key was reused
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}. Check DATABASE_URL and the REVIEWDB_* settings.")]
    Config(String),

    #[error(transparent)]
    Common(#[from] ReviewDbError),

    #[error("Relational transaction already committed")]
    TransactionClosed,
}

impl IngestError {
    pub fn connection(store: StoreKind, source: sqlx::Error) -> Self {
        Self::Connection { store, source }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Process exit status for a run that ended with this error
    pub fn exit_code(&self) -> u8 {
        match self {
            IngestError::Config(_) | IngestError::Common(ReviewDbError::Config(_)) => 2,
            IngestError::Connection { .. } => 3,
            IngestError::IntegrityViolation(_) => 4,
            _ => 1,
        }
    }
}

/// Map a failed write statement, surfacing constraint breaches as integrity violations
pub(crate) fn map_write_error(error: sqlx::Error, table: &str) -> IngestError {
    if let Some(db_err) = error.as_database_error() {
        if db_err.is_foreign_key_violation() || db_err.is_unique_violation() {
            return IngestError::IntegrityViolation(format!("{}: {}", table, db_err.message()));
        }
    }
    IngestError::Database(error)
}
