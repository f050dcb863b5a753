//! Configuration management
//!
//! [`IngestConfig`] is handed to the pipeline by the caller. Nothing in the
//! library reads the environment except [`IngestConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};
use crate::pipeline::LoadMode;

// ============================================================================
// Defaults
// ============================================================================

/// Default relational database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/reviewdb";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default document database URL.
pub const DEFAULT_DOCUMENT_DATABASE_URL: &str = "postgresql://localhost/reviewdb_documents";

/// Default document collection name.
pub const DEFAULT_DOCUMENT_COLLECTION: &str = "reviews";

/// Default number of staged rows per table before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Default directory holding the review files.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Files loaded by `load` when none are given.
pub const DEFAULT_BULK_FILES: &[&str] = &[
    "Digital_Music_5.json",
    "Musical_Instruments_5.json",
    "Toys_and_Games_5.json",
    "Video_Games_5.json",
];

/// Files appended by `append` when none are given.
pub const DEFAULT_INCREMENTAL_FILES: &[&str] = &[
    "Amazon_Instant_Video_5.json",
    "Cell_Phones_and_Accessories_5.json",
    "Clothing_Shoes_and_Jewelry_5.json",
    "Grocery_and_Gourmet_Food_5.json",
    "Office_Products_5.json",
    "Pet_Supplies_5.json",
    "Sports_and_Outdoors_5.json",
];

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub documents: DocumentStoreConfig,
    pub batch_size: usize,
    pub data_dir: PathBuf,
    pub bulk_files: Vec<String>,
    pub incremental_files: Vec<String>,
}

/// Relational database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    pub url: String,
    pub collection: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            documents: DocumentStoreConfig {
                url: DEFAULT_DOCUMENT_DATABASE_URL.to_string(),
                collection: DEFAULT_DOCUMENT_COLLECTION.to_string(),
            },
            batch_size: DEFAULT_BATCH_SIZE,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bulk_files: to_owned_list(DEFAULT_BULK_FILES),
            incremental_files: to_owned_list(DEFAULT_INCREMENTAL_FILES),
        }
    }
}

impl IngestConfig {
    /// Load `.env`, read the environment and validate the result
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from environment variables, falling back to defaults.
    ///
    /// Unparseable numeric values fall back to the default as well;
    /// [`IngestConfig::validate`] catches the values that are parseable but wrong.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            documents: DocumentStoreConfig {
                url: std::env::var("DOCUMENT_DATABASE_URL").unwrap_or(defaults.documents.url),
                collection: std::env::var("REVIEWDB_DOCUMENT_COLLECTION")
                    .unwrap_or(defaults.documents.collection),
            },
            batch_size: std::env::var("REVIEWDB_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            data_dir: std::env::var("REVIEWDB_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            bulk_files: std::env::var("REVIEWDB_BULK_FILES")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.bulk_files),
            incremental_files: std::env::var("REVIEWDB_INCREMENTAL_FILES")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.incremental_files),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(IngestError::config("Database URL cannot be empty"));
        }

        if self.documents.url.trim().is_empty() {
            return Err(IngestError::config("Document database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::config(
                "Database max_connections must be greater than 0",
            ));
        }

        if self.batch_size == 0 {
            return Err(IngestError::config("Batch size must be greater than 0"));
        }

        if !is_plain_identifier(&self.documents.collection) {
            return Err(IngestError::config(format!(
                "Document collection '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                self.documents.collection
            )));
        }

        Ok(())
    }

    /// Files to ingest for `mode`: the explicit list if one was given,
    /// otherwise the configured defaults resolved under `data_dir`.
    pub fn files_for(&self, mode: LoadMode, explicit: &[PathBuf]) -> Vec<PathBuf> {
        if !explicit.is_empty() {
            return explicit.to_vec();
        }

        let names = match mode {
            LoadMode::Bulk => &self.bulk_files,
            LoadMode::Incremental => &self.incremental_files,
        };
        names.iter().map(|name| resolve(&self.data_dir, name)).collect()
    }
}

fn resolve(dir: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
