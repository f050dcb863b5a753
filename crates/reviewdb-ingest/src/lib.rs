//! reviewdb ingestion library
//!
//! Loads line-delimited review files into a relational schema (persons,
//! product types, products, reviews) and a document collection holding the
//! free-text part of each review.
//!
//! # Modes
//!
//! - **Bulk**: recreate both stores and allocate ids from 0.
//! - **Incremental**: append to what is stored, continuing after the stored
//!   ids and reusing known persons, product types and products.
//!
//! # Example
//!
//! ```no_run
//! use reviewdb_ingest::{run, IngestConfig, LoadMode, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let files = config.files_for(LoadMode::Bulk, &[]);
//!     let summary = run(&config, LoadMode::Bulk, &files, RunOptions::default()).await?;
//!     println!("{}", summary.summary());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod batch;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ids;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod summary;

pub use config::IngestConfig;
pub use error::{IngestError, Result, StoreKind};
pub use pipeline::{run, IngestionPipeline, LoadMode, RunOptions};
pub use summary::{FileStats, RunSummary};
