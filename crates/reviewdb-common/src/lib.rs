//! reviewdb common library
//!
//! Shared types, normalization helpers and logging for the review dataset
//! loaders.
//!
//! # Overview
//!
//! - **Error Handling**: [`ReviewDbError`] and the [`Result`] alias
//! - **Types**: relational rows and the review document shape
//! - **Normalization**: review dates and product categories
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use reviewdb_common::normalize::{extract_product_type, format_review_date};
//!
//! fn describe(path: &str) -> reviewdb_common::Result<()> {
//!     let category = extract_product_type(path)?;
//!     let date = format_review_date(Some("07 9, 2012"))?;
//!     tracing::info!(%category, ?date, "normalized");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod normalize;
pub mod types;

// Re-export commonly used types
pub use error::{Result, ReviewDbError};
pub use types::{
    DocumentFields, EntityKind, PersonRow, ProductRow, ProductTypeRow, ReviewDocument, ReviewRow,
};
