//! Storage backends
//!
//! The pipeline writes to two independent stores: a relational schema
//! (persons, product types, products, reviews) and a document collection
//! holding the free-text part of each review. They share no transaction.
//!
//! - [`postgres::PgRelationalStore`] / [`documents::PgDocumentStore`] back real runs.
//! - [`memory::MemoryDatabase`] / [`memory::MemoryDocumentStore`] back dry runs and tests.

use async_trait::async_trait;
use reviewdb_common::{EntityKind, PersonRow, ProductRow, ProductTypeRow, ReviewDocument, ReviewRow};

use crate::error::Result;

pub mod documents;
pub mod memory;
pub mod postgres;

pub use documents::PgDocumentStore;
pub use memory::{MemoryDatabase, MemoryDocumentStore, MemoryRelationalStore, Tables};
pub use postgres::PgRelationalStore;

/// Relational side of the pipeline.
///
/// Every call between construction and [`RelationalStore::commit`] belongs to
/// one unit of work. Nothing is visible to other readers before the commit,
/// and dropping the store without committing discards it.
#[async_trait]
pub trait RelationalStore: Send {
    /// Drop and recreate all tables
    async fn reset_schema(&mut self) -> Result<()>;

    /// Create missing tables, keep existing rows
    async fn ensure_schema(&mut self) -> Result<()>;

    /// Largest stored surrogate id of `kind`, `None` for an empty table
    async fn max_id(&mut self, kind: EntityKind) -> Result<Option<i64>>;

    async fn load_persons(&mut self) -> Result<Vec<PersonRow>>;

    async fn load_product_types(&mut self) -> Result<Vec<ProductTypeRow>>;

    async fn load_products(&mut self) -> Result<Vec<ProductRow>>;

    /// Merge-upsert keyed by id. Null incoming columns keep the stored value.
    async fn upsert_product_types(&mut self, rows: &[ProductTypeRow]) -> Result<u64>;

    /// Merge-upsert keyed by id. Null incoming columns keep the stored value.
    async fn upsert_persons(&mut self, rows: &[PersonRow]) -> Result<u64>;

    /// Merge-upsert keyed by id. Null incoming columns keep the stored value.
    async fn upsert_products(&mut self, rows: &[ProductRow]) -> Result<u64>;

    /// Plain insert. An existing id is an integrity violation.
    async fn insert_reviews(&mut self, rows: &[ReviewRow]) -> Result<u64>;

    /// Make all work since construction durable. Later calls fail with
    /// [`crate::IngestError::TransactionClosed`].
    async fn commit(&mut self) -> Result<()>;
}

/// Document side of the pipeline. Writes are durable once acknowledged.
#[async_trait]
pub trait DocumentStore: Send {
    /// Drop and recreate the collection
    async fn reset_collection(&mut self) -> Result<()>;

    /// Create the collection if missing
    async fn ensure_collection(&mut self) -> Result<()>;

    /// Largest stored document id, `None` for an empty collection
    async fn max_id(&mut self) -> Result<Option<i64>>;

    /// Insert documents. An existing id is an integrity violation.
    async fn insert_many(&mut self, documents: &[ReviewDocument]) -> Result<u64>;
}

/// Largest number of rows per statement that stays under the PostgreSQL
/// bind-parameter limit
pub(crate) const fn rows_per_statement(columns: usize) -> usize {
    const PG_BIND_LIMIT: usize = 65_535;
    PG_BIND_LIMIT / columns
}
