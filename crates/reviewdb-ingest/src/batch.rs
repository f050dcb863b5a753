//! Staging buffers in front of the two stores
//!
//! Rows are buffered per target and written when any buffer reaches the
//! batch size, or unconditionally at end of file. A flush always drains
//! every buffer, parents before children, relational side before documents:
//!
//! product types -> persons -> products -> reviews -> documents
//!
//! A row staged twice under the same id before a flush is merged in the
//! buffer with the same null-coalescing rule the store applies, so one
//! statement never touches the same key twice.

use reviewdb_common::{PersonRow, ProductRow, ProductTypeRow, ReviewDocument, ReviewRow};
use std::collections::HashMap;
use tracing::debug;

use crate::error::Result;
use crate::store::{DocumentStore, RelationalStore};

/// Buffer a row is staged into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    ProductTypes,
    Persons,
    Products,
    Reviews,
    Documents,
}

impl Target {
    /// Flush order
    pub const ALL: [Target; 5] = [
        Target::ProductTypes,
        Target::Persons,
        Target::Products,
        Target::Reviews,
        Target::Documents,
    ];
}

/// A row waiting for the next flush
#[derive(Debug, Clone, PartialEq)]
pub enum StagedRow {
    ProductType(ProductTypeRow),
    Person(PersonRow),
    Product(ProductRow),
    Review(ReviewRow),
    Document(ReviewDocument),
}

/// Rows written by one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub product_types: usize,
    pub persons: usize,
    pub products: usize,
    pub reviews: usize,
    pub documents: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        *self == FlushReport::default()
    }
}

trait Mergeable {
    fn id(&self) -> i64;
    fn merge_from(&mut self, incoming: Self);
}

impl Mergeable for ProductTypeRow {
    fn id(&self) -> i64 {
        self.id
    }
    fn merge_from(&mut self, incoming: Self) {
        self.merge(incoming)
    }
}

impl Mergeable for PersonRow {
    fn id(&self) -> i64 {
        self.id
    }
    fn merge_from(&mut self, incoming: Self) {
        self.merge(incoming)
    }
}

impl Mergeable for ProductRow {
    fn id(&self) -> i64 {
        self.id
    }
    fn merge_from(&mut self, incoming: Self) {
        self.merge(incoming)
    }
}

/// Insertion-ordered buffer that merges rows sharing an id
#[derive(Debug)]
struct MergeBuffer<T> {
    rows: Vec<T>,
    positions: HashMap<i64, usize>,
}

impl<T> Default for MergeBuffer<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<T: Mergeable> MergeBuffer<T> {
    fn push(&mut self, row: T) {
        match self.positions.get(&row.id()) {
            Some(&index) => self.rows[index].merge_from(row),
            None => {
                self.positions.insert(row.id(), self.rows.len());
                self.rows.push(row);
            },
        }
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn take(&mut self) -> Vec<T> {
        self.positions.clear();
        std::mem::take(&mut self.rows)
    }
}

#[derive(Debug)]
pub struct BatchWriter {
    batch_size: usize,
    product_types: MergeBuffer<ProductTypeRow>,
    persons: MergeBuffer<PersonRow>,
    products: MergeBuffer<ProductRow>,
    reviews: Vec<ReviewRow>,
    documents: Vec<ReviewDocument>,
    flushes: usize,
}

impl BatchWriter {
    /// `batch_size` of 0 is treated as 1
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            product_types: MergeBuffer::default(),
            persons: MergeBuffer::default(),
            products: MergeBuffer::default(),
            reviews: Vec::new(),
            documents: Vec::new(),
            flushes: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of non-empty flushes so far
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn enqueue(&mut self, row: StagedRow) {
        match row {
            StagedRow::ProductType(row) => self.product_types.push(row),
            StagedRow::Person(row) => self.persons.push(row),
            StagedRow::Product(row) => self.products.push(row),
            StagedRow::Review(row) => self.reviews.push(row),
            StagedRow::Document(doc) => self.documents.push(doc),
        }
    }

    pub fn pending(&self, target: Target) -> usize {
        match target {
            Target::ProductTypes => self.product_types.len(),
            Target::Persons => self.persons.len(),
            Target::Products => self.products.len(),
            Target::Reviews => self.reviews.len(),
            Target::Documents => self.documents.len(),
        }
    }

    pub fn should_flush(&self) -> bool {
        Target::ALL
            .iter()
            .any(|target| self.pending(*target) >= self.batch_size)
    }

    /// Flush everything if any buffer is full
    pub async fn maybe_flush<R, D>(
        &mut self,
        relational: &mut R,
        documents: &mut D,
    ) -> Result<Option<FlushReport>>
    where
        R: RelationalStore + ?Sized,
        D: DocumentStore + ?Sized,
    {
        if !self.should_flush() {
            return Ok(None);
        }
        self.flush_all(relational, documents).await.map(Some)
    }

    /// Drain every buffer regardless of size
    pub async fn flush_all<R, D>(
        &mut self,
        relational: &mut R,
        documents: &mut D,
    ) -> Result<FlushReport>
    where
        R: RelationalStore + ?Sized,
        D: DocumentStore + ?Sized,
    {
        let mut report = FlushReport::default();

        let product_types = self.product_types.take();
        if !product_types.is_empty() {
            relational.upsert_product_types(&product_types).await?;
            report.product_types = product_types.len();
        }

        let persons = self.persons.take();
        if !persons.is_empty() {
            relational.upsert_persons(&persons).await?;
            report.persons = persons.len();
        }

        let products = self.products.take();
        if !products.is_empty() {
            relational.upsert_products(&products).await?;
            report.products = products.len();
        }

        let reviews = std::mem::take(&mut self.reviews);
        if !reviews.is_empty() {
            relational.insert_reviews(&reviews).await?;
            report.reviews = reviews.len();
        }

        let docs = std::mem::take(&mut self.documents);
        if !docs.is_empty() {
            documents.insert_many(&docs).await?;
            report.documents = docs.len();
        }

        if !report.is_empty() {
            self.flushes += 1;
            debug!(
                flush = self.flushes,
                product_types = report.product_types,
                persons = report.persons,
                products = report.products,
                reviews = report.reviews,
                documents = report.documents,
                "Flushed staged rows"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::{MemoryDatabase, MemoryDocumentStore};
    use reviewdb_common::DocumentFields;

    fn person(id: i64, name: Option<&str>) -> StagedRow {
        StagedRow::Person(PersonRow {
            id,
            natural_key: format!("A{}", id),
            display_name: name.map(str::to_string),
        })
    }

    #[test]
    fn test_same_id_is_merged_in_buffer() {
        let mut writer = BatchWriter::new(10);
        writer.enqueue(person(0, Some("Ana")));
        writer.enqueue(person(0, None));
        writer.enqueue(person(1, None));
        assert_eq!(writer.pending(Target::Persons), 2);
        assert_eq!(
            writer.persons.rows[0].display_name.as_deref(),
            Some("Ana")
        );
    }

    #[test]
    fn test_should_flush_at_threshold() {
        let mut writer = BatchWriter::new(2);
        writer.enqueue(person(0, None));
        assert!(!writer.should_flush());
        writer.enqueue(person(1, None));
        assert!(writer.should_flush());
        assert_eq!(BatchWriter::new(0).batch_size(), 1);
    }

    #[tokio::test]
    async fn test_flush_writes_parents_first() {
        let database = MemoryDatabase::new();
        let mut relational = database.connect();
        let mut documents = MemoryDocumentStore::new();
        let mut writer = BatchWriter::new(100);

        // Children staged before parents still land, since flush orders targets
        writer.enqueue(StagedRow::Document(ReviewDocument::new(0, DocumentFields::default())));
        writer.enqueue(StagedRow::Review(ReviewRow {
            id: 0,
            person_id: 0,
            product_id: 0,
            rating: 5.0,
            unix_time: Some(1),
            review_date: None,
        }));
        writer.enqueue(StagedRow::Product(ProductRow {
            id: 0,
            natural_key: "B1".to_string(),
            product_type_id: 0,
        }));
        writer.enqueue(person(0, None));
        writer.enqueue(StagedRow::ProductType(ProductTypeRow {
            id: 0,
            name: "Video_Games".to_string(),
        }));

        assert!(writer
            .maybe_flush(&mut relational, &mut documents)
            .await
            .unwrap()
            .is_none());

        let report = writer.flush_all(&mut relational, &mut documents).await.unwrap();
        assert_eq!(report.reviews, 1);
        assert_eq!(report.documents, 1);
        assert_eq!(writer.flushes(), 1);
        assert!(Target::ALL.iter().all(|t| writer.pending(*t) == 0));

        let empty = writer.flush_all(&mut relational, &mut documents).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(writer.flushes(), 1);

        relational.commit().await.unwrap();
        assert_eq!(database.snapshot().reviews.len(), 1);
    }
}
