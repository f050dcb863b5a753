//! In-process stores
//!
//! Same merge, key and foreign-key rules as the PostgreSQL stores. Used for
//! `--dry-run` and by the tests.

use async_trait::async_trait;
use reviewdb_common::{
    EntityKind, PersonRow, ProductRow, ProductTypeRow, ReviewDocument, ReviewRow,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use super::{DocumentStore, RelationalStore};
use crate::error::{IngestError, Result};

/// Contents of the relational schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub persons: BTreeMap<i64, PersonRow>,
    pub product_types: BTreeMap<i64, ProductTypeRow>,
    pub products: BTreeMap<i64, ProductRow>,
    pub reviews: BTreeMap<i64, ReviewRow>,
}

impl Tables {
    fn max_id(&self, kind: EntityKind) -> Option<i64> {
        match kind {
            EntityKind::Person => self.persons.keys().next_back().copied(),
            EntityKind::ProductType => self.product_types.keys().next_back().copied(),
            EntityKind::Product => self.products.keys().next_back().copied(),
            EntityKind::Review => self.reviews.keys().next_back().copied(),
        }
    }
}

/// Committed state shared by every store opened on it
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    committed: Arc<Mutex<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a unit of work on a private copy of the committed tables
    pub fn connect(&self) -> MemoryRelationalStore {
        let working = self.snapshot();
        let person_keys = working
            .persons
            .values()
            .map(|p| (p.natural_key.clone(), p.id))
            .collect();
        MemoryRelationalStore {
            database: self.clone(),
            working: Some(working),
            person_keys,
        }
    }

    /// Committed tables
    pub fn snapshot(&self) -> Tables {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct MemoryRelationalStore {
    database: MemoryDatabase,
    working: Option<Tables>,
    person_keys: HashMap<String, i64>,
}

impl MemoryRelationalStore {
    fn tables(&mut self) -> Result<&mut Tables> {
        self.working.as_mut().ok_or(IngestError::TransactionClosed)
    }
}

fn violation(table: &str, message: String) -> IngestError {
    IngestError::IntegrityViolation(format!("{}: {}", table, message))
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    async fn reset_schema(&mut self) -> Result<()> {
        *self.tables()? = Tables::default();
        self.person_keys.clear();
        Ok(())
    }

    async fn ensure_schema(&mut self) -> Result<()> {
        self.tables().map(|_| ())
    }

    async fn max_id(&mut self, kind: EntityKind) -> Result<Option<i64>> {
        Ok(self.tables()?.max_id(kind))
    }

    async fn load_persons(&mut self) -> Result<Vec<PersonRow>> {
        Ok(self.tables()?.persons.values().cloned().collect())
    }

    async fn load_product_types(&mut self) -> Result<Vec<ProductTypeRow>> {
        Ok(self.tables()?.product_types.values().cloned().collect())
    }

    async fn load_products(&mut self) -> Result<Vec<ProductRow>> {
        Ok(self.tables()?.products.values().cloned().collect())
    }

    async fn upsert_product_types(&mut self, rows: &[ProductTypeRow]) -> Result<u64> {
        let tables = self.tables()?;
        for row in rows {
            match tables.product_types.get_mut(&row.id) {
                Some(stored) => stored.merge(row.clone()),
                None => {
                    tables.product_types.insert(row.id, row.clone());
                },
            }
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_persons(&mut self, rows: &[PersonRow]) -> Result<u64> {
        let tables = self.working.as_mut().ok_or(IngestError::TransactionClosed)?;
        for row in rows {
            if let Some(owner) = self.person_keys.get(&row.natural_key) {
                if *owner != row.id {
                    return Err(violation(
                        "persons",
                        format!("natural key '{}' already belongs to id {}", row.natural_key, owner),
                    ));
                }
            }
            match tables.persons.get_mut(&row.id) {
                Some(stored) => {
                    self.person_keys.remove(&stored.natural_key);
                    stored.merge(row.clone());
                },
                None => {
                    tables.persons.insert(row.id, row.clone());
                },
            }
            self.person_keys.insert(row.natural_key.clone(), row.id);
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_products(&mut self, rows: &[ProductRow]) -> Result<u64> {
        let tables = self.tables()?;
        for row in rows {
            if !tables.product_types.contains_key(&row.product_type_id) {
                return Err(violation(
                    "products",
                    format!("product type {} does not exist", row.product_type_id),
                ));
            }
            match tables.products.get_mut(&row.id) {
                Some(stored) => stored.merge(row.clone()),
                None => {
                    tables.products.insert(row.id, row.clone());
                },
            }
        }
        Ok(rows.len() as u64)
    }

    async fn insert_reviews(&mut self, rows: &[ReviewRow]) -> Result<u64> {
        let tables = self.tables()?;
        for row in rows {
            if tables.reviews.contains_key(&row.id) {
                return Err(violation("reviews", format!("id {} already exists", row.id)));
            }
            if !tables.persons.contains_key(&row.person_id) {
                return Err(violation(
                    "reviews",
                    format!("person {} does not exist", row.person_id),
                ));
            }
            if !tables.products.contains_key(&row.product_id) {
                return Err(violation(
                    "reviews",
                    format!("product {} does not exist", row.product_id),
                ));
            }
            tables.reviews.insert(row.id, row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        let working = self.working.take().ok_or(IngestError::TransactionClosed)?;
        *self
            .database
            .committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = working;
        Ok(())
    }
}

/// Document collection kept in memory. Cloned handles share the collection.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<Mutex<BTreeMap<i64, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> BTreeMap<i64, Value> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn reset_collection(&mut self) -> Result<()> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn ensure_collection(&mut self) -> Result<()> {
        Ok(())
    }

    async fn max_id(&mut self) -> Result<Option<i64>> {
        Ok(self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_key_value()
            .map(|(id, _)| *id))
    }

    async fn insert_many(&mut self, documents: &[ReviewDocument]) -> Result<u64> {
        let mut bodies = Vec::with_capacity(documents.len());
        for document in documents {
            bodies.push((document.id, document.to_value()?));
        }

        let mut collection = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        // All or nothing, like a single INSERT statement
        if let Some((id, _)) = bodies.iter().find(|(id, _)| collection.contains_key(id)) {
            return Err(violation("documents", format!("id {} already exists", id)));
        }
        collection.extend(bodies);
        Ok(documents.len() as u64)
    }
}
