//! Domain rows shared by the loaders and the stores
//!
//! Every row carries its surrogate id. Natural keys are kept alongside for
//! lookups but are never used as storage keys.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Entity kinds that receive surrogate ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    ProductType,
    Product,
    Review,
}

impl EntityKind {
    /// All kinds, parents first
    pub const ALL: [EntityKind; 4] = [
        EntityKind::ProductType,
        EntityKind::Person,
        EntityKind::Product,
        EntityKind::Review,
    ];

    /// Relational table backing this kind
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Person => "persons",
            EntityKind::ProductType => "product_types",
            EntityKind::Product => "products",
            EntityKind::Review => "reviews",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Person => write!(f, "person"),
            EntityKind::ProductType => write!(f, "product_type"),
            EntityKind::Product => write!(f, "product"),
            EntityKind::Review => write!(f, "review"),
        }
    }
}

/// Reviewer row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRow {
    pub id: i64,
    pub natural_key: String,
    pub display_name: Option<String>,
}

impl PersonRow {
    /// Null-coalescing merge: incoming non-null values win, nulls keep what is stored
    pub fn merge(&mut self, incoming: PersonRow) {
        self.natural_key = incoming.natural_key;
        if incoming.display_name.is_some() {
            self.display_name = incoming.display_name;
        }
    }
}

/// Product category row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTypeRow {
    pub id: i64,
    pub name: String,
}

impl ProductTypeRow {
    pub fn merge(&mut self, incoming: ProductTypeRow) {
        self.name = incoming.name;
    }
}

/// Catalog product row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: i64,
    pub natural_key: String,
    pub product_type_id: i64,
}

impl ProductRow {
    pub fn merge(&mut self, incoming: ProductRow) {
        self.natural_key = incoming.natural_key;
        self.product_type_id = incoming.product_type_id;
    }
}

/// Review row. Reviews are always inserted, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRow {
    pub id: i64,
    pub person_id: i64,
    pub product_id: i64,
    pub rating: f64,
    pub unix_time: Option<i64>,
    pub review_date: Option<NaiveDate>,
}

/// Free-text part of a review, stored in the document collection.
///
/// Absent values are omitted from the serialized document, never written
/// as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFields {
    #[serde(rename = "helpful", skip_serializing_if = "Option::is_none", default)]
    pub helpfulness: Option<[i64; 2]>,

    #[serde(rename = "reviewText", skip_serializing_if = "Option::is_none", default)]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<String>,
}

impl DocumentFields {
    pub fn is_empty(&self) -> bool {
        self.helpfulness.is_none() && self.body.is_none() && self.summary.is_none()
    }
}

/// Document keyed by the review surrogate id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub id: i64,
    pub fields: DocumentFields,
}

impl ReviewDocument {
    pub fn new(id: i64, fields: DocumentFields) -> Self {
        Self { id, fields }
    }

    /// JSON body as persisted by the document store
    pub fn to_value(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.fields)?)
    }
}
