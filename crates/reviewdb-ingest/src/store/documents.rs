//! PostgreSQL-backed document collection
//!
//! The collection is a table of `(id BIGINT PRIMARY KEY, document JSONB)`
//! in its own database. Statements run on the pool in autocommit mode, so
//! an acknowledged insert stays even if the relational transaction rolls back.

use async_trait::async_trait;
use reviewdb_common::ReviewDocument;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};

use super::postgres::connect_pool;
use super::{rows_per_statement, DocumentStore};
use crate::config::{is_plain_identifier, DatabaseConfig, DocumentStoreConfig};
use crate::error::{map_write_error, IngestError, Result, StoreKind};

pub struct PgDocumentStore {
    pool: PgPool,
    collection: String,
}

impl PgDocumentStore {
    /// Connect using the relational pool limits for the document database
    pub async fn connect(config: &DocumentStoreConfig, pool: &DatabaseConfig) -> Result<Self> {
        let pool = connect_pool(&config.url, pool, StoreKind::Document).await?;
        Self::from_pool(pool, &config.collection)
    }

    pub fn from_pool(pool: PgPool, collection: &str) -> Result<Self> {
        if !is_plain_identifier(collection) {
            return Err(IngestError::config(format!(
                "invalid document collection name '{}'",
                collection
            )));
        }
        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (id BIGINT PRIMARY KEY, document JSONB NOT NULL)",
            self.collection
        )
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn reset_collection(&mut self) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.collection))
            .execute(&self.pool)
            .await?;
        sqlx::query(&self.create_sql()).execute(&self.pool).await?;
        info!(collection = %self.collection, "Document collection recreated");
        Ok(())
    }

    async fn ensure_collection(&mut self) -> Result<()> {
        sqlx::query(&self.create_sql()).execute(&self.pool).await?;
        Ok(())
    }

    async fn max_id(&mut self) -> Result<Option<i64>> {
        let sql = format!("SELECT MAX(id) FROM {}", self.collection);
        let max: Option<i64> = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(max)
    }

    async fn insert_many(&mut self, documents: &[ReviewDocument]) -> Result<u64> {
        let mut bodies = Vec::with_capacity(documents.len());
        for document in documents {
            bodies.push((document.id, document.to_value()?));
        }

        let mut affected = 0;
        for chunk in bodies.chunks(rows_per_statement(2)) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} (id, document) ", self.collection));
            query_builder.push_values(chunk, |mut b, (id, body)| {
                b.push_bind(*id).push_bind(body);
            });

            affected += query_builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| map_write_error(e, &self.collection))?
                .rows_affected();
        }

        debug!(collection = %self.collection, documents = documents.len(), "Inserted documents");
        Ok(affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_unsafe_collection_name() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/unused")
            .unwrap();

        assert!(matches!(
            PgDocumentStore::from_pool(pool.clone(), "reviews;--"),
            Err(IngestError::Config(_))
        ));
        assert!(PgDocumentStore::from_pool(pool, "reviews").is_ok());
    }
}
