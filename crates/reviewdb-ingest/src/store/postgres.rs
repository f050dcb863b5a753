//! PostgreSQL relational store
//!
//! One transaction is opened when the store connects and every statement of
//! the run executes on it. Nothing is committed until [`RelationalStore::commit`].

use async_trait::async_trait;
use reviewdb_common::{EntityKind, PersonRow, ProductRow, ProductTypeRow, ReviewRow};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use super::{rows_per_statement, RelationalStore};
use crate::config::DatabaseConfig;
use crate::error::{map_write_error, IngestError, Result, StoreKind};

const DROP_TABLES: &str = "DROP TABLE IF EXISTS reviews, products, product_types, persons CASCADE";

const CREATE_TABLES: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS persons (
        id BIGINT PRIMARY KEY,
        natural_key TEXT NOT NULL UNIQUE,
        display_name TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS product_types (
        id BIGINT PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id BIGINT PRIMARY KEY,
        natural_key TEXT NOT NULL,
        product_type_id BIGINT NOT NULL REFERENCES product_types (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reviews (
        id BIGINT PRIMARY KEY,
        person_id BIGINT NOT NULL REFERENCES persons (id) ON DELETE CASCADE,
        product_id BIGINT NOT NULL REFERENCES products (id) ON DELETE CASCADE,
        rating DOUBLE PRECISION NOT NULL,
        unix_time BIGINT,
        review_date DATE
    )
    "#,
];

/// Open a pool with the configured limits, reporting failures as connection errors
pub(crate) async fn connect_pool(
    url: &str,
    config: &DatabaseConfig,
    store: StoreKind,
) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(url)
        .await
        .map_err(|e| IngestError::connection(store, e))?;

    info!(
        store = %store,
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub struct PgRelationalStore {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgRelationalStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = connect_pool(&config.url, config, StoreKind::Relational).await?;
        Self::from_pool(pool).await
    }

    /// Begin the run's transaction on an existing pool
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        let tx = pool
            .begin()
            .await
            .map_err(|e| IngestError::connection(StoreKind::Relational, e))?;
        Ok(Self { tx: Some(tx) })
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or(IngestError::TransactionClosed)
    }
}

#[async_trait]
impl RelationalStore for PgRelationalStore {
    async fn reset_schema(&mut self) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(DROP_TABLES).execute(&mut **tx).await?;
        for statement in CREATE_TABLES {
            sqlx::query(statement).execute(&mut **tx).await?;
        }
        info!("Relational schema recreated");
        Ok(())
    }

    async fn ensure_schema(&mut self) -> Result<()> {
        let tx = self.tx()?;
        for statement in CREATE_TABLES {
            sqlx::query(statement).execute(&mut **tx).await?;
        }
        Ok(())
    }

    async fn max_id(&mut self, kind: EntityKind) -> Result<Option<i64>> {
        let tx = self.tx()?;
        let sql = format!("SELECT MAX(id) FROM {}", kind.table_name());
        let max: Option<i64> = sqlx::query_scalar(&sql).fetch_one(&mut **tx).await?;
        Ok(max)
    }

    async fn load_persons(&mut self) -> Result<Vec<PersonRow>> {
        let tx = self.tx()?;
        let rows: Vec<(i64, String, Option<String>)> =
            sqlx::query_as("SELECT id, natural_key, display_name FROM persons")
                .fetch_all(&mut **tx)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, natural_key, display_name)| PersonRow {
                id,
                natural_key,
                display_name,
            })
            .collect())
    }

    async fn load_product_types(&mut self) -> Result<Vec<ProductTypeRow>> {
        let tx = self.tx()?;
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM product_types")
            .fetch_all(&mut **tx)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| ProductTypeRow { id, name })
            .collect())
    }

    async fn load_products(&mut self) -> Result<Vec<ProductRow>> {
        let tx = self.tx()?;
        let rows: Vec<(i64, String, i64)> =
            sqlx::query_as("SELECT id, natural_key, product_type_id FROM products")
                .fetch_all(&mut **tx)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, natural_key, product_type_id)| ProductRow {
                id,
                natural_key,
                product_type_id,
            })
            .collect())
    }

    async fn upsert_product_types(&mut self, rows: &[ProductTypeRow]) -> Result<u64> {
        let tx = self.tx()?;
        let mut affected = 0;

        for chunk in rows.chunks(rows_per_statement(2)) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO product_types (id, name) ");
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.id).push_bind(&row.name);
            });
            query_builder.push(
                r#"
                ON CONFLICT (id) DO UPDATE SET
                    name = COALESCE(EXCLUDED.name, product_types.name)
                "#,
            );

            affected += query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| map_write_error(e, "product_types"))?
                .rows_affected();
        }

        debug!(rows = rows.len(), "Upserted product types");
        Ok(affected)
    }

    async fn upsert_persons(&mut self, rows: &[PersonRow]) -> Result<u64> {
        let tx = self.tx()?;
        let mut affected = 0;

        for chunk in rows.chunks(rows_per_statement(3)) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO persons (id, natural_key, display_name) ");
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(&row.natural_key)
                    .push_bind(&row.display_name);
            });
            query_builder.push(
                r#"
                ON CONFLICT (id) DO UPDATE SET
                    natural_key = COALESCE(EXCLUDED.natural_key, persons.natural_key),
                    display_name = COALESCE(EXCLUDED.display_name, persons.display_name)
                "#,
            );

            affected += query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| map_write_error(e, "persons"))?
                .rows_affected();
        }

        debug!(rows = rows.len(), "Upserted persons");
        Ok(affected)
    }

    async fn upsert_products(&mut self, rows: &[ProductRow]) -> Result<u64> {
        let tx = self.tx()?;
        let mut affected = 0;

        for chunk in rows.chunks(rows_per_statement(3)) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO products (id, natural_key, product_type_id) ");
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(&row.natural_key)
                    .push_bind(row.product_type_id);
            });
            query_builder.push(
                r#"
                ON CONFLICT (id) DO UPDATE SET
                    natural_key = COALESCE(EXCLUDED.natural_key, products.natural_key),
                    product_type_id = COALESCE(EXCLUDED.product_type_id, products.product_type_id)
                "#,
            );

            affected += query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| map_write_error(e, "products"))?
                .rows_affected();
        }

        debug!(rows = rows.len(), "Upserted products");
        Ok(affected)
    }

    async fn insert_reviews(&mut self, rows: &[ReviewRow]) -> Result<u64> {
        let tx = self.tx()?;
        let mut affected = 0;

        for chunk in rows.chunks(rows_per_statement(6)) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO reviews (id, person_id, product_id, rating, unix_time, review_date) ",
            );
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(row.person_id)
                    .push_bind(row.product_id)
                    .push_bind(row.rating)
                    .push_bind(row.unix_time)
                    .push_bind(row.review_date);
            });

            affected += query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| map_write_error(e, "reviews"))?
                .rows_affected();
        }

        debug!(rows = rows.len(), "Inserted reviews");
        Ok(affected)
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(IngestError::TransactionClosed)?;
        tx.commit().await?;
        info!("Relational transaction committed");
        Ok(())
    }
}
