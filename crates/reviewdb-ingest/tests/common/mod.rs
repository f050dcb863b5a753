//! Shared fixtures for the ingestion integration tests
//!
//! - review file writers backed by `tempfile`
//! - a PostgreSQL container wrapper for the Docker-backed suite

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use anyhow::{Context, Result};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reviewdb_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Builder for one raw review line
#[derive(Debug, Clone)]
pub struct Line {
    value: Value,
}

impl Line {
    pub fn new(reviewer: &str, asin: &str) -> Self {
        Self {
            value: json!({
                "reviewerID": reviewer,
                "asin": asin,
                "overall": 4.0,
                "unixReviewTime": 1341792000,
                "reviewTime": "07 9, 2012",
            }),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.value["reviewerName"] = json!(name);
        self
    }

    pub fn text(mut self, body: &str, summary: &str) -> Self {
        self.value["reviewText"] = json!(body);
        self.value["summary"] = json!(summary);
        self
    }

    pub fn helpful(mut self, up: i64, total: i64) -> Self {
        self.value["helpful"] = json!([up, total]);
        self
    }

    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.value[key] = value;
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        if let Some(object) = self.value.as_object_mut() {
            object.remove(key);
        }
        self
    }

    pub fn render(&self) -> String {
        self.value.to_string()
    }
}

/// Directory of review files removed when dropped
pub struct Fixtures {
    dir: TempDir,
}

impl Fixtures {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn file(&self, name: &str, lines: &[Line]) -> PathBuf {
        let raw: Vec<String> = lines.iter().map(Line::render).collect();
        self.raw_file(name, &raw)
    }

    pub fn raw_file(&self, name: &str, lines: &[String]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("Failed to create fixture");
        for line in lines {
            writeln!(file, "{}", line).expect("Failed to write fixture");
        }
        path
    }
}

/// Deterministic file with `reviews` lines spread over `persons` reviewers and `products` products
pub fn synthetic_lines(reviews: usize, persons: usize, products: usize) -> Vec<Line> {
    (0..reviews)
        .map(|i| {
            let line = Line::new(&format!("R{:04}", i % persons), &format!("P{:04}", i % products));
            match i % 3 {
                0 => line.name(&format!("Reviewer {}", i % persons)).helpful(i as i64 % 5, 5),
                1 => line.text("Works as described", "Fine"),
                _ => line.without("reviewTime"),
            }
        })
        .collect()
}

/// PostgreSQL test container with one database per store
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    relational_url: String,
    documents_url: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let base = format!("postgresql://postgres:postgres@{}:{}", host, port);
        let admin = connect(&format!("{}/postgres", base)).await?;
        sqlx::query("CREATE DATABASE reviewdb_documents")
            .execute(&admin)
            .await
            .context("Failed to create document database")?;
        admin.close().await;

        Ok(Self {
            _container: container,
            relational_url: format!("{}/postgres", base),
            documents_url: format!("{}/reviewdb_documents", base),
        })
    }

    pub fn relational_url(&self) -> &str {
        &self.relational_url
    }

    pub fn documents_url(&self) -> &str {
        &self.documents_url
    }

    pub async fn relational_pool(&self) -> Result<PgPool> {
        connect(&self.relational_url).await
    }

    pub async fn documents_pool(&self) -> Result<PgPool> {
        connect(&self.documents_url).await
    }
}

async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))
}
