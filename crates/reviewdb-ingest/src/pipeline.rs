//! Ingestion pipeline
//!
//! Streams review files line by line into the relational and document
//! stores:
//!
//! 1. Prepare the stores. Bulk mode recreates them; incremental mode seeds
//!    the id counters from the stored maxima and loads the known persons,
//!    product types and products into memory.
//! 2. Per file: derive the category, then per line parse, resolve ids,
//!    stage rows and flush whenever a buffer is full. Residual rows are
//!    flushed at end of file.
//! 3. Commit the relational transaction.
//!
//! Document inserts are acknowledged per flush and are not rolled back if
//! the relational commit never happens.

use indicatif::ProgressBar;
use reviewdb_common::normalize::extract_product_type;
use reviewdb_common::{
    EntityKind, PersonRow, ProductRow, ProductTypeRow, ReviewDbError, ReviewDocument, ReviewRow,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::batch::{BatchWriter, StagedRow};
use crate::config::IngestConfig;
use crate::dedup::EntityDeduplicator;
use crate::error::{IngestError, Result};
use crate::ids::IdentifierAllocator;
use crate::parser::{ParseOutcome, ParsedReview, ReviewParser};
use crate::progress::{create_file_progress, format_bytes};
use crate::store::{
    DocumentStore, MemoryDatabase, MemoryDocumentStore, PgDocumentStore, PgRelationalStore,
    RelationalStore,
};
use crate::summary::{FileStats, RunSummary};

/// How a run treats what is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Recreate both stores and allocate ids from 0
    Bulk,
    /// Append to existing stores, continuing after the stored ids
    Incremental,
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadMode::Bulk => write!(f, "bulk"),
            LoadMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Natural key indexes for the run
#[derive(Debug, Default)]
struct EntityIndex {
    /// reviewer id -> (id, display name)
    persons: EntityDeduplicator<String, Option<String>>,
    /// category name -> id
    product_types: EntityDeduplicator<String>,
    /// (catalog id, product type id) -> id
    products: EntityDeduplicator<(String, i64)>,
}

impl EntityIndex {
    async fn load<R: RelationalStore + ?Sized>(relational: &mut R) -> Result<Self> {
        let persons = relational
            .load_persons()
            .await?
            .into_iter()
            .map(|p| (p.natural_key, p.id, p.display_name))
            .collect();
        let product_types = relational
            .load_product_types()
            .await?
            .into_iter()
            .map(|t| (t.name, t.id, ()))
            .collect();
        let products = relational
            .load_products()
            .await?
            .into_iter()
            .map(|p| ((p.natural_key, p.product_type_id), p.id, ()))
            .collect();

        Ok(Self {
            persons,
            product_types,
            products,
        })
    }
}

pub struct IngestionPipeline<R, D> {
    mode: LoadMode,
    relational: R,
    documents: D,
    writer: BatchWriter,
    ids: IdentifierAllocator,
    index: EntityIndex,
    parser: ReviewParser,
    cancel: CancellationToken,
    progress: Option<ProgressBar>,
    files: Vec<FileStats>,
    cancelled: bool,
}

impl<R: RelationalStore, D: DocumentStore> IngestionPipeline<R, D> {
    /// Prepare both stores for `mode` and build the id state of the run
    pub async fn open(
        mode: LoadMode,
        mut relational: R,
        mut documents: D,
        batch_size: usize,
    ) -> Result<Self> {
        info!(mode = %mode, batch_size, "Phase 1: Preparing stores");

        let (ids, index) = match mode {
            LoadMode::Bulk => {
                relational.reset_schema().await?;
                documents.reset_collection().await?;
                (IdentifierAllocator::bulk(), EntityIndex::default())
            },
            LoadMode::Incremental => {
                relational.ensure_schema().await?;
                documents.ensure_collection().await?;

                let mut maxima = Vec::with_capacity(EntityKind::ALL.len());
                for kind in EntityKind::ALL {
                    let mut max = relational.max_id(kind).await?;
                    if kind == EntityKind::Review {
                        // Documents outlive a rolled-back run
                        let documents_max = documents.max_id().await?;
                        if documents_max > max {
                            warn!(
                                relational = ?max,
                                documents = ?documents_max,
                                "Document collection is ahead of the review table"
                            );
                        }
                        max = max.max(documents_max);
                    }
                    debug!(kind = %kind, max = ?max, "Seeding identifier counter");
                    maxima.push((kind, max));
                }

                let index = EntityIndex::load(&mut relational).await?;
                info!(
                    persons = index.persons.len(),
                    product_types = index.product_types.len(),
                    products = index.products.len(),
                    "Loaded existing entities"
                );
                (IdentifierAllocator::seeded(maxima), index)
            },
        };

        Ok(Self {
            mode,
            relational,
            documents,
            writer: BatchWriter::new(batch_size),
            ids,
            index,
            parser: ReviewParser::new(),
            cancel: CancellationToken::new(),
            progress: None,
            files: Vec::new(),
            cancelled: false,
        })
    }

    /// Stop between records once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Id the next new entity of `kind` will get
    pub fn peek_id(&self, kind: EntityKind) -> i64 {
        self.ids.peek(kind)
    }

    /// Ingest `files` in order, stopping early on cancellation
    pub async fn ingest_files<P: AsRef<Path>>(&mut self, files: &[P]) -> Result<()> {
        info!(files = files.len(), "Phase 2: Ingesting files");
        for path in files {
            if self.cancel.is_cancelled() {
                self.cancelled = true;
                break;
            }
            self.ingest_file(path.as_ref()).await?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(file = %path.display()))]
    pub async fn ingest_file(&mut self, path: &Path) -> Result<FileStats> {
        let category = extract_product_type(path)?;
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        info!(category = %category, size = %format_bytes(size), "Starting file");

        let mut stats = FileStats::new(path, category.as_str());
        let type_id = self.resolve_product_type(&category, &mut stats);
        let flushes_before = self.writer.flushes();

        if let Some(pb) = &self.progress {
            pb.set_length(size);
            pb.set_position(0);
            pb.set_message(category.clone());
        }

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        loop {
            if self.cancel.is_cancelled() {
                stats.cancelled = true;
                self.cancelled = true;
                warn!(line = stats.lines_read, "Cancellation requested, stopping file");
                break;
            }

            line.clear();
            let read = reader.read_until(b'\n', &mut line).await?;
            if read == 0 {
                break;
            }
            stats.lines_read += 1;
            if let Some(pb) = &self.progress {
                pb.inc(read as u64);
            }

            self.stage_line(&line, type_id, &mut stats);
            self.writer
                .maybe_flush(&mut self.relational, &mut self.documents)
                .await?;
        }

        self.writer
            .flush_all(&mut self.relational, &mut self.documents)
            .await?;
        stats.flushes = self.writer.flushes() - flushes_before;

        info!(
            lines = stats.lines_read,
            reviews = stats.reviews,
            persons_created = stats.persons_created,
            products_created = stats.products_created,
            rejected = stats.rejected_lines,
            field_issues = stats.field_issues,
            flushes = stats.flushes,
            "Finished file"
        );

        self.files.push(stats.clone());
        Ok(stats)
    }

    /// Flush residual rows, commit the relational side and report
    pub async fn finish(mut self) -> Result<RunSummary> {
        self.writer
            .flush_all(&mut self.relational, &mut self.documents)
            .await?;

        info!("Phase 3: Committing relational transaction");
        self.relational.commit().await?;

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        let summary = RunSummary::new(self.mode, self.files, self.cancelled);
        info!(summary = %summary.summary(), "Ingestion complete");
        Ok(summary)
    }

    fn stage_line(&mut self, raw: &[u8], type_id: i64, stats: &mut FileStats) {
        let line = stats.lines_read;
        match self.parser.parse(raw) {
            ParseOutcome::Blank => {},
            ParseOutcome::Rejected(issue) => {
                stats.rejected_lines += 1;
                warn!(line, issue = %issue, "Rejected review line");
            },
            ParseOutcome::Parsed { review, issues } => {
                for issue in &issues {
                    warn!(line, issue = %issue, "Nulled malformed field");
                }
                stats.field_issues += issues.len();
                self.stage_review(review, type_id, stats);
            },
        }
    }

    fn stage_review(&mut self, review: ParsedReview, type_id: i64, stats: &mut FileStats) {
        let person_id = self.resolve_person(review.reviewer_id, review.reviewer_name, stats);
        let product_id = self.resolve_product(review.asin, type_id, stats);
        let id = self.ids.next_id(EntityKind::Review);

        self.writer.enqueue(StagedRow::Review(ReviewRow {
            id,
            person_id,
            product_id,
            rating: review.rating,
            unix_time: review.unix_time,
            review_date: review.review_date,
        }));
        self.writer
            .enqueue(StagedRow::Document(ReviewDocument::new(id, review.document)));
        stats.reviews += 1;
    }

    fn resolve_product_type(&mut self, name: &str, stats: &mut FileStats) -> i64 {
        let key = name.to_string();
        if let Some(id) = self.index.product_types.resolve(&key) {
            debug!(category = name, id, "Reusing product type");
            return id;
        }

        let id = self.ids.next_id(EntityKind::ProductType);
        self.writer.enqueue(StagedRow::ProductType(ProductTypeRow {
            id,
            name: key.clone(),
        }));
        self.index.product_types.record(key, id, ());
        stats.product_types_created += 1;
        id
    }

    fn resolve_person(&mut self, key: String, name: Option<String>, stats: &mut FileStats) -> i64 {
        if let Some(id) = self.index.persons.resolve(&key) {
            let changed = match (&name, self.index.persons.attributes(&key)) {
                (None, _) => false,
                (Some(incoming), Some(Some(cached))) => incoming != cached,
                (Some(_), _) => true,
            };
            if changed {
                self.index.persons.update_attributes(&key, name.clone());
                self.writer.enqueue(StagedRow::Person(PersonRow {
                    id,
                    natural_key: key,
                    display_name: name,
                }));
                stats.persons_merged += 1;
            }
            return id;
        }

        let id = self.ids.next_id(EntityKind::Person);
        self.writer.enqueue(StagedRow::Person(PersonRow {
            id,
            natural_key: key.clone(),
            display_name: name.clone(),
        }));
        self.index.persons.record(key, id, name);
        stats.persons_created += 1;
        id
    }

    fn resolve_product(&mut self, catalog_id: String, type_id: i64, stats: &mut FileStats) -> i64 {
        let key = (catalog_id, type_id);
        if let Some(id) = self.index.products.resolve(&key) {
            return id;
        }

        let id = self.ids.next_id(EntityKind::Product);
        self.writer.enqueue(StagedRow::Product(ProductRow {
            id,
            natural_key: key.0.clone(),
            product_type_id: type_id,
        }));
        self.index.products.record(key, id, ());
        stats.products_created += 1;
        id
    }
}

/// Options for [`run`] that do not come from [`IngestConfig`]
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Write to in-memory stores instead of PostgreSQL
    pub dry_run: bool,
    pub show_progress: bool,
    pub cancel: CancellationToken,
}

/// Ingest `files` with the stores described by `config`
pub async fn run(
    config: &IngestConfig,
    mode: LoadMode,
    files: &[PathBuf],
    options: RunOptions,
) -> Result<RunSummary> {
    config.validate()?;

    if files.is_empty() {
        return Err(IngestError::config("No input files to ingest"));
    }
    // Refuse before touching either store
    for path in files {
        if !path.is_file() {
            return Err(
                ReviewDbError::invalid_source(path.display().to_string(), "file not found").into(),
            );
        }
    }

    if options.dry_run {
        info!(mode = %mode, "Dry run, writing to in-memory stores");
        let database = MemoryDatabase::new();
        return drive(mode, database.connect(), MemoryDocumentStore::new(), config, files, options)
            .await;
    }

    let relational = PgRelationalStore::connect(&config.database).await?;
    let documents = PgDocumentStore::connect(&config.documents, &config.database).await?;
    drive(mode, relational, documents, config, files, options).await
}

async fn drive<R: RelationalStore, D: DocumentStore>(
    mode: LoadMode,
    relational: R,
    documents: D,
    config: &IngestConfig,
    files: &[PathBuf],
    options: RunOptions,
) -> Result<RunSummary> {
    let mut pipeline = IngestionPipeline::open(mode, relational, documents, config.batch_size)
        .await?
        .with_cancellation(options.cancel);
    if options.show_progress {
        pipeline = pipeline.with_progress(create_file_progress());
    }

    pipeline.ingest_files(files).await?;
    pipeline.finish().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn review_line(reviewer: &str, asin: &str, name: Option<&str>) -> String {
        let mut value = serde_json::json!({
            "reviewerID": reviewer,
            "asin": asin,
            "overall": 4.0,
            "reviewTime": "07 9, 2012",
        });
        if let Some(name) = name {
            value["reviewerName"] = serde_json::json!(name);
        }
        value.to_string()
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, lines: &[String]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_load_mode_display() {
        assert_eq!(LoadMode::Bulk.to_string(), "bulk");
        assert_eq!(LoadMode::Incremental.to_string(), "incremental");
    }

    #[tokio::test]
    async fn test_bulk_file_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "Video_Games_5.json",
            &[
                review_line("A1", "B1", Some("Ana")),
                String::new(),
                "not json".to_string(),
                review_line("A1", "B2", None),
                review_line("A2", "B1", Some("Bo")),
            ],
        );

        let database = MemoryDatabase::new();
        let documents = MemoryDocumentStore::new();
        let mut pipeline =
            IngestionPipeline::open(LoadMode::Bulk, database.connect(), documents.clone(), 2)
                .await
                .unwrap();

        let stats = pipeline.ingest_file(&path).await.unwrap();
        assert_eq!(stats.category, "Video_Games");
        assert_eq!(stats.lines_read, 5);
        assert_eq!(stats.reviews, 3);
        assert_eq!(stats.rejected_lines, 1);
        assert_eq!(stats.persons_created, 2);
        assert_eq!(stats.products_created, 2);
        assert_eq!(stats.product_types_created, 1);
        assert!(stats.flushes >= 1);

        // Relational rows stay invisible until the commit, documents do not
        assert!(database.snapshot().reviews.is_empty());
        assert_eq!(documents.len(), 3);

        let summary = pipeline.finish().await.unwrap();
        assert_eq!(summary.reviews(), 3);
        assert_eq!(database.snapshot().reviews.len(), 3);
    }

    #[tokio::test]
    async fn test_person_restaged_only_on_new_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "Digital_Music_5.json",
            &[
                review_line("A1", "B1", Some("Ana")),
                review_line("A1", "B2", Some("Ana")),
                review_line("A1", "B3", None),
                review_line("A1", "B4", Some("Ana B.")),
            ],
        );

        let database = MemoryDatabase::new();
        let mut pipeline = IngestionPipeline::open(
            LoadMode::Bulk,
            database.connect(),
            MemoryDocumentStore::new(),
            100,
        )
        .await
        .unwrap();

        let stats = pipeline.ingest_file(&path).await.unwrap();
        assert_eq!(stats.persons_created, 1);
        assert_eq!(stats.persons_merged, 1);
        pipeline.finish().await.unwrap();

        let tables = database.snapshot();
        assert_eq!(tables.persons[&0].display_name.as_deref(), Some("Ana B."));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "Office_Products_5.json", &[review_line("A1", "B1", None)]);

        let token = CancellationToken::new();
        let database = MemoryDatabase::new();
        let mut pipeline = IngestionPipeline::open(
            LoadMode::Incremental,
            database.connect(),
            MemoryDocumentStore::new(),
            10,
        )
        .await
        .unwrap()
        .with_cancellation(token.clone());

        token.cancel();
        pipeline.ingest_files(&[path]).await.unwrap();
        let summary = pipeline.finish().await.unwrap();

        assert!(summary.cancelled);
        assert!(summary.files.is_empty());
        assert!(database.snapshot().reviews.is_empty());
    }

    #[tokio::test]
    async fn test_run_rejects_missing_file_before_connecting() {
        let config = IngestConfig::default();
        let err = run(
            &config,
            LoadMode::Bulk,
            &[PathBuf::from("/nonexistent/Video_Games_5.json")],
            RunOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Common(ReviewDbError::InvalidSource { .. })));
    }

    #[tokio::test]
    async fn test_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "Toys_and_Games_5.json", &[review_line("A1", "B1", None)]);

        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        let summary = run(&IngestConfig::default(), LoadMode::Bulk, &[path], options)
            .await
            .unwrap();
        assert_eq!(summary.reviews(), 1);
        assert_eq!(summary.mode, LoadMode::Bulk);
    }
}
