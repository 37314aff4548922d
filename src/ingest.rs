//! # Ingestion Pipeline Module
//!
//! ## Purpose
//! Drives one document from raw source text to a committed corpus snapshot:
//! fetch, parse, extract citations, then atomically replace any prior state
//! of that document in the store.
//!
//! ## Input/Output Specification
//! - **Input**: A known-document descriptor and a source fetcher
//! - **Output**: `IngestReport` with per-kind counts and timing
//! - **Failure**: Any stage error leaves the prior snapshot untouched
//!
//! ## Key Features
//! - Wholesale snapshot replace inside one store transaction
//! - Fetching is a trait seam, so sources and tests plug in freely
//! - Batch runs skip past unreachable sources instead of aborting

use crate::citations::CitationExtractor;
use crate::config::{IngestionConfig, KnownDocument};
use crate::errors::{CorpusError, Result};
use crate::parser::DocumentParser;
use crate::store::schema::{delete_document_statements, insert_snapshot_statements};
use crate::store::{CorpusSnapshot, CorpusStore};
use crate::utils::Timer;
use crate::{ControlMapping, Document};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Raw source text plus the metadata only the source knows.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub body: String,
    /// Source-side version tag, stored verbatim on the document row
    pub version: String,
    pub effective_date: Option<NaiveDate>,
}

/// Where raw document text comes from. Implementations should return
/// `SourceUnavailable` for transient retrieval failures.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, document: &KnownDocument) -> Result<FetchedSource>;
}

/// Fetcher reading `<root>/<id>.txt`. The version tag is the file's
/// modification time, so an unchanged source re-ingests with the same tag.
pub struct FileSourceFetcher {
    root: std::path::PathBuf,
}

impl FileSourceFetcher {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceFetcher for FileSourceFetcher {
    async fn fetch(&self, document: &KnownDocument) -> Result<FetchedSource> {
        let path = self.root.join(format!("{}.txt", document.id));
        let unavailable = |details: String| CorpusError::SourceUnavailable {
            document: document.id.clone(),
            details,
        };
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;
        let modified = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;
        let version = DateTime::<Utc>::from(modified)
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        Ok(FetchedSource {
            body,
            version,
            effective_date: None,
        })
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub source_version: String,
    pub articles: usize,
    pub recitals: usize,
    pub definitions: usize,
    pub references: usize,
    /// Citation matches discarded because a locator number failed to parse
    pub dropped_citations: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Fetch → parse → extract → commit, one document at a time.
pub struct IngestionPipeline {
    parser: DocumentParser,
    extractor: CitationExtractor,
    fetcher: Arc<dyn SourceFetcher>,
    store: Arc<dyn CorpusStore>,
}

impl IngestionPipeline {
    pub fn new(
        config: &IngestionConfig,
        fetcher: Arc<dyn SourceFetcher>,
        store: Arc<dyn CorpusStore>,
    ) -> Self {
        Self {
            parser: DocumentParser::new(),
            extractor: CitationExtractor::new(&config.documents),
            fetcher,
            store,
        }
    }

    /// Ingest one document. On success the store holds exactly this run's
    /// snapshot for the document; on failure the prior snapshot survives.
    pub async fn ingest(&self, document: &KnownDocument) -> Result<IngestReport> {
        let timer = Timer::new("ingest");
        let started_at = Utc::now();

        let source = self.fetcher.fetch(document).await?;
        let parsed = self.parser.parse(&document.id, &source.body)?;
        let extraction = self.extractor.extract(&parsed.articles)?;

        let report = IngestReport {
            document_id: document.id.clone(),
            source_version: source.version.clone(),
            articles: parsed.articles.len(),
            recitals: parsed.recitals.len(),
            definitions: parsed.definitions.len(),
            references: extraction.references.len(),
            dropped_citations: extraction.dropped,
            started_at,
            finished_at: Utc::now(),
        };

        let snapshot = CorpusSnapshot {
            document: Some(Document {
                id: document.id.clone(),
                name: document.name.clone(),
                source_version: source.version,
                effective_date: source.effective_date,
            }),
            articles: parsed.articles,
            recitals: parsed.recitals,
            definitions: parsed.definitions,
            references: extraction.references,
            control_mappings: Vec::new(),
        };

        let dialect = self.store.dialect();
        let mut statements = delete_document_statements(dialect, &document.id);
        statements.extend(insert_snapshot_statements(dialect, &snapshot)?);
        self.store.execute_batch(&statements).await?;

        timer.stop();
        tracing::info!(
            document = %report.document_id,
            articles = report.articles,
            recitals = report.recitals,
            references = report.references,
            dropped = report.dropped_citations,
            "ingested document snapshot"
        );
        Ok(report)
    }

    /// Ingest every document in sequence. Recoverable failures (source down,
    /// store briefly unavailable) are logged and skipped so one dead source
    /// cannot sink a batch refresh; anything else aborts the run.
    pub async fn ingest_all(&self, documents: &[KnownDocument]) -> Result<Vec<IngestReport>> {
        let mut reports = Vec::with_capacity(documents.len());
        for document in documents {
            match self.ingest(document).await {
                Ok(report) => reports.push(report),
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(document = %document.id, error = %err, "skipping document");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(reports)
    }

    /// Replace every control mapping of one document in a single transaction.
    /// Mappings are curated by hand, not parsed, so they load separately from
    /// the document snapshot.
    pub async fn replace_control_mappings(
        &self,
        document_id: &str,
        mappings: &[ControlMapping],
    ) -> Result<()> {
        if let Some(stray) = mappings.iter().find(|m| m.document_id != document_id) {
            return Err(CorpusError::Config {
                message: format!(
                    "mapping {} targets document {}, expected {document_id}",
                    stray.control_id, stray.document_id
                ),
            });
        }

        let dialect = self.store.dialect();
        let mut statements = vec![(
            format!(
                "DELETE FROM control_mappings WHERE document_id = {}",
                dialect.placeholder(1)
            ),
            vec![document_id.into()],
        )];
        let snapshot = CorpusSnapshot {
            control_mappings: mappings.to_vec(),
            ..Default::default()
        };
        statements.extend(insert_snapshot_statements(dialect, &snapshot)?);
        self.store.execute_batch(&statements).await
    }
}
