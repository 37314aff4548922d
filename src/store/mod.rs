//! # Corpus Store Module
//!
//! ## Purpose
//! One uniform parameterized-query interface over two interchangeable
//! full-text backends: an embedded single-file index (SQLite + FTS5) and a
//! networked relational engine (Postgres + tsvector).
//!
//! ## Input/Output Specification
//! - **Input**: Query text with positional typed parameters
//! - **Output**: `RowSet` (rows plus row count), identical for both backends
//! - **Failures**: `Unavailable` (retryable) vs `QueryFault` (programming error)
//!
//! ## Key Features
//! - Positional typed binding only; values are never concatenated into query
//!   text, eliminating injection by construction
//! - `SqlDialect` absorbs every placeholder and full-text syntax difference;
//!   callers above this layer never branch on backend identity
//! - Transactional batch execution backing the atomic snapshot replace

pub mod postgres;
pub mod schema;
pub mod sqlite;

use crate::config::{StoreBackend, StoreConfig};
use crate::errors::{CorpusError, Result};
use crate::{Article, ControlMapping, Definition, Document, Recital, Reference};
use async_trait::async_trait;
use std::sync::Arc;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// A typed positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(text) => SqlValue::Text(text),
            None => SqlValue::Null,
        }
    }
}

/// One result row of backend-independent values.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub values: Vec<SqlValue>,
}

impl Row {
    pub fn text(&self, index: usize) -> Result<&str> {
        match self.values.get(index) {
            Some(SqlValue::Text(text)) => Ok(text),
            other => Err(CorpusError::QueryFault {
                details: format!("expected text at column {index}, got {other:?}"),
            }),
        }
    }

    pub fn opt_text(&self, index: usize) -> Result<Option<&str>> {
        match self.values.get(index) {
            Some(SqlValue::Text(text)) => Ok(Some(text)),
            Some(SqlValue::Null) => Ok(None),
            other => Err(CorpusError::QueryFault {
                details: format!("expected nullable text at column {index}, got {other:?}"),
            }),
        }
    }

    pub fn int(&self, index: usize) -> Result<i64> {
        match self.values.get(index) {
            Some(SqlValue::Int(value)) => Ok(*value),
            other => Err(CorpusError::QueryFault {
                details: format!("expected integer at column {index}, got {other:?}"),
            }),
        }
    }
}

/// Rows plus a row count, identical regardless of the active backend.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl RowSet {
    pub fn new(rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self { rows, row_count }
    }
}

/// Matching strategy for a full-text query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Every token must match, exact form
    Conjunctive,
    /// Any token may match, prefix form on every token
    DisjunctivePrefix,
}

/// The two searchable unit relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRelation {
    Articles,
    Recitals,
}

/// Backend syntax profile. Everything that differs between the two engines
/// lives behind this trait; code above the store layer composes SQL only
/// through it.
pub trait SqlDialect: Send + Sync {
    /// Positional placeholder for the 1-based parameter `ordinal`.
    fn placeholder(&self, ordinal: usize) -> String;

    /// Full-text match expression over sanitized tokens. Bound as a
    /// parameter value, never spliced into query text.
    fn match_expression(&self, tokens: &[String], mode: MatchMode) -> String;

    /// Ranked full-text search over one unit relation. Result columns:
    /// `(document_id, locator, title_or_null, snippet)`, best match first.
    /// Parameters: match expression, `doc_filter` document ids, then limit.
    fn unit_search_sql(&self, relation: UnitRelation, doc_filter: usize) -> String;

    /// Text pattern predicate for `column` against the parameter at
    /// `ordinal`. Case-sensitive on the embedded backend, case-insensitive
    /// on the networked one.
    fn pattern_predicate(&self, column: &str, ordinal: usize) -> String;

    /// Whether full-text indexes follow base-relation writes without
    /// explicit mirror statements (generated columns vs. FTS mirror tables).
    fn maintains_fts_inline(&self) -> bool;
}

/// The single operation every backend provides: execute a parameterized
/// query and return rows plus a row count. Parameter binding is always
/// positional and typed.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Execute one read query.
    async fn execute(&self, query: &str, params: &[SqlValue]) -> Result<RowSet>;

    /// Execute a batch of write statements inside a single transaction.
    /// Either every statement applies or none does.
    async fn execute_batch(&self, statements: &[(String, Vec<SqlValue>)]) -> Result<()>;

    /// Create relations and full-text indexes if absent.
    async fn init_schema(&self) -> Result<()>;

    /// Syntax profile of the active backend.
    fn dialect(&self) -> &dyn SqlDialect;

    /// Trivial roundtrip proving the store is reachable.
    async fn health_check(&self) -> Result<()> {
        self.execute("SELECT 1", &[]).await?;
        Ok(())
    }
}

/// Everything one ingestion run produces for a document. Applied atomically:
/// the snapshot replaces any prior state of the same document wholesale.
#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    pub document: Option<Document>,
    pub articles: Vec<Article>,
    pub recitals: Vec<Recital>,
    pub definitions: Vec<Definition>,
    pub references: Vec<Reference>,
    pub control_mappings: Vec<ControlMapping>,
}

/// Open the configured backend.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn CorpusStore>> {
    let store: Arc<dyn CorpusStore> = match &config.backend {
        StoreBackend::Sqlite {
            path,
            read_pool_size,
        } => Arc::new(SqliteStore::open(
            path,
            *read_pool_size,
            config.query_timeout_seconds,
        )?),
        StoreBackend::Postgres { url, pool_size } => Arc::new(PostgresStore::connect(
            url,
            *pool_size,
            config.query_timeout_seconds,
        )?),
    };
    store.init_schema().await?;
    Ok(store)
}
