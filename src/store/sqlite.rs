//! # Embedded Store Backend
//!
//! ## Purpose
//! SQLite + FTS5 implementation of the corpus store: a single-file index
//! with one write connection and a pool of read-only connections for
//! unbounded concurrent readers.
//!
//! ## Key Features
//! - WAL mode so readers are never blocked by the writer
//! - Read connections opened `SQLITE_OPEN_READ_ONLY`, handed out round-robin
//! - `?N` positional placeholders, FTS5 `MATCH`, case-sensitive `LIKE`
//! - Blocking driver calls isolated on the blocking thread pool with a
//!   per-query timeout surfacing as `Unavailable`

use super::schema::SQLITE_SCHEMA;
use super::{CorpusStore, MatchMode, Row, RowSet, SqlDialect, SqlValue, UnitRelation};
use crate::errors::{CorpusError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on read connections.
const MAX_READ_POOL_SIZE: usize = 8;

/// Syntax profile of the embedded backend.
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn placeholder(&self, ordinal: usize) -> String {
        format!("?{ordinal}")
    }

    fn match_expression(&self, tokens: &[String], mode: MatchMode) -> String {
        // Tokens are quoted so none is mistaken for an FTS5 operator.
        match mode {
            MatchMode::Conjunctive => tokens
                .iter()
                .map(|t| format!("\"{t}\""))
                .collect::<Vec<_>>()
                .join(" AND "),
            MatchMode::DisjunctivePrefix => tokens
                .iter()
                .map(|t| format!("\"{t}\" *"))
                .collect::<Vec<_>>()
                .join(" OR "),
        }
    }

    fn unit_search_sql(&self, relation: UnitRelation, doc_filter: usize) -> String {
        let filter = in_clause(self, doc_filter);
        let limit = self.placeholder(doc_filter + 2);
        match relation {
            UnitRelation::Articles => format!(
                "SELECT document_id, number, title, \
                 snippet(articles_fts, 1, '[', ']', '…', 16) \
                 FROM articles_fts WHERE articles_fts MATCH ?1{filter} \
                 ORDER BY rank LIMIT {limit}"
            ),
            UnitRelation::Recitals => format!(
                "SELECT document_id, CAST(ordinal AS TEXT), NULL, \
                 snippet(recitals_fts, 0, '[', ']', '…', 16) \
                 FROM recitals_fts WHERE recitals_fts MATCH ?1{filter} \
                 ORDER BY rank LIMIT {limit}"
            ),
        }
    }

    fn pattern_predicate(&self, column: &str, ordinal: usize) -> String {
        // SQLite has no default LIKE escape character; backslash must be
        // declared so callers can match literal wildcards.
        format!("{column} LIKE {} ESCAPE '\\'", self.placeholder(ordinal))
    }

    fn maintains_fts_inline(&self) -> bool {
        false
    }
}

fn in_clause(dialect: &dyn SqlDialect, doc_filter: usize) -> String {
    if doc_filter == 0 {
        return String::new();
    }
    let slots: Vec<String> = (0..doc_filter).map(|i| dialect.placeholder(i + 2)).collect();
    format!(" AND document_id IN ({})", slots.join(", "))
}

/// Round-robin pool of read-only connections.
struct ReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl ReadPool {
    fn open(path: &Path, pool_size: usize) -> Result<Self> {
        let size = pool_size.clamp(1, MAX_READ_POOL_SIZE);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            apply_session_pragmas(&conn)?;
            connections.push(Mutex::new(conn));
        }
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let guard = self.connections[idx].lock();
        f(&guard)
    }
}

/// Session pragmas shared by the writer and every reader.
fn apply_session_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        PRAGMA case_sensitive_like = ON;
        ",
    )?;
    Ok(())
}

/// Embedded single-file corpus store.
pub struct SqliteStore {
    readers: Arc<ReadPool>,
    writer: Arc<Mutex<Connection>>,
    timeout: Duration,
    dialect: SqliteDialect,
}

impl SqliteStore {
    /// Open (creating if needed) the database file, the single writer, and
    /// the read-only pool.
    pub fn open(path: &Path, read_pool_size: usize, timeout_seconds: u64) -> Result<Self> {
        let writer = Connection::open(path)?;
        writer.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        apply_session_pragmas(&writer)?;
        let readers = ReadPool::open(path, read_pool_size)?;

        tracing::info!(path = %path.display(), readers = readers.connections.len(), "opened embedded corpus store");

        Ok(Self {
            readers: Arc::new(readers),
            writer: Arc::new(Mutex::new(writer)),
            timeout: Duration::from_secs(timeout_seconds),
            dialect: SqliteDialect,
        })
    }

    async fn run_with_timeout<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(task);
        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => Err(CorpusError::Unavailable {
                details: format!("query exceeded {}s timeout", self.timeout.as_secs()),
            }),
            Ok(Err(join)) => Err(CorpusError::Internal {
                message: format!("store task panicked: {join}"),
            }),
            Ok(Ok(result)) => result,
        }
    }
}

fn bind_params(params: &[SqlValue]) -> Vec<rusqlite::types::Value> {
    params
        .iter()
        .map(|p| match p {
            SqlValue::Null => rusqlite::types::Value::Null,
            SqlValue::Int(v) => rusqlite::types::Value::Integer(*v),
            SqlValue::Float(v) => rusqlite::types::Value::Real(*v),
            SqlValue::Text(v) => rusqlite::types::Value::Text(v.clone()),
        })
        .collect()
}

fn run_query(conn: &Connection, query: &str, params: &[SqlValue]) -> Result<RowSet> {
    let mut stmt = conn.prepare(query)?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query(rusqlite::params_from_iter(bind_params(params)))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let value = match row.get_ref(index)? {
                ValueRef::Null => SqlValue::Null,
                ValueRef::Integer(v) => SqlValue::Int(v),
                ValueRef::Real(v) => SqlValue::Float(v),
                ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
                ValueRef::Blob(_) => {
                    return Err(CorpusError::QueryFault {
                        details: format!("unexpected blob column at index {index}"),
                    })
                }
            };
            values.push(value);
        }
        out.push(Row { values });
    }
    Ok(RowSet::new(out))
}

#[async_trait]
impl CorpusStore for SqliteStore {
    async fn execute(&self, query: &str, params: &[SqlValue]) -> Result<RowSet> {
        let readers = self.readers.clone();
        let query = query.to_string();
        let params = params.to_vec();
        self.run_with_timeout(move || readers.with_conn(|conn| run_query(conn, &query, &params)))
            .await
    }

    async fn execute_batch(&self, statements: &[(String, Vec<SqlValue>)]) -> Result<()> {
        let writer = self.writer.clone();
        let statements = statements.to_vec();
        self.run_with_timeout(move || {
            let mut conn = writer.lock();
            let tx = conn.transaction()?;
            for (sql, params) in &statements {
                tx.execute(sql, rusqlite::params_from_iter(bind_params(params)))?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn init_schema(&self) -> Result<()> {
        let writer = self.writer.clone();
        self.run_with_timeout(move || {
            let conn = writer.lock();
            for ddl in SQLITE_SCHEMA {
                conn.execute_batch(ddl)?;
            }
            Ok(())
        })
        .await
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::{delete_document_statements, insert_snapshot_statements};
    use crate::store::CorpusSnapshot;
    use crate::{Article, Document, Recital};

    async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
        let store = SqliteStore::open(&dir.path().join("corpus.db"), 2, 5).unwrap();
        store.init_schema().await.unwrap();
        store
    }

    fn sample_snapshot() -> CorpusSnapshot {
        CorpusSnapshot {
            document: Some(Document {
                id: "gdpr".to_string(),
                name: "General Data Protection Regulation".to_string(),
                source_version: "2016-05-04".to_string(),
                effective_date: None,
            }),
            articles: vec![Article {
                document_id: "gdpr".to_string(),
                number: "33".to_string(),
                title: "Notification of a personal data breach".to_string(),
                body: "The controller shall notify the supervisory authority of a breach."
                    .to_string(),
                chapter: None,
            }],
            recitals: vec![Recital {
                document_id: "gdpr".to_string(),
                ordinal: 1,
                body: "The protection of natural persons is a fundamental right.".to_string(),
            }],
            ..Default::default()
        }
    }

    async fn ingest(store: &SqliteStore, snapshot: &CorpusSnapshot) {
        let mut statements = delete_document_statements(store.dialect(), "gdpr");
        statements.extend(insert_snapshot_statements(store.dialect(), snapshot).unwrap());
        store.execute_batch(&statements).await.unwrap();
    }

    #[tokio::test]
    async fn test_roundtrip_and_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        ingest(&store, &sample_snapshot()).await;

        let result = store
            .execute(
                "SELECT number, title FROM articles WHERE document_id = ?1",
                &["gdpr".into()],
            )
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0].text(0).unwrap(), "33");
    }

    #[tokio::test]
    async fn test_fts_match_with_snippet() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        ingest(&store, &sample_snapshot()).await;

        let dialect = store.dialect();
        let expr = dialect.match_expression(
            &["breach".to_string(), "notify".to_string()],
            MatchMode::Conjunctive,
        );
        let sql = dialect.unit_search_sql(UnitRelation::Articles, 0);
        let result = store
            .execute(&sql, &[expr.into(), SqlValue::Int(10)])
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
        let snippet = result.rows[0].text(3).unwrap();
        assert!(snippet.contains("[breach]") || snippet.contains("[notify]"));
    }

    #[tokio::test]
    async fn test_replace_is_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        ingest(&store, &sample_snapshot()).await;

        let mut second = sample_snapshot();
        second.articles[0].number = "34".to_string();
        ingest(&store, &second).await;

        let result = store
            .execute("SELECT number FROM articles", &[])
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0].text(0).unwrap(), "34");

        // FTS mirror replaced in the same transaction
        let fts = store
            .execute("SELECT number FROM articles_fts", &[])
            .await
            .unwrap();
        assert_eq!(fts.row_count, 1);
    }

    #[tokio::test]
    async fn test_injection_payload_bound_not_executed() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        ingest(&store, &sample_snapshot()).await;

        let payload = "'; DROP TABLE articles; --";
        let result = store
            .execute(
                "SELECT number FROM articles WHERE document_id = ?1",
                &[payload.into()],
            )
            .await
            .unwrap();
        assert_eq!(result.row_count, 0);

        // Relation untouched
        let count = store
            .execute("SELECT COUNT(*) FROM articles", &[])
            .await
            .unwrap();
        assert_eq!(count.rows[0].int(0).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_query_is_query_fault() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let err = store.execute("SELEC nonsense", &[]).await.unwrap_err();
        assert!(matches!(err, CorpusError::QueryFault { .. }));
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.health_check().await.unwrap();
    }
}
