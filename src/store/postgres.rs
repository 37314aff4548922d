//! # Networked Store Backend
//!
//! ## Purpose
//! Postgres implementation of the corpus store: a bounded connection pool
//! plus a per-query timeout so one slow query cannot starve the pool.
//!
//! ## Key Features
//! - `$N` positional placeholders, `to_tsquery` full-text predicates,
//!   case-insensitive `ILIKE` pattern matching
//! - Stored generated tsvector columns keep full-text indexes in lockstep
//!   with base-relation writes
//! - Connection and timeout failures surface as `Unavailable`

use super::schema::POSTGRES_SCHEMA;
use super::{CorpusStore, MatchMode, Row, RowSet, SqlDialect, SqlValue, UnitRelation};
use crate::errors::{CorpusError, Result};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;

/// Syntax profile of the networked backend.
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn placeholder(&self, ordinal: usize) -> String {
        format!("${ordinal}")
    }

    fn match_expression(&self, tokens: &[String], mode: MatchMode) -> String {
        match mode {
            MatchMode::Conjunctive => tokens.join(" & "),
            MatchMode::DisjunctivePrefix => tokens
                .iter()
                .map(|t| format!("{t}:*"))
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    fn unit_search_sql(&self, relation: UnitRelation, doc_filter: usize) -> String {
        let filter = in_clause(self, doc_filter);
        let limit = self.placeholder(doc_filter + 2);
        match relation {
            UnitRelation::Articles => format!(
                "SELECT document_id, number, title, \
                 ts_headline('english', body, to_tsquery('english', $1), \
                 'StartSel=[, StopSel=], MaxWords=24, MinWords=8') \
                 FROM articles WHERE search_tsv @@ to_tsquery('english', $1){filter} \
                 ORDER BY ts_rank(search_tsv, to_tsquery('english', $1)) DESC LIMIT {limit}"
            ),
            UnitRelation::Recitals => format!(
                "SELECT document_id, CAST(ordinal AS TEXT), CAST(NULL AS TEXT), \
                 ts_headline('english', body, to_tsquery('english', $1), \
                 'StartSel=[, StopSel=], MaxWords=24, MinWords=8') \
                 FROM recitals WHERE search_tsv @@ to_tsquery('english', $1){filter} \
                 ORDER BY ts_rank(search_tsv, to_tsquery('english', $1)) DESC LIMIT {limit}"
            ),
        }
    }

    fn pattern_predicate(&self, column: &str, ordinal: usize) -> String {
        format!("{column} ILIKE {}", self.placeholder(ordinal))
    }

    fn maintains_fts_inline(&self) -> bool {
        true
    }
}

fn in_clause(dialect: &dyn SqlDialect, doc_filter: usize) -> String {
    if doc_filter == 0 {
        return String::new();
    }
    let slots: Vec<String> = (0..doc_filter).map(|i| dialect.placeholder(i + 2)).collect();
    format!(" AND document_id IN ({})", slots.join(", "))
}

/// Networked corpus store over a bounded connection pool.
pub struct PostgresStore {
    pool: Pool,
    timeout: Duration,
    dialect: PostgresDialect,
}

impl PostgresStore {
    /// Build the pool from a `key=value` connection string. Connections are
    /// established lazily on first use.
    pub fn connect(url: &str, pool_size: usize, timeout_seconds: u64) -> Result<Self> {
        let mut pg_config: tokio_postgres::Config =
            url.parse().map_err(|e: tokio_postgres::Error| CorpusError::Config {
                message: format!("invalid postgres connection string: {e}"),
            })?;
        // Server-side cancellation backs up the client-side timeout, so a
        // slow query stops consuming a pooled connection once abandoned.
        pg_config.options(&format!("-c statement_timeout={}s", timeout_seconds));
        // TCP establishment honors the same bound; without it a blackholed
        // host stalls for the OS connect default instead.
        pg_config.connect_timeout(Duration::from_secs(timeout_seconds));
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .build()
            .map_err(|e| CorpusError::Config {
                message: format!("failed to build connection pool: {e}"),
            })?;

        tracing::info!(pool_size, "configured networked corpus store");

        Ok(Self {
            pool,
            timeout: Duration::from_secs(timeout_seconds),
            dialect: PostgresDialect,
        })
    }

    fn timeout_error(&self) -> CorpusError {
        CorpusError::Unavailable {
            details: format!("query exceeded {}s timeout", self.timeout.as_secs()),
        }
    }

    /// Acquire a pooled connection under the same bound as queries; a fresh
    /// connection may have to dial the server first.
    async fn client(&self) -> Result<deadpool_postgres::Object> {
        let client = tokio::time::timeout(self.timeout, self.pool.get())
            .await
            .map_err(|_| self.timeout_error())??;
        Ok(client)
    }
}

fn bind_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql + Sync + Send> {
            match p {
                SqlValue::Null => Box::new(Option::<String>::None),
                SqlValue::Int(v) => Box::new(*v),
                SqlValue::Float(v) => Box::new(*v),
                SqlValue::Text(v) => Box::new(v.clone()),
            }
        })
        .collect()
}

fn convert_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = match *column.type_() {
            Type::INT2 => row
                .try_get::<_, Option<i16>>(index)
                .map(|v| v.map(|v| SqlValue::Int(v as i64))),
            Type::INT4 => row
                .try_get::<_, Option<i32>>(index)
                .map(|v| v.map(|v| SqlValue::Int(v as i64))),
            Type::INT8 => row
                .try_get::<_, Option<i64>>(index)
                .map(|v| v.map(SqlValue::Int)),
            Type::FLOAT4 => row
                .try_get::<_, Option<f32>>(index)
                .map(|v| v.map(|v| SqlValue::Float(v as f64))),
            Type::FLOAT8 => row
                .try_get::<_, Option<f64>>(index)
                .map(|v| v.map(SqlValue::Float)),
            Type::BOOL => row
                .try_get::<_, Option<bool>>(index)
                .map(|v| v.map(|v| SqlValue::Int(v as i64))),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
                .try_get::<_, Option<String>>(index)
                .map(|v| v.map(SqlValue::Text)),
            ref other => {
                return Err(CorpusError::QueryFault {
                    details: format!("unsupported column type {other} at index {index}"),
                })
            }
        }?;
        values.push(value.unwrap_or(SqlValue::Null));
    }
    Ok(Row { values })
}

#[async_trait]
impl CorpusStore for PostgresStore {
    async fn execute(&self, query: &str, params: &[SqlValue]) -> Result<RowSet> {
        let client = self.client().await?;
        let owned = bind_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            owned.iter().map(|b| b.as_ref() as &(dyn ToSql + Sync)).collect();

        let rows = tokio::time::timeout(self.timeout, client.query(query, &refs))
            .await
            .map_err(|_| self.timeout_error())??;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(convert_row(row)?);
        }
        Ok(RowSet::new(out))
    }

    async fn execute_batch(&self, statements: &[(String, Vec<SqlValue>)]) -> Result<()> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        for (sql, params) in statements {
            let owned = bind_params(params);
            let refs: Vec<&(dyn ToSql + Sync)> =
                owned.iter().map(|b| b.as_ref() as &(dyn ToSql + Sync)).collect();
            tokio::time::timeout(self.timeout, tx.execute(sql.as_str(), &refs))
                .await
                .map_err(|_| self.timeout_error())??;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        let client = self.client().await?;
        for ddl in POSTGRES_SCHEMA {
            client.batch_execute(ddl).await?;
        }
        Ok(())
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_placeholders() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.placeholder(1), "$1");
        assert_eq!(dialect.placeholder(12), "$12");
    }

    #[test]
    fn test_match_expressions() {
        let dialect = PostgresDialect;
        let tokens = vec!["incident".to_string(), "reporting".to_string()];
        assert_eq!(
            dialect.match_expression(&tokens, MatchMode::Conjunctive),
            "incident & reporting"
        );
        assert_eq!(
            dialect.match_expression(&tokens, MatchMode::DisjunctivePrefix),
            "incident:* | reporting:*"
        );
    }

    #[test]
    fn test_search_sql_shape() {
        let dialect = PostgresDialect;
        let sql = dialect.unit_search_sql(UnitRelation::Articles, 2);
        assert!(sql.contains("document_id IN ($2, $3)"));
        assert!(sql.contains("LIMIT $4"));
        assert!(sql.contains("to_tsquery"));
    }

    #[test]
    fn test_pattern_predicate_is_case_insensitive() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.pattern_predicate("term", 2), "term ILIKE $2");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable_within_bound() {
        // Non-routable per RFC 5737; whether the dial fails outright or
        // hangs, the error must arrive inside the configured bound rather
        // than the OS connect default.
        let store =
            PostgresStore::connect("host=192.0.2.1 user=corpus dbname=corpus", 1, 1).unwrap();
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            store.execute("SELECT 1", &[]),
        )
        .await
        .expect("connection attempt must be bounded");
        assert!(matches!(
            result.unwrap_err(),
            CorpusError::Unavailable { .. }
        ));
    }
}
