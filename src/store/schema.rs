//! # Corpus Schema Module
//!
//! ## Purpose
//! Relation definitions for both backends and the statement builders behind
//! the atomic snapshot replace. One full-text index exists per textual
//! relation and is kept in lockstep with its base relation on every write:
//! the embedded backend writes FTS mirror rows in the same transaction, the
//! networked backend derives stored tsvector columns.

use super::{CorpusSnapshot, SqlDialect, SqlValue};
use crate::errors::Result;

/// DDL for the embedded backend (SQLite + FTS5).
pub const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        source_version TEXT NOT NULL,
        effective_date TEXT
    )",
    "CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        number TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        chapter TEXT,
        UNIQUE (document_id, number)
    )",
    "CREATE TABLE IF NOT EXISTS recitals (
        id INTEGER PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        ordinal INTEGER NOT NULL,
        body TEXT NOT NULL,
        UNIQUE (document_id, ordinal)
    )",
    "CREATE TABLE IF NOT EXISTS definitions (
        id INTEGER PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        article_number TEXT NOT NULL,
        term TEXT NOT NULL,
        text TEXT NOT NULL,
        UNIQUE (document_id, term)
    )",
    "CREATE TABLE IF NOT EXISTS refs (
        id INTEGER PRIMARY KEY,
        source_document TEXT NOT NULL,
        source_article TEXT NOT NULL,
        target_document TEXT,
        target_article TEXT,
        raw_text TEXT NOT NULL,
        kind TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS control_mappings (
        id INTEGER PRIMARY KEY,
        control_id TEXT NOT NULL,
        document_id TEXT NOT NULL,
        article_numbers TEXT NOT NULL,
        strength TEXT NOT NULL,
        note TEXT NOT NULL,
        UNIQUE (control_id, document_id)
    )",
    "CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts USING fts5(
        title, body, document_id UNINDEXED, number UNINDEXED
    )",
    "CREATE VIRTUAL TABLE IF NOT EXISTS recitals_fts USING fts5(
        body, document_id UNINDEXED, ordinal UNINDEXED
    )",
];

/// DDL for the networked backend (Postgres + tsvector). Stored generated
/// columns keep the full-text indexes in lockstep with base-relation writes.
pub const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        source_version TEXT NOT NULL,
        effective_date TEXT
    )",
    "CREATE TABLE IF NOT EXISTS articles (
        id BIGSERIAL PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        number TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        chapter TEXT,
        search_tsv tsvector GENERATED ALWAYS AS (
            to_tsvector('english', coalesce(title, '') || ' ' || body)
        ) STORED,
        UNIQUE (document_id, number)
    )",
    "CREATE INDEX IF NOT EXISTS articles_search_idx ON articles USING GIN (search_tsv)",
    "CREATE TABLE IF NOT EXISTS recitals (
        id BIGSERIAL PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        ordinal INTEGER NOT NULL,
        body TEXT NOT NULL,
        search_tsv tsvector GENERATED ALWAYS AS (to_tsvector('english', body)) STORED,
        UNIQUE (document_id, ordinal)
    )",
    "CREATE INDEX IF NOT EXISTS recitals_search_idx ON recitals USING GIN (search_tsv)",
    "CREATE TABLE IF NOT EXISTS definitions (
        id BIGSERIAL PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        article_number TEXT NOT NULL,
        term TEXT NOT NULL,
        text TEXT NOT NULL,
        UNIQUE (document_id, term)
    )",
    "CREATE TABLE IF NOT EXISTS refs (
        id BIGSERIAL PRIMARY KEY,
        source_document TEXT NOT NULL,
        source_article TEXT NOT NULL,
        target_document TEXT,
        target_article TEXT,
        raw_text TEXT NOT NULL,
        kind TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS control_mappings (
        id BIGSERIAL PRIMARY KEY,
        control_id TEXT NOT NULL,
        document_id TEXT NOT NULL,
        article_numbers TEXT NOT NULL,
        strength TEXT NOT NULL,
        note TEXT NOT NULL,
        UNIQUE (control_id, document_id)
    )",
];

fn placeholders(dialect: &dyn SqlDialect, count: usize) -> String {
    (1..=count)
        .map(|n| dialect.placeholder(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Statements deleting every prior row of one document's snapshot.
pub fn delete_document_statements(
    dialect: &dyn SqlDialect,
    document_id: &str,
) -> Vec<(String, Vec<SqlValue>)> {
    let p1 = dialect.placeholder(1);
    let id: SqlValue = document_id.into();
    let mut statements = vec![
        (
            format!("DELETE FROM refs WHERE source_document = {p1}"),
            vec![id.clone()],
        ),
        (
            format!("DELETE FROM definitions WHERE document_id = {p1}"),
            vec![id.clone()],
        ),
        (
            format!("DELETE FROM recitals WHERE document_id = {p1}"),
            vec![id.clone()],
        ),
        (
            format!("DELETE FROM articles WHERE document_id = {p1}"),
            vec![id.clone()],
        ),
        (
            format!("DELETE FROM control_mappings WHERE document_id = {p1}"),
            vec![id.clone()],
        ),
        (
            format!("DELETE FROM documents WHERE id = {p1}"),
            vec![id.clone()],
        ),
    ];
    if !dialect.maintains_fts_inline() {
        statements.push((
            format!("DELETE FROM articles_fts WHERE document_id = {p1}"),
            vec![id.clone()],
        ));
        statements.push((
            format!("DELETE FROM recitals_fts WHERE document_id = {p1}"),
            vec![id],
        ));
    }
    statements
}

/// Statements inserting one document's complete snapshot. Combined with
/// `delete_document_statements` inside one transaction this is the atomic
/// wholesale replace: no unit-level mutation ever happens outside it.
pub fn insert_snapshot_statements(
    dialect: &dyn SqlDialect,
    snapshot: &CorpusSnapshot,
) -> Result<Vec<(String, Vec<SqlValue>)>> {
    let mut statements = Vec::new();

    if let Some(document) = &snapshot.document {
        statements.push((
            format!(
                "INSERT INTO documents (id, name, source_version, effective_date) VALUES ({})",
                placeholders(dialect, 4)
            ),
            vec![
                document.id.as_str().into(),
                document.name.as_str().into(),
                document.source_version.as_str().into(),
                document
                    .effective_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .into(),
            ],
        ));
    }

    for article in &snapshot.articles {
        statements.push((
            format!(
                "INSERT INTO articles (document_id, number, title, body, chapter) VALUES ({})",
                placeholders(dialect, 5)
            ),
            vec![
                article.document_id.as_str().into(),
                article.number.as_str().into(),
                article.title.as_str().into(),
                article.body.as_str().into(),
                article.chapter.clone().into(),
            ],
        ));
        if !dialect.maintains_fts_inline() {
            statements.push((
                format!(
                    "INSERT INTO articles_fts (title, body, document_id, number) VALUES ({})",
                    placeholders(dialect, 4)
                ),
                vec![
                    article.title.as_str().into(),
                    article.body.as_str().into(),
                    article.document_id.as_str().into(),
                    article.number.as_str().into(),
                ],
            ));
        }
    }

    for recital in &snapshot.recitals {
        statements.push((
            format!(
                "INSERT INTO recitals (document_id, ordinal, body) VALUES ({})",
                placeholders(dialect, 3)
            ),
            vec![
                recital.document_id.as_str().into(),
                SqlValue::Int(recital.ordinal as i64),
                recital.body.as_str().into(),
            ],
        ));
        if !dialect.maintains_fts_inline() {
            statements.push((
                format!(
                    "INSERT INTO recitals_fts (body, document_id, ordinal) VALUES ({})",
                    placeholders(dialect, 3)
                ),
                vec![
                    recital.body.as_str().into(),
                    recital.document_id.as_str().into(),
                    SqlValue::Int(recital.ordinal as i64),
                ],
            ));
        }
    }

    for definition in &snapshot.definitions {
        statements.push((
            format!(
                "INSERT INTO definitions (document_id, article_number, term, text) VALUES ({})",
                placeholders(dialect, 4)
            ),
            vec![
                definition.document_id.as_str().into(),
                definition.article_number.as_str().into(),
                definition.term.as_str().into(),
                definition.text.as_str().into(),
            ],
        ));
    }

    for reference in &snapshot.references {
        statements.push((
            format!(
                "INSERT INTO refs (source_document, source_article, target_document, \
                 target_article, raw_text, kind) VALUES ({})",
                placeholders(dialect, 6)
            ),
            vec![
                reference.source_document.as_str().into(),
                reference.source_article.as_str().into(),
                reference.target_document.clone().into(),
                reference.target_article.clone().into(),
                reference.raw_text.as_str().into(),
                reference.kind.as_str().into(),
            ],
        ));
    }

    for mapping in &snapshot.control_mappings {
        statements.push((
            format!(
                "INSERT INTO control_mappings (control_id, document_id, article_numbers, \
                 strength, note) VALUES ({})",
                placeholders(dialect, 5)
            ),
            vec![
                mapping.control_id.as_str().into(),
                mapping.document_id.as_str().into(),
                serde_json::to_string(&mapping.article_numbers)?.into(),
                mapping.strength.as_str().into(),
                mapping.note.as_str().into(),
            ],
        ));
    }

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteDialect;
    use crate::{Article, Document};

    #[test]
    fn test_snapshot_statements_are_fully_parameterized() {
        let snapshot = CorpusSnapshot {
            document: Some(Document {
                id: "gdpr".to_string(),
                name: "General Data Protection Regulation".to_string(),
                source_version: "v1".to_string(),
                effective_date: None,
            }),
            articles: vec![Article {
                document_id: "gdpr".to_string(),
                number: "1".to_string(),
                title: "Scope'; DROP TABLE articles; --".to_string(),
                body: "Body".to_string(),
                chapter: None,
            }],
            ..Default::default()
        };
        let statements = insert_snapshot_statements(&SqliteDialect, &snapshot).unwrap();
        // Values never appear in query text, only in the parameter lists.
        for (sql, _) in &statements {
            assert!(!sql.contains("DROP TABLE"));
            assert!(!sql.contains("Scope"));
        }
        // Document insert, article insert, FTS mirror insert.
        assert_eq!(statements.len(), 3);
    }
}
