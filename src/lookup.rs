//! # Point Lookup Module
//!
//! ## Purpose
//! Exact retrieval by identifier over the corpus store: documents, articles,
//! recitals, definitions, citation edges, and control mappings. Absence is
//! always `None` or an empty collection, never an error.
//!
//! ## Key Features
//! - Identifier canonicalization at the boundary: document ids lowercase,
//!   control ids uppercase
//! - Unit lookup resolves article numbers first, falling back to recital
//!   ordinals for purely numeric locators
//! - Term search goes through the dialect's pattern predicate, so matching
//!   case semantics follow the active backend

use crate::errors::{CorpusError, Result};
use crate::store::{CorpusStore, Row, SqlValue};
use crate::{
    Article, ControlMapping, CoverageStrength, Definition, Document, Recital, Reference,
    ReferenceKind, UnitRecord,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read-side facade over the corpus store.
pub struct CorpusReader {
    store: Arc<dyn CorpusStore>,
}

impl CorpusReader {
    pub fn new(store: Arc<dyn CorpusStore>) -> Self {
        Self { store }
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let id = canonical_document_id(id);
        let sql = format!(
            "SELECT id, name, source_version, effective_date FROM documents WHERE id = {}",
            self.placeholder(1)
        );
        let rows = self.store.execute(&sql, &[id.into()]).await?;
        rows.rows.first().map(document_from_row).transpose()
    }

    pub async fn get_article(&self, document: &str, number: &str) -> Result<Option<Article>> {
        let document = canonical_document_id(document);
        let sql = format!(
            "SELECT document_id, number, title, body, chapter FROM articles \
             WHERE document_id = {} AND number = {}",
            self.placeholder(1),
            self.placeholder(2)
        );
        let rows = self
            .store
            .execute(&sql, &[document.into(), number.trim().into()])
            .await?;
        rows.rows.first().map(article_from_row).transpose()
    }

    pub async fn get_recital(&self, document: &str, ordinal: u32) -> Result<Option<Recital>> {
        let document = canonical_document_id(document);
        let sql = format!(
            "SELECT document_id, ordinal, body FROM recitals \
             WHERE document_id = {} AND ordinal = {}",
            self.placeholder(1),
            self.placeholder(2)
        );
        let rows = self
            .store
            .execute(&sql, &[document.into(), SqlValue::Int(ordinal as i64)])
            .await?;
        rows.rows.first().map(recital_from_row).transpose()
    }

    /// Resolve a bare locator: an article number match wins outright; a
    /// purely numeric locator that names no article falls back to the
    /// recital with that ordinal.
    pub async fn get_unit(&self, document: &str, locator: &str) -> Result<Option<UnitRecord>> {
        let locator = locator.trim();
        if let Some(article) = self.get_article(document, locator).await? {
            return Ok(Some(UnitRecord::Article(article)));
        }
        if let Ok(ordinal) = locator.parse::<u32>() {
            if let Some(recital) = self.get_recital(document, ordinal).await? {
                return Ok(Some(UnitRecord::Recital(recital)));
            }
        }
        Ok(None)
    }

    /// Definitions whose term contains `fragment`, optionally restricted to
    /// one document. Matching case semantics follow the active backend.
    pub async fn lookup_term(
        &self,
        document: Option<&str>,
        fragment: &str,
    ) -> Result<Vec<Definition>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(fragment));
        let dialect = self.store.dialect();

        let mut sql = format!(
            "SELECT document_id, article_number, term, text FROM definitions WHERE {}",
            dialect.pattern_predicate("term", 1)
        );
        let mut params: Vec<SqlValue> = vec![pattern.into()];
        if let Some(document) = document {
            sql.push_str(&format!(" AND document_id = {}", self.placeholder(2)));
            params.push(canonical_document_id(document).into());
        }
        sql.push_str(" ORDER BY document_id, term");

        let rows = self.store.execute(&sql, &params).await?;
        rows.rows.iter().map(definition_from_row).collect()
    }

    /// Outbound citation edges of one article.
    pub async fn references_from(
        &self,
        document: &str,
        article: &str,
    ) -> Result<Vec<Reference>> {
        let document = canonical_document_id(document);
        let sql = format!(
            "SELECT source_document, source_article, target_document, target_article, \
             raw_text, kind FROM refs WHERE source_document = {} AND source_article = {} \
             ORDER BY id",
            self.placeholder(1),
            self.placeholder(2)
        );
        let rows = self
            .store
            .execute(&sql, &[document.into(), article.trim().into()])
            .await?;
        rows.rows.iter().map(reference_from_row).collect()
    }

    /// Control mappings grouped by control identifier, optionally filtered by
    /// control and/or document. Group ordering is lexicographic by control.
    pub async fn control_mappings(
        &self,
        control: Option<&str>,
        document: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<ControlMapping>>> {
        let mut sql = "SELECT control_id, document_id, article_numbers, strength, note \
                       FROM control_mappings"
            .to_string();
        let mut params: Vec<SqlValue> = Vec::new();
        let mut clauses: Vec<String> = Vec::new();
        if let Some(control) = control {
            params.push(control.trim().to_uppercase().into());
            clauses.push(format!("control_id = {}", self.placeholder(params.len())));
        }
        if let Some(document) = document {
            params.push(canonical_document_id(document).into());
            clauses.push(format!("document_id = {}", self.placeholder(params.len())));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY control_id, document_id");

        let rows = self.store.execute(&sql, &params).await?;
        let mut grouped: BTreeMap<String, Vec<ControlMapping>> = BTreeMap::new();
        for row in &rows.rows {
            let mapping = mapping_from_row(row)?;
            grouped
                .entry(mapping.control_id.clone())
                .or_default()
                .push(mapping);
        }
        Ok(grouped)
    }

    fn placeholder(&self, ordinal: usize) -> String {
        self.store.dialect().placeholder(ordinal)
    }
}

fn canonical_document_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Escape LIKE metacharacters so a literal `%` or `_` in a fragment matches
/// itself. Both backends treat backslash as the default escape here.
fn escape_like(fragment: &str) -> String {
    fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn document_from_row(row: &Row) -> Result<Document> {
    let effective_date = match row.opt_text(3)? {
        Some(text) => Some(NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| {
            CorpusError::Internal {
                message: format!("stored effective_date {text:?} is malformed: {e}"),
            }
        })?),
        None => None,
    };
    Ok(Document {
        id: row.text(0)?.to_string(),
        name: row.text(1)?.to_string(),
        source_version: row.text(2)?.to_string(),
        effective_date,
    })
}

fn article_from_row(row: &Row) -> Result<Article> {
    Ok(Article {
        document_id: row.text(0)?.to_string(),
        number: row.text(1)?.to_string(),
        title: row.text(2)?.to_string(),
        body: row.text(3)?.to_string(),
        chapter: row.opt_text(4)?.map(str::to_string),
    })
}

fn recital_from_row(row: &Row) -> Result<Recital> {
    Ok(Recital {
        document_id: row.text(0)?.to_string(),
        ordinal: row.int(1)? as u32,
        body: row.text(2)?.to_string(),
    })
}

fn definition_from_row(row: &Row) -> Result<Definition> {
    Ok(Definition {
        document_id: row.text(0)?.to_string(),
        article_number: row.text(1)?.to_string(),
        term: row.text(2)?.to_string(),
        text: row.text(3)?.to_string(),
    })
}

fn reference_from_row(row: &Row) -> Result<Reference> {
    let kind_text = row.text(5)?;
    let kind = ReferenceKind::parse(kind_text).ok_or_else(|| CorpusError::Internal {
        message: format!("stored reference kind {kind_text:?} is unknown"),
    })?;
    Ok(Reference {
        source_document: row.text(0)?.to_string(),
        source_article: row.text(1)?.to_string(),
        target_document: row.opt_text(2)?.map(str::to_string),
        target_article: row.opt_text(3)?.map(str::to_string),
        raw_text: row.text(4)?.to_string(),
        kind,
    })
}

fn mapping_from_row(row: &Row) -> Result<ControlMapping> {
    let strength_text = row.text(3)?;
    let strength =
        CoverageStrength::parse(strength_text).ok_or_else(|| CorpusError::Internal {
            message: format!("stored coverage strength {strength_text:?} is unknown"),
        })?;
    Ok(ControlMapping {
        control_id: row.text(0)?.to_string(),
        document_id: row.text(1)?.to_string(),
        article_numbers: serde_json::from_str(row.text(2)?)?,
        strength,
        note: row.text(4)?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreBackend, StoreConfig};
    use crate::store::schema::insert_snapshot_statements;
    use crate::store::{self, CorpusSnapshot};

    async fn seeded_reader(dir: &tempfile::TempDir) -> CorpusReader {
        let config = StoreConfig {
            backend: StoreBackend::Sqlite {
                path: dir.path().join("corpus.db"),
                read_pool_size: 2,
            },
            query_timeout_seconds: 5,
        };
        let store = store::open(&config).await.unwrap();

        let snapshot = CorpusSnapshot {
            document: Some(Document {
                id: "gdpr".to_string(),
                name: "General Data Protection Regulation".to_string(),
                source_version: "v1".to_string(),
                effective_date: NaiveDate::from_ymd_opt(2018, 5, 25),
            }),
            articles: vec![Article {
                document_id: "gdpr".to_string(),
                number: "4".to_string(),
                title: "Definitions".to_string(),
                body: "For the purposes of this Regulation.".to_string(),
                chapter: Some("CHAPTER I".to_string()),
            }],
            recitals: vec![Recital {
                document_id: "gdpr".to_string(),
                ordinal: 4,
                body: "The processing of personal data should serve mankind.".to_string(),
            }],
            definitions: vec![Definition {
                document_id: "gdpr".to_string(),
                article_number: "4".to_string(),
                term: "personal data".to_string(),
                text: "any information relating to an identified natural person".to_string(),
            }],
            references: vec![Reference {
                source_document: "gdpr".to_string(),
                source_article: "4".to_string(),
                target_document: Some("gdpr".to_string()),
                target_article: Some("6".to_string()),
                raw_text: "Article 6 of this Regulation".to_string(),
                kind: ReferenceKind::SelfReference,
            }],
            control_mappings: vec![
                ControlMapping {
                    control_id: "AC-2".to_string(),
                    document_id: "gdpr".to_string(),
                    article_numbers: vec!["4".to_string()],
                    strength: CoverageStrength::Partial,
                    note: "Identity lifecycle".to_string(),
                },
                ControlMapping {
                    control_id: "SC-8".to_string(),
                    document_id: "gdpr".to_string(),
                    article_numbers: vec!["32".to_string()],
                    strength: CoverageStrength::Full,
                    note: "Transmission confidentiality".to_string(),
                },
            ],
        };
        let statements = insert_snapshot_statements(store.dialect(), &snapshot).unwrap();
        store.execute_batch(&statements).await.unwrap();
        CorpusReader::new(store)
    }

    #[tokio::test]
    async fn test_document_roundtrip_with_date() {
        let dir = tempfile::tempdir().unwrap();
        let reader = seeded_reader(&dir).await;

        let doc = reader.get_document("GDPR").await.unwrap().unwrap();
        assert_eq!(doc.id, "gdpr");
        assert_eq!(doc.effective_date, NaiveDate::from_ymd_opt(2018, 5, 25));
        assert!(reader.get_document("dora").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unit_lookup_prefers_article() {
        let dir = tempfile::tempdir().unwrap();
        let reader = seeded_reader(&dir).await;

        // Locator "4" names both an article and a recital; the article wins.
        match reader.get_unit("gdpr", "4").await.unwrap().unwrap() {
            UnitRecord::Article(article) => assert_eq!(article.title, "Definitions"),
            other => panic!("expected article, got {other:?}"),
        }
        // No article 99; the numeric fallback finds nothing either.
        assert!(reader.get_unit("gdpr", "99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recital_fallback_for_numeric_locator() {
        let dir = tempfile::tempdir().unwrap();
        let reader = seeded_reader(&dir).await;

        let recital = reader.get_recital("gdpr", 4).await.unwrap().unwrap();
        assert!(recital.body.contains("serve mankind"));
        assert!(reader.get_recital("gdpr", 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_term_lookup_contains_match() {
        let dir = tempfile::tempdir().unwrap();
        let reader = seeded_reader(&dir).await;

        let hits = reader.lookup_term(None, "personal").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].term, "personal data");

        assert!(reader.lookup_term(None, "").await.unwrap().is_empty());
        assert!(reader
            .lookup_term(Some("dora"), "personal")
            .await
            .unwrap()
            .is_empty());
        // LIKE metacharacters in the fragment match literally, not as wildcards.
        assert!(reader.lookup_term(None, "p%data").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_references_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let reader = seeded_reader(&dir).await;

        let refs = reader.references_from("gdpr", "4").await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, ReferenceKind::SelfReference);
        assert_eq!(refs[0].target_article.as_deref(), Some("6"));
        assert!(reader.references_from("gdpr", "1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_control_mappings_grouped_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let reader = seeded_reader(&dir).await;

        let all = reader.control_mappings(None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("AC-2") && all.contains_key("SC-8"));
        assert_eq!(all["AC-2"][0].article_numbers, vec!["4"]);

        // Control id is canonicalized to uppercase.
        let one = reader.control_mappings(Some("ac-2"), None).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one["AC-2"][0].strength, CoverageStrength::Partial);

        let none = reader
            .control_mappings(None, Some("dora"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
