//! # Adaptive Retrieval Engine
//!
//! ## Purpose
//! Turns free text into backend full-text queries, picking a matching
//! strategy by query shape, and merges ranked article and recital matches
//! into one snippeted result stream.
//!
//! ## Input/Output Specification
//! - **Input**: Free-text query, optional result cap, optional document subset
//! - **Output**: Ranked `SearchHit` sequence spanning articles and recitals
//! - **Strategy**: ≤3 significant tokens → conjunctive exact (precision);
//!   ≥4 → disjunctive prefix (recall — requiring all tokens on long
//!   natural-language queries empirically yields zero matches on this prose)
//!
//! ## Key Features
//! - Fixed stopword stripping and token sanitization before query build
//! - Articles interleaved ahead of recitals at equal nominal rank
//! - Hard result ceiling, silently clamped; degenerate queries short-circuit

use crate::config::SearchConfig;
use crate::errors::Result;
use crate::store::{CorpusStore, MatchMode, RowSet, UnitRelation};
use crate::utils::TextUtils;
use crate::UnitKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// No query ever returns more rows than this, whatever the caller asks for.
pub const HARD_RESULT_CEILING: usize = 50;

/// Query tokens beyond this are ignored, bounding query complexity against
/// pathological inputs.
const MAX_QUERY_TOKENS: usize = 12;

/// Tokens carrying no retrieval signal over regulatory prose.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "any", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "shall", "should", "such", "that", "the", "their",
    "this", "to", "under", "where", "which", "with",
];

/// One ranked search match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Document identifier
    pub document: String,
    /// Unit locator: article number or recital ordinal
    pub unit: String,
    /// Article title; absent for recitals
    pub title: Option<String>,
    /// Highlighted snippet around the match
    pub snippet: String,
    pub kind: UnitKind,
}

/// Adaptive full-text search over the corpus store.
pub struct RetrievalEngine {
    config: SearchConfig,
    store: Arc<dyn CorpusStore>,
}

impl RetrievalEngine {
    pub fn new(config: SearchConfig, store: Arc<dyn CorpusStore>) -> Self {
        Self { config, store }
    }

    /// Search articles and recitals, best match first.
    ///
    /// A cap of zero or less returns an empty sequence without error; a cap
    /// above the hard ceiling is silently clamped. An empty or
    /// whitespace-only query returns empty without invoking the underlying
    /// index, which may reject a degenerate empty term.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<i64>,
        documents: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        let Some(limit) = effective_limit(limit, self.config.default_limit) else {
            return Ok(Vec::new());
        };

        let tokens = significant_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let mode = select_mode(tokens.len());

        let docs: Vec<String> = documents
            .unwrap_or(&[])
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        let dialect = self.store.dialect();
        let expression = dialect.match_expression(&tokens, mode);

        let mut params: Vec<crate::store::SqlValue> = vec![expression.into()];
        params.extend(docs.iter().map(|d| d.as_str().into()));
        params.push(crate::store::SqlValue::Int(limit as i64));

        tracing::debug!(
            tokens = tokens.len(),
            mode = ?mode,
            limit,
            "executing adaptive search"
        );

        let article_sql = dialect.unit_search_sql(UnitRelation::Articles, docs.len());
        let recital_sql = dialect.unit_search_sql(UnitRelation::Recitals, docs.len());
        let (articles, recitals) = futures::future::try_join(
            self.store.execute(&article_sql, &params),
            self.store.execute(&recital_sql, &params),
        )
        .await?;

        let mut hits = self.interleave(articles, recitals)?;
        hits.truncate(limit);
        Ok(hits)
    }

    /// Merge the two ranked streams, articles ahead of recitals at equal
    /// nominal rank: binding text before explanatory text.
    fn interleave(&self, articles: RowSet, recitals: RowSet) -> Result<Vec<SearchHit>> {
        let articles = self.to_hits(articles, UnitKind::Article)?;
        let recitals = self.to_hits(recitals, UnitKind::Recital)?;

        let mut merged = Vec::with_capacity(articles.len() + recitals.len());
        let longest = articles.len().max(recitals.len());
        let mut articles = articles.into_iter();
        let mut recitals = recitals.into_iter();
        for _ in 0..longest {
            if let Some(hit) = articles.next() {
                merged.push(hit);
            }
            if let Some(hit) = recitals.next() {
                merged.push(hit);
            }
        }
        Ok(merged)
    }

    fn to_hits(&self, rows: RowSet, kind: UnitKind) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::with_capacity(rows.row_count);
        for row in &rows.rows {
            let title = row.opt_text(2)?.map(str::to_string);
            let mut snippet = row.opt_text(3)?.unwrap_or_default().to_string();
            if snippet.trim().is_empty() {
                // Title-only matches can produce an empty highlight window.
                snippet = TextUtils::truncate(
                    title.as_deref().unwrap_or(""),
                    self.config.snippet_length,
                );
            }
            hits.push(SearchHit {
                document: row.text(0)?.to_string(),
                unit: row.text(1)?.to_string(),
                title,
                snippet,
                kind,
            });
        }
        Ok(hits)
    }
}

/// Resolve the caller's cap: `None` means the configured default, zero or
/// less means "no results", anything above the hard ceiling clamps.
fn effective_limit(limit: Option<i64>, default_limit: usize) -> Option<usize> {
    match limit {
        None => Some(default_limit.min(HARD_RESULT_CEILING)),
        Some(n) if n <= 0 => None,
        Some(n) => Some((n as usize).min(HARD_RESULT_CEILING)),
    }
}

/// Tokenize on whitespace, reduce to alphanumeric cores, strip stopwords,
/// and de-duplicate preserving order.
fn significant_tokens(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in query.split_whitespace() {
        let Some(token) = TextUtils::sanitize_token(raw) else {
            continue;
        };
        if STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if !tokens.contains(&token) {
            tokens.push(token);
        }
        if tokens.len() == MAX_QUERY_TOKENS {
            break;
        }
    }
    tokens
}

/// Short, targeted queries get precision; long natural-language ones recall.
fn select_mode(token_count: usize) -> MatchMode {
    if token_count <= 3 {
        MatchMode::Conjunctive
    } else {
        MatchMode::DisjunctivePrefix
    }
}
