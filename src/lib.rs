//! # Regulatory Corpus Search
//!
//! ## Overview
//! This library ingests authoritative regulatory text published as long-form
//! prose and produces a structured, queryable corpus of articles, recitals,
//! and defined terms, then serves adaptive full-text search and point lookups
//! against that corpus through a backend-agnostic store layer.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `parser`: Turns raw document text into ordered articles, recitals, and definitions
//! - `citations`: Scans parsed articles for references to other articles/documents
//! - `store`: One parameterized-query interface over SQLite (embedded) or Postgres (networked)
//! - `retrieval`: Adaptive conjunctive/disjunctive full-text search over articles and recitals
//! - `throttle`: Per-client fixed-window admission control
//! - `ingest`: Parse + extract + atomic snapshot replace pipeline
//! - `lookup`: Point lookups for documents, units, terms, and control mappings
//! - `config`: Configuration management and settings
//! - `errors`: Centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Raw regulatory text (plain prose), search queries (text)
//! - **Output**: Structured corpus records, ranked search results with snippets
//! - **Guarantees**: Deterministic parsing, injection-safe querying, bounded result sizes
//!
//! ## Usage
//! ```rust,no_run
//! use regulatory_corpus_search::{Config, retrieval::RetrievalEngine, store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.toml")?;
//!     let store = store::open(&config.store).await?;
//!     let engine = RetrievalEngine::new(config.search.clone(), store);
//!     let hits = engine.search("personal data breach notification", None, None).await?;
//!     println!("Found {} results", hits.len());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod parser;
pub mod citations;
pub mod store;
pub mod retrieval;
pub mod throttle;
pub mod ingest;
pub mod lookup;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use errors::{CorpusError, Result};
pub use ingest::{IngestReport, IngestionPipeline, SourceFetcher};
pub use retrieval::{RetrievalEngine, SearchHit};
pub use throttle::{FixedWindowThrottle, ThrottleDecision};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One regulatory instrument in the corpus.
///
/// A document is created once per ingestion run and replaced wholesale on
/// re-ingestion; it is never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier, e.g. `"gdpr"`
    pub id: String,
    /// Canonical display name, e.g. `"General Data Protection Regulation"`
    pub name: String,
    /// Version identifier reported by the source
    pub source_version: String,
    /// Date the instrument entered into application, when known
    pub effective_date: Option<NaiveDate>,
}

/// A numbered operative provision of a document.
///
/// Article numbers are strings and may carry letter suffixes or parenthetical
/// subsections (`"5(1)(a)"`, `"22a"`); they are never numerically coerced.
/// Unique within a document by `(document_id, number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub document_id: String,
    pub number: String,
    pub title: String,
    pub body: String,
    /// Chapter or title heading the article falls under, when present
    pub chapter: Option<String>,
}

/// A numbered preamble paragraph explaining legislative intent.
///
/// Unique within a document by `(document_id, ordinal)`; ordinals are
/// non-decreasing in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recital {
    pub document_id: String,
    pub ordinal: u32,
    pub body: String,
}

/// A defined term, anchored to the article that defines it.
///
/// The anchor article always belongs to the same document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub document_id: String,
    /// Number of the article the definition was extracted from
    pub article_number: String,
    pub term: String,
    pub text: String,
}

/// Classification of a citation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Explicit citation of another instrument
    CrossDocument,
    /// Reference to another article of the same document
    SelfReference,
    /// Derogation / notwithstanding relation overriding another provision
    Override,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::CrossDocument => "cross_document",
            ReferenceKind::SelfReference => "self_reference",
            ReferenceKind::Override => "override",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cross_document" => Some(ReferenceKind::CrossDocument),
            "self_reference" => Some(ReferenceKind::SelfReference),
            "override" => Some(ReferenceKind::Override),
            _ => None,
        }
    }
}

/// A directed citation edge from a (document, article) to another article or
/// document.
///
/// The source always resolves to a real article at extraction time. Targets
/// may be unresolved: an unknown designation is kept with `target_document`
/// set to `None` and the raw citation text preserved, never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub source_document: String,
    pub source_article: String,
    /// Resolved target document id, or `None` for unresolved designations
    pub target_document: Option<String>,
    /// Target article number within the target document, when the citation names one
    pub target_article: Option<String>,
    /// Citation text exactly as matched in the source
    pub raw_text: String,
    pub kind: ReferenceKind,
}

/// Coverage strength of a control mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverageStrength {
    Full,
    Partial,
    Related,
}

impl CoverageStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageStrength::Full => "full",
            CoverageStrength::Partial => "partial",
            CoverageStrength::Related => "related",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "full" => Some(CoverageStrength::Full),
            "partial" => Some(CoverageStrength::Partial),
            "related" => Some(CoverageStrength::Related),
            _ => None,
        }
    }
}

/// Associates an external control identifier with articles of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMapping {
    /// External control identifier, canonically uppercase, e.g. `"AC-2"`
    pub control_id: String,
    pub document_id: String,
    pub article_numbers: Vec<String>,
    pub strength: CoverageStrength,
    pub note: String,
}

/// The two textual sub-entities searched together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Article,
    Recital,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Article => "article",
            UnitKind::Recital => "recital",
        }
    }
}

/// A full unit record returned by point lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UnitRecord {
    Article(Article),
    Recital(Recital),
}
