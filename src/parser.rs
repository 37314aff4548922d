//! # Document Parser Module
//!
//! ## Purpose
//! Converts raw regulatory text into ordered articles, recitals, and defined
//! terms. This is the structural core of ingestion: variably formatted prose
//! goes in, correctly bounded records come out.
//!
//! ## Input/Output Specification
//! - **Input**: Raw document text, document identifier
//! - **Output**: `ParsedDocument` with ordered articles, recitals, definitions
//! - **Failure**: `StructuralParse` when no article boundary exists at all
//!
//! ## Key Features
//! - Line-oriented recital state machine (`BeforeRecitals → InRecitals → Done`)
//! - Article header scanning with chapter tracking
//! - Verbatim article numbers (letter suffixes and subsections never coerced)
//! - Definitions article detection with enumerated term/definition clauses
//! - Deterministic: identical input yields byte-identical output

use crate::errors::{CorpusError, Result};
use crate::{Article, Definition, Recital};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Conventional opening sentinel for the recital block.
const RECITAL_OPENING_SENTINEL: &str = "whereas:";

/// Conventional closing sentinels for the recital block. The heading of the
/// first article also closes it.
const RECITAL_CLOSING_SENTINELS: &[&str] = &[
    "have adopted this regulation",
    "has adopted this regulation",
    "have adopted this directive",
    "has adopted this directive",
];

/// Structured output of one parse run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub articles: Vec<Article>,
    pub recitals: Vec<Recital>,
    pub definitions: Vec<Definition>,
}

/// Parser for long-form regulatory prose.
pub struct DocumentParser {
    article_header: Regex,
    chapter_header: Regex,
    recital_leader: Regex,
    definition_leader: Regex,
    definition_clause: Regex,
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser {
    pub fn new() -> Self {
        Self {
            // Whole-line anchor keeps in-body mentions ("... Article 5 of
            // this Regulation.") from being taken for headers.
            article_header: Regex::new(r"^Article\s+(\d+[a-z]{0,2}(?:\(\d+\))*(?:\([a-z]\))*)\s*$")
                .unwrap(),
            chapter_header: Regex::new(r"^(?:CHAPTER|TITLE)\s+[IVXLCDM\d]+[A-Za-z]?\b.*$").unwrap(),
            recital_leader: Regex::new(r"^\((\d+)\)\s*(.*)$").unwrap(),
            definition_leader: Regex::new(r"^\(\d+[a-z]?\)\s*(.*)$").unwrap(),
            definition_clause: Regex::new(r"^[‘'\u{2018}]?(.+?)['’\u{2019}]?\s+means\s+(.+)$")
                .unwrap(),
        }
    }

    /// Parse raw text into ordered articles, recitals, and definitions.
    ///
    /// Fails with `StructuralParse` when no article boundary is found: that
    /// signals the input is not a real document (an access-denial page, an
    /// empty fetch) rather than a sparsely structured one. Zero recitals is
    /// valid; recitals without any article is not.
    pub fn parse(&self, document_id: &str, raw: &str) -> Result<ParsedDocument> {
        let text: String = raw.nfc().collect();
        let lines: Vec<&str> = text.lines().collect();

        let articles = self.extract_articles(document_id, &lines);
        if articles.is_empty() {
            return Err(CorpusError::StructuralParse {
                document: document_id.to_string(),
                details: "no article headers recognized".to_string(),
            });
        }

        let recitals = self.extract_recitals(document_id, &lines);
        let definitions = self.extract_definitions(document_id, &articles);

        tracing::debug!(
            document = document_id,
            articles = articles.len(),
            recitals = recitals.len(),
            definitions = definitions.len(),
            "parsed document"
        );

        Ok(ParsedDocument {
            articles,
            recitals,
            definitions,
        })
    }

    /// Run the recital state machine over the document's lines.
    fn extract_recitals(&self, document_id: &str, lines: &[&str]) -> Vec<Recital> {
        let mut machine = RecitalMachine::new(self);
        for line in lines {
            machine.feed(line.trim());
            if machine.state == RecitalState::Done {
                break;
            }
        }
        machine.finish(document_id)
    }

    /// Scan for article headers and slice intervening text as bodies.
    fn extract_articles(&self, document_id: &str, lines: &[&str]) -> Vec<Article> {
        let mut articles: Vec<Article> = Vec::new();
        let mut current: Option<ArticleBuilder> = None;
        let mut chapter: Option<String> = None;

        for line in lines {
            let trimmed = line.trim();

            if let Some(caps) = self.article_header.captures(trimmed) {
                if let Some(builder) = current.take() {
                    articles.push(builder.build(document_id));
                }
                current = Some(ArticleBuilder::new(caps[1].to_string(), chapter.clone()));
                continue;
            }

            if self.chapter_header.is_match(trimmed) {
                if let Some(builder) = current.take() {
                    articles.push(builder.build(document_id));
                }
                chapter = Some(trimmed.to_string());
                continue;
            }

            if let Some(builder) = current.as_mut() {
                builder.feed(trimmed);
            }
        }

        if let Some(builder) = current.take() {
            articles.push(builder.build(document_id));
        }

        articles
    }

    /// Locate the conventional definitions article and extract its enumerated
    /// term/definition clauses, each anchored to that article's number.
    fn extract_definitions(&self, document_id: &str, articles: &[Article]) -> Vec<Definition> {
        let Some(article) = articles
            .iter()
            .find(|a| a.title.to_lowercase().contains("definition"))
        else {
            return Vec::new();
        };

        let mut definitions = Vec::new();
        let mut clause: Vec<String> = Vec::new();

        let mut flush = |clause: &mut Vec<String>, definitions: &mut Vec<Definition>| {
            if clause.is_empty() {
                return;
            }
            let joined = clause.join(" ");
            clause.clear();
            if let Some(caps) = self.definition_clause.captures(joined.trim()) {
                definitions.push(Definition {
                    document_id: document_id.to_string(),
                    article_number: article.number.clone(),
                    term: caps[1].trim().to_string(),
                    text: caps[2].trim().to_string(),
                });
            }
        };

        let mut in_clauses = false;
        for line in article.body.lines() {
            let trimmed = line.trim();
            if let Some(caps) = self.definition_leader.captures(trimmed) {
                flush(&mut clause, &mut definitions);
                in_clauses = true;
                clause.push(caps[1].to_string());
            } else if in_clauses && !trimmed.is_empty() {
                clause.push(trimmed.to_string());
            }
        }
        flush(&mut clause, &mut definitions);

        definitions
    }
}

/// Accumulates one article between two headers.
struct ArticleBuilder {
    number: String,
    chapter: Option<String>,
    title: Option<String>,
    body: Vec<String>,
}

impl ArticleBuilder {
    fn new(number: String, chapter: Option<String>) -> Self {
        Self {
            number,
            chapter,
            title: None,
            body: Vec::new(),
        }
    }

    fn feed(&mut self, line: &str) {
        if line.is_empty() {
            if !self.body.is_empty() {
                self.body.push(String::new());
            }
            return;
        }
        // The first non-empty line after the header is the title by
        // convention; everything after is body.
        if self.title.is_none() {
            self.title = Some(line.to_string());
        } else {
            self.body.push(line.to_string());
        }
    }

    fn build(self, document_id: &str) -> Article {
        let mut body = self.body.join("\n");
        while body.ends_with('\n') {
            body.pop();
        }
        Article {
            document_id: document_id.to_string(),
            number: self.number,
            title: self.title.unwrap_or_default(),
            body,
            chapter: self.chapter,
        }
    }
}

/// States of the line-oriented recital machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecitalState {
    BeforeRecitals,
    InRecitals,
    Done,
}

/// Line-oriented finite-state machine for recital extraction.
///
/// One transition function per state. Text seen outside `InRecitals` is
/// never recorded. Ordinals are kept strictly increasing: a leading `(N)`
/// that does not advance past the previous ordinal is treated as enumeration
/// text inside the open recital, not as a new one.
struct RecitalMachine<'p> {
    parser: &'p DocumentParser,
    state: RecitalState,
    recitals: Vec<(u32, Vec<String>)>,
    current: Option<(u32, Vec<String>)>,
}

impl<'p> RecitalMachine<'p> {
    fn new(parser: &'p DocumentParser) -> Self {
        Self {
            parser,
            state: RecitalState::BeforeRecitals,
            recitals: Vec::new(),
            current: None,
        }
    }

    fn feed(&mut self, line: &str) {
        self.state = match self.state {
            RecitalState::BeforeRecitals => self.on_before_recitals(line),
            RecitalState::InRecitals => self.on_in_recitals(line),
            RecitalState::Done => RecitalState::Done,
        };
    }

    fn on_before_recitals(&mut self, line: &str) -> RecitalState {
        if line.to_lowercase().starts_with(RECITAL_OPENING_SENTINEL) {
            return RecitalState::InRecitals;
        }
        // Some sources drop the sentinel; the first `(1)` leader also opens
        // the block.
        if let Some(caps) = self.parser.recital_leader.captures(line) {
            if let Ok(ordinal) = caps[1].parse::<u32>() {
                self.open(ordinal, &caps[2]);
                return RecitalState::InRecitals;
            }
        }
        RecitalState::BeforeRecitals
    }

    fn on_in_recitals(&mut self, line: &str) -> RecitalState {
        if self.is_closing(line) {
            self.flush();
            return RecitalState::Done;
        }
        if let Some(caps) = self.parser.recital_leader.captures(line) {
            if let Ok(ordinal) = caps[1].parse::<u32>() {
                let last = self
                    .current
                    .as_ref()
                    .map(|(n, _)| *n)
                    .or_else(|| self.recitals.last().map(|(n, _)| *n))
                    .unwrap_or(0);
                if ordinal > last {
                    self.flush();
                    self.open(ordinal, &caps[2]);
                    return RecitalState::InRecitals;
                }
                // Non-advancing ordinal: an enumerated list inside the
                // recital body, falls through to buffering below.
            }
        }
        if let Some((_, buffer)) = self.current.as_mut() {
            if !line.is_empty() {
                buffer.push(line.to_string());
            }
        }
        RecitalState::InRecitals
    }

    fn is_closing(&self, line: &str) -> bool {
        let lowered = line.to_lowercase();
        RECITAL_CLOSING_SENTINELS
            .iter()
            .any(|s| lowered.starts_with(s))
            || self.parser.article_header.is_match(line)
    }

    fn open(&mut self, ordinal: u32, trailing: &str) {
        let mut buffer = Vec::new();
        let trailing = trailing.trim();
        if !trailing.is_empty() {
            buffer.push(trailing.to_string());
        }
        self.current = Some((ordinal, buffer));
    }

    fn flush(&mut self) {
        if let Some((ordinal, buffer)) = self.current.take() {
            if !buffer.is_empty() {
                self.recitals.push((ordinal, buffer));
            }
        }
    }

    fn finish(mut self, document_id: &str) -> Vec<Recital> {
        // Input exhausted counts as the closing boundary.
        self.flush();
        self.recitals
            .into_iter()
            .map(|(ordinal, buffer)| Recital {
                document_id: document_id.to_string(),
                ordinal,
                body: buffer.join("\n\n"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> DocumentParser {
        DocumentParser::new()
    }

    const SAMPLE: &str = "\
REGULATION (EU) 2016/679

Whereas:

(1) The protection of natural persons in relation to the processing of
personal data is a fundamental right.

(2) The principles of data protection should apply to any information
concerning an identified or identifiable natural person.

HAVE ADOPTED THIS REGULATION:

CHAPTER I General provisions

Article 1
Subject-matter and objectives
This Regulation lays down rules relating to the protection of natural
persons. See Article 5 of this Regulation.

Article 4
Definitions
For the purposes of this Regulation:
(1) 'personal data' means any information relating to an identified or
identifiable natural person;
(2) 'processing' means any operation performed on personal data;

Article 22a
Automated decisions
Further provisions on automated individual decision-making.
";

    #[test]
    fn test_parses_articles_and_recitals() {
        let parsed = parser().parse("gdpr", SAMPLE).unwrap();
        assert_eq!(parsed.recitals.len(), 2);
        assert_eq!(parsed.recitals[0].ordinal, 1);
        assert_eq!(parsed.recitals[1].ordinal, 2);
        assert!(parsed.recitals[0].body.starts_with("The protection"));

        let numbers: Vec<&str> = parsed.articles.iter().map(|a| a.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "4", "22a"]);
        assert_eq!(parsed.articles[0].title, "Subject-matter and objectives");
        assert_eq!(
            parsed.articles[0].chapter.as_deref(),
            Some("CHAPTER I General provisions")
        );
    }

    #[test]
    fn test_letter_suffix_preserved_verbatim() {
        let parsed = parser().parse("gdpr", SAMPLE).unwrap();
        assert!(parsed.articles.iter().any(|a| a.number == "22a"));
    }

    #[test]
    fn test_definitions_anchored_to_article() {
        let parsed = parser().parse("gdpr", SAMPLE).unwrap();
        assert_eq!(parsed.definitions.len(), 2);
        assert_eq!(parsed.definitions[0].term, "personal data");
        assert_eq!(parsed.definitions[0].article_number, "4");
        assert!(parsed.definitions[1].text.starts_with("any operation"));
        // Anchor article exists in the same document
        for def in &parsed.definitions {
            assert!(parsed
                .articles
                .iter()
                .any(|a| a.number == def.article_number && a.document_id == def.document_id));
        }
    }

    #[test]
    fn test_no_articles_is_structural_failure() {
        let err = parser().parse("gdpr", "Access denied.\nPlease log in.");
        assert!(matches!(err, Err(CorpusError::StructuralParse { .. })));
    }

    #[test]
    fn test_recitals_without_articles_still_fail() {
        let text = "Whereas:\n(1) Something aspirational.\n(2) Something else.\n";
        let err = parser().parse("gdpr", text);
        assert!(matches!(err, Err(CorpusError::StructuralParse { .. })));
    }

    #[test]
    fn test_zero_recitals_is_valid() {
        let text = "Article 1\nScope\nThis instrument applies to everyone.\n";
        let parsed = parser().parse("doc", text).unwrap();
        assert!(parsed.recitals.is_empty());
        assert_eq!(parsed.articles.len(), 1);
    }

    #[test]
    fn test_multiline_recitals_join_with_paragraph_breaks() {
        let text = "\
Whereas:
(1) First line of recital one.

Second paragraph of recital one.
(2) Recital two.
Article 1
Scope
Body.
";
        let parsed = parser().parse("doc", text).unwrap();
        assert_eq!(parsed.recitals.len(), 2);
        assert_eq!(
            parsed.recitals[0].body,
            "First line of recital one.\n\nSecond paragraph of recital one."
        );
    }

    #[test]
    fn test_text_before_sentinel_never_recorded() {
        let text = "\
(Not a recital, preamble citation)
Whereas:
(1) Actual recital.
Article 1
Scope
Body.
";
        let parsed = parser().parse("doc", text).unwrap();
        assert_eq!(parsed.recitals.len(), 1);
        assert_eq!(parsed.recitals[0].ordinal, 1);
    }

    #[test]
    fn test_non_advancing_ordinal_stays_in_open_recital() {
        // The "(1)" inside recital 3 is an enumeration, not a new recital.
        let text = "\
Whereas:
(3) Obligations include:
(1) a first obligation;
(4) Final recital.
Article 1
Scope
Body.
";
        let parsed = parser().parse("doc", text).unwrap();
        let ordinals: Vec<u32> = parsed.recitals.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![3, 4]);
        assert!(parsed.recitals[0].body.contains("a first obligation"));
    }

    #[test]
    fn test_ordinals_strictly_increasing() {
        let parsed = parser().parse("gdpr", SAMPLE).unwrap();
        for pair in parsed.recitals.windows(2) {
            assert!(pair[0].ordinal < pair[1].ordinal);
        }
    }

    #[test]
    fn test_reparse_is_byte_identical() {
        let first = parser().parse("gdpr", SAMPLE).unwrap();
        let second = parser().parse("gdpr", SAMPLE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_first_numbered_marker_opens_recitals_without_sentinel() {
        // Some sources drop the "Whereas:" sentinel entirely; the first
        // (N) leader must open the block on its own.
        let text = "\
(1) First recital without any sentinel.
(2) Second recital.
Article 1
Scope
This instrument applies as set out in Article 1 of this Regulation.
";
        let parsed = parser().parse("doc", text).unwrap();
        let ordinals: Vec<u32> = parsed.recitals.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2]);
        assert_eq!(parsed.articles.len(), 1);

        // The article body still feeds citation extraction normally.
        let outcome = crate::citations::CitationExtractor::new(&[])
            .extract(&parsed.articles)
            .unwrap();
        assert_eq!(outcome.references.len(), 1);
        assert_eq!(
            outcome.references[0].target_document.as_deref(),
            Some("doc")
        );
        assert_eq!(outcome.references[0].target_article.as_deref(), Some("1"));
    }

    #[test]
    fn test_article_heading_closes_recital_block() {
        // No closing sentinel; the first article header ends the block and
        // flushes the open buffer.
        let text = "\
Whereas:
(1) Only recital.
Article 1
Scope
Body text.
";
        let parsed = parser().parse("doc", text).unwrap();
        assert_eq!(parsed.recitals.len(), 1);
        assert_eq!(parsed.recitals[0].body, "Only recital.");
        assert!(!parsed.articles[0].body.contains("Only recital"));
    }
}
