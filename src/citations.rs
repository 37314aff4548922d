//! # Citation Extractor Module
//!
//! ## Purpose
//! Scans parsed articles for references to other articles and documents,
//! building the corpus reference graph.
//!
//! ## Input/Output Specification
//! - **Input**: One ingestion batch's parsed articles, injected designation table
//! - **Output**: Reference records plus a dropped-match count
//! - **Ordering**: Patterns run most specific to least; first match per span wins
//!
//! ## Key Features
//! - Fully-qualified, short-form, and self-reference citation patterns
//! - Designation → document-id resolution via an injected lookup table
//! - Unresolved designations kept with a null target, never silently dropped
//! - Unparseable embedded numbers dropped and counted, never fatal

use crate::config::KnownDocument;
use crate::errors::Result;
use crate::utils::TextUtils;
use crate::{Article, Reference, ReferenceKind};
use regex::Regex;
use std::collections::HashMap;

/// Characters of preceding context inspected for override phrasing.
const OVERRIDE_CONTEXT_CHARS: usize = 48;

/// Phrases marking a citation as an override relation rather than a plain
/// reference.
const OVERRIDE_PHRASES: &[&str] = &["by way of derogation from", "notwithstanding"];

/// Result of one extraction run over a parsed batch.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub references: Vec<Reference>,
    /// Pattern matches discarded because an embedded number failed to parse.
    /// Reported to the caller as run metadata; extraction never aborts.
    pub dropped: usize,
}

/// Extracts citation edges from parsed article bodies.
///
/// The designation table is injected per instance so tests and callers can
/// swap or extend it without global mutation.
pub struct CitationExtractor {
    /// Normalized official designation → document id
    designations: HashMap<String, String>,
    /// Normalized display-name alias → document id
    aliases: HashMap<String, String>,
    fully_qualified: Regex,
    short_form: Option<Regex>,
    self_reference: Regex,
}

impl CitationExtractor {
    pub fn new(known: &[KnownDocument]) -> Self {
        let mut designations = HashMap::new();
        let mut aliases = HashMap::new();
        for doc in known {
            designations.insert(normalize_designation(&doc.designation), doc.id.clone());
            for alias in &doc.aliases {
                aliases.insert(alias.to_lowercase(), doc.id.clone());
            }
            aliases.insert(doc.name.to_lowercase(), doc.id.clone());
        }

        let article_locator = r"\d+[a-z]{0,2}(?:\(\d+\))*(?:\([a-z]\))*";

        let fully_qualified = Regex::new(&format!(
            r"(?:Article\s+(?P<art>{article_locator})\s+of\s+)?(?:the\s+)?(?P<desig>(?:Regulation|Directive|Decision)\s+\((?:EU|EC|EEC)\)\s+(?:No\s+)?\d+/\d+|Directive\s+\d+/\d+/(?:EU|EC|EEC))"
        ))
        .expect("fully-qualified citation pattern");

        // Built from the injected display names; absent any known document
        // the short-form pass is skipped entirely.
        let short_form = if aliases.is_empty() {
            None
        } else {
            let mut names: Vec<String> = aliases.keys().map(|a| regex::escape(a)).collect();
            // Longest alias first so "NIS 2 Directive" beats "NIS 2".
            names.sort_by_key(|n| std::cmp::Reverse(n.len()));
            let alternation = names.join("|");
            Some(
                Regex::new(&format!(
                    r"(?i)(?:Article\s+(?P<art>{article_locator})\s+of\s+)?(?:the\s+)?(?P<name>{alternation})\b"
                ))
                .expect("short-form citation pattern"),
            )
        };

        let self_reference = Regex::new(&format!(
            r"Article\s+(?P<art>{article_locator})(?:\s+of\s+this\s+(?:Regulation|Directive))?"
        ))
        .expect("self-reference citation pattern");

        Self {
            designations,
            aliases,
            fully_qualified,
            short_form,
            self_reference,
        }
    }

    /// Extract references from every article of one parsed batch.
    ///
    /// Every reference source is a real `(document, article)` by
    /// construction: only parsed articles are scanned.
    pub fn extract(&self, articles: &[Article]) -> Result<ExtractionOutcome> {
        let mut outcome = ExtractionOutcome::default();
        for article in articles {
            self.extract_from_article(article, &mut outcome);
        }
        if outcome.dropped > 0 {
            tracing::warn!(
                dropped = outcome.dropped,
                "citation matches dropped due to unparseable embedded numbers"
            );
        }
        Ok(outcome)
    }

    fn extract_from_article(&self, article: &Article, outcome: &mut ExtractionOutcome) {
        let body = &article.body;
        // Byte ranges already claimed by a more specific pattern; spans are
        // never double-counted.
        let mut claimed: Vec<(usize, usize)> = Vec::new();

        for caps in self.fully_qualified.captures_iter(body) {
            let whole = caps.get(0).expect("match group 0");
            let target_article = match parse_optional_locator(caps.name("art")) {
                Ok(locator) => locator,
                Err(()) => {
                    outcome.dropped += 1;
                    claimed.push((whole.start(), whole.end()));
                    continue;
                }
            };
            let designation = normalize_designation(&caps["desig"]);
            let target_document = self.designations.get(&designation).cloned();
            claimed.push((whole.start(), whole.end()));
            outcome.references.push(Reference {
                source_document: article.document_id.clone(),
                source_article: article.number.clone(),
                target_document,
                target_article,
                raw_text: whole.as_str().to_string(),
                kind: classify(body, whole.start(), ReferenceKind::CrossDocument),
            });
        }

        if let Some(short_form) = &self.short_form {
            for caps in short_form.captures_iter(body) {
                let whole = caps.get(0).expect("match group 0");
                if overlaps(&claimed, whole.start(), whole.end()) {
                    continue;
                }
                let target_article = match parse_optional_locator(caps.name("art")) {
                    Ok(locator) => locator,
                    Err(()) => {
                        outcome.dropped += 1;
                        claimed.push((whole.start(), whole.end()));
                        continue;
                    }
                };
                let name = caps["name"].to_lowercase();
                let Some(target) = self.aliases.get(&name) else {
                    continue;
                };
                claimed.push((whole.start(), whole.end()));
                outcome.references.push(Reference {
                    source_document: article.document_id.clone(),
                    source_article: article.number.clone(),
                    target_document: Some(target.clone()),
                    target_article,
                    raw_text: whole.as_str().to_string(),
                    kind: classify(body, whole.start(), ReferenceKind::CrossDocument),
                });
            }
        }

        for caps in self.self_reference.captures_iter(body) {
            let whole = caps.get(0).expect("match group 0");
            if overlaps(&claimed, whole.start(), whole.end()) {
                continue;
            }
            let locator = match parse_locator(&caps["art"]) {
                Some(locator) => locator,
                None => {
                    outcome.dropped += 1;
                    claimed.push((whole.start(), whole.end()));
                    continue;
                }
            };
            claimed.push((whole.start(), whole.end()));
            outcome.references.push(Reference {
                source_document: article.document_id.clone(),
                source_article: article.number.clone(),
                target_document: Some(article.document_id.clone()),
                target_article: Some(locator),
                raw_text: whole.as_str().to_string(),
                kind: classify(body, whole.start(), ReferenceKind::SelfReference),
            });
        }
    }
}

/// Collapse whitespace and case so designation lookup tolerates formatting.
fn normalize_designation(designation: &str) -> String {
    TextUtils::normalize_whitespace(designation).to_lowercase()
}

fn overlaps(claimed: &[(usize, usize)], start: usize, end: usize) -> bool {
    claimed.iter().any(|&(s, e)| start < e && end > s)
}

/// Validate the leading integer of an article locator. Locators are kept as
/// verbatim strings, but a leading part that cannot even parse as a number
/// marks the whole match as garbage.
fn parse_locator(raw: &str) -> Option<String> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u32>().ok()?;
    Some(raw.to_string())
}

fn parse_optional_locator(group: Option<regex::Match<'_>>) -> std::result::Result<Option<String>, ()> {
    match group {
        None => Ok(None),
        Some(m) => parse_locator(m.as_str()).map(Some).ok_or(()),
    }
}

/// Upgrade the base classification to `Override` when the preceding context
/// carries derogation phrasing.
fn classify(body: &str, match_start: usize, base: ReferenceKind) -> ReferenceKind {
    let prefix = &body[..match_start];
    let context_start = prefix
        .char_indices()
        .rev()
        .nth(OVERRIDE_CONTEXT_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let context = prefix[context_start..].to_lowercase();
    if OVERRIDE_PHRASES.iter().any(|p| context.contains(p)) {
        ReferenceKind::Override
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known_documents() -> Vec<KnownDocument> {
        vec![
            KnownDocument {
                id: "gdpr".to_string(),
                name: "General Data Protection Regulation".to_string(),
                designation: "Regulation (EU) 2016/679".to_string(),
                aliases: vec!["GDPR".to_string()],
            },
            KnownDocument {
                id: "nis2".to_string(),
                name: "NIS 2 Directive".to_string(),
                designation: "Directive (EU) 2022/2555".to_string(),
                aliases: vec![],
            },
        ]
    }

    fn article(body: &str) -> Article {
        Article {
            document_id: "dora".to_string(),
            number: "1".to_string(),
            title: "Scope".to_string(),
            body: body.to_string(),
            chapter: None,
        }
    }

    fn extract(body: &str) -> ExtractionOutcome {
        CitationExtractor::new(&known_documents())
            .extract(&[article(body)])
            .unwrap()
    }

    #[test]
    fn test_self_reference() {
        let outcome = extract("Body referencing Article 5 of this Regulation.");
        assert_eq!(outcome.references.len(), 1);
        let r = &outcome.references[0];
        assert_eq!(r.kind, ReferenceKind::SelfReference);
        assert_eq!(r.source_article, "1");
        assert_eq!(r.target_document.as_deref(), Some("dora"));
        assert_eq!(r.target_article.as_deref(), Some("5"));
    }

    #[test]
    fn test_fully_qualified_resolves_via_table() {
        let outcome =
            extract("Processing is governed by Article 6 of Regulation (EU) 2016/679 as well.");
        assert_eq!(outcome.references.len(), 1);
        let r = &outcome.references[0];
        assert_eq!(r.kind, ReferenceKind::CrossDocument);
        assert_eq!(r.target_document.as_deref(), Some("gdpr"));
        assert_eq!(r.target_article.as_deref(), Some("6"));
        assert!(r.raw_text.contains("Regulation (EU) 2016/679"));
    }

    #[test]
    fn test_unresolved_designation_kept_with_null_target() {
        let outcome = extract("See Regulation (EU) 2099/9999 for details.");
        assert_eq!(outcome.references.len(), 1);
        let r = &outcome.references[0];
        assert_eq!(r.target_document, None);
        assert_eq!(r.raw_text, "Regulation (EU) 2099/9999");
    }

    #[test]
    fn test_short_form_by_display_name() {
        let outcome = extract("Obligations under Article 33 of the GDPR apply.");
        assert_eq!(outcome.references.len(), 1);
        let r = &outcome.references[0];
        assert_eq!(r.target_document.as_deref(), Some("gdpr"));
        assert_eq!(r.target_article.as_deref(), Some("33"));
        assert_eq!(r.kind, ReferenceKind::CrossDocument);
    }

    #[test]
    fn test_spans_never_double_counted() {
        // The "Article 6" prefix inside the fully-qualified match must not
        // also surface as a self-reference.
        let outcome = extract("Under Article 6 of Regulation (EU) 2016/679 only.");
        assert_eq!(outcome.references.len(), 1);
        assert_eq!(outcome.references[0].kind, ReferenceKind::CrossDocument);
    }

    #[test]
    fn test_override_classification() {
        let outcome = extract("By way of derogation from Article 9, processing is allowed.");
        assert_eq!(outcome.references.len(), 1);
        assert_eq!(outcome.references[0].kind, ReferenceKind::Override);
    }

    #[test]
    fn test_unparseable_number_dropped_and_counted() {
        let outcome = extract("See Article 99999999999999 for nothing.");
        assert!(outcome.references.is_empty());
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn test_subsection_locators_kept_verbatim() {
        let outcome = extract("As required by Article 5(1)(a) of this Regulation.");
        assert_eq!(outcome.references.len(), 1);
        assert_eq!(outcome.references[0].target_article.as_deref(), Some("5(1)(a)"));
    }

    #[test]
    fn test_empty_table_still_extracts_self_references() {
        let extractor = CitationExtractor::new(&[]);
        let outcome = extractor
            .extract(&[article("Refer to Article 3 of this Regulation.")])
            .unwrap();
        assert_eq!(outcome.references.len(), 1);
        assert_eq!(outcome.references[0].kind, ReferenceKind::SelfReference);
    }
}
