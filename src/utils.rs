//! # Utilities Module
//!
//! ## Purpose
//! Common text and timing helpers shared by the parser, retrieval engine,
//! and ingestion pipeline.
//!
//! ## Input/Output Specification
//! - **Input**: Raw text fragments, operation names
//! - **Output**: Normalized text, timing logs
//! - **Functions**: Text utilities, performance helpers

use std::time::Instant;

/// Performance timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    /// Start a new timer with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("Timer '{}' completed in {}ms", self.name, elapsed);
        elapsed
    }
}

/// Text processing utilities
pub struct TextUtils;

impl TextUtils {
    /// Truncate text to specified length with ellipsis, on a char boundary
    pub fn truncate(text: &str, max_length: usize) -> String {
        if text.chars().count() <= max_length {
            return text.to_string();
        }
        let cut: String = text.chars().take(max_length.saturating_sub(3)).collect();
        format!("{}...", cut.trim_end())
    }

    /// Collapse runs of whitespace into single spaces and trim
    pub fn normalize_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Reduce a raw query token to its alphanumeric core, lowercased.
    /// Returns `None` when nothing survives (pure punctuation).
    pub fn sanitize_token(raw: &str) -> Option<String> {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(|c| c.to_lowercase())
            .collect();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_truncate() {
        assert_eq!(TextUtils::truncate("Hello world", 20), "Hello world");
        assert_eq!(
            TextUtils::truncate("This is a very long text", 10),
            "This is..."
        );
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            TextUtils::normalize_whitespace("  a\tb \n c  "),
            "a b c"
        );
    }

    #[test]
    fn test_sanitize_token() {
        assert_eq!(TextUtils::sanitize_token("Breach,"), Some("breach".to_string()));
        assert_eq!(TextUtils::sanitize_token("'--;"), None);
        assert_eq!(
            TextUtils::sanitize_token("Article5(1)"),
            Some("article51".to_string())
        );
    }
}
