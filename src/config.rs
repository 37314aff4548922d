//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration management for the regulatory corpus engine,
//! loaded from TOML files with validation and type-safe access to all system
//! settings.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files (TOML)
//! - **Output**: Validated configuration structs with defaults
//! - **Validation**: Range checks, backend-specific requirements
//!
//! ## Key Features
//! - Per-section structs mirroring the module layout
//! - Store backend selection (embedded SQLite or networked Postgres)
//! - Known-document registry feeding the citation designation table
//!
//! ## Usage
//! ```rust,no_run
//! use regulatory_corpus_search::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap();
//! println!("Query timeout: {}s", config.store.query_timeout_seconds);
//! ```

use crate::errors::{CorpusError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Corpus store settings
    pub store: StoreConfig,
    /// Retrieval engine behavior
    pub search: SearchConfig,
    /// Request throttle settings
    pub throttle: ThrottleConfig,
    /// Ingestion settings and known-document registry
    pub ingestion: IngestionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Corpus store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Active backend
    pub backend: StoreBackend,
    /// Per-query timeout in seconds; a timeout surfaces as `Unavailable`
    pub query_timeout_seconds: u64,
}

/// Store backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreBackend {
    /// Embedded single-file index (SQLite + FTS5)
    Sqlite {
        /// Database file path
        path: PathBuf,
        /// Number of read-only connections for concurrent readers
        read_pool_size: usize,
    },
    /// Networked relational engine (Postgres)
    Postgres {
        /// Connection string, e.g. `host=localhost user=corpus dbname=corpus`
        url: String,
        /// Maximum pooled connections
        pool_size: usize,
    },
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Sqlite {
            path: PathBuf::from("corpus.db"),
            read_pool_size: 4,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            query_timeout_seconds: 5,
        }
    }
}

/// Retrieval engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result count used when the caller passes no limit
    pub default_limit: usize,
    /// Characters of body text used for snippet fallbacks
    pub snippet_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            snippet_length: 200,
        }
    }
}

/// Request throttle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Admitted requests per window per client
    pub limit: u32,
    /// Fixed window length in seconds
    pub window_seconds: u64,
    /// Interval between eviction sweeps when the sweeper task is running
    pub sweep_interval_seconds: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: 60,
            window_seconds: 60,
            sweep_interval_seconds: 300,
        }
    }
}

/// A regulatory instrument the engine knows how to resolve citations to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownDocument {
    /// Stable corpus identifier, e.g. `"gdpr"`
    pub id: String,
    /// Canonical display name
    pub name: String,
    /// Official designation as cited in other instruments,
    /// e.g. `"Regulation (EU) 2016/679"`
    pub designation: String,
    /// Short display names used by short-form citations, e.g. `"GDPR"`
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Registry of known documents; feeds the citation designation table
    pub documents: Vec<KnownDocument>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter, e.g. `"info"`, `"debug"`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.store.query_timeout_seconds == 0 {
            return Err(CorpusError::Config {
                message: "store.query_timeout_seconds must be at least 1".to_string(),
            });
        }
        match &self.store.backend {
            StoreBackend::Sqlite { read_pool_size, .. } => {
                if *read_pool_size == 0 {
                    return Err(CorpusError::Config {
                        message: "store.backend.read_pool_size must be at least 1".to_string(),
                    });
                }
            }
            StoreBackend::Postgres { pool_size, url } => {
                if *pool_size == 0 {
                    return Err(CorpusError::Config {
                        message: "store.backend.pool_size must be at least 1".to_string(),
                    });
                }
                if url.trim().is_empty() {
                    return Err(CorpusError::Config {
                        message: "store.backend.url must not be empty".to_string(),
                    });
                }
            }
        }
        if self.search.default_limit == 0 {
            return Err(CorpusError::Config {
                message: "search.default_limit must be at least 1".to_string(),
            });
        }
        if self.throttle.limit == 0 || self.throttle.window_seconds == 0 {
            return Err(CorpusError::Config {
                message: "throttle.limit and throttle.window_seconds must be at least 1"
                    .to_string(),
            });
        }
        for doc in &self.ingestion.documents {
            if doc.id.trim().is_empty() || doc.designation.trim().is_empty() {
                return Err(CorpusError::Config {
                    message: format!("known document '{}' has empty id or designation", doc.name),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.store.query_timeout_seconds, 5);
    }

    #[test]
    fn test_parse_postgres_backend() {
        let toml = r#"
            [store]
            query_timeout_seconds = 3

            [store.backend]
            kind = "postgres"
            url = "host=localhost user=corpus dbname=corpus"
            pool_size = 8
        "#;
        let config = Config::from_str(toml).unwrap();
        match config.store.backend {
            StoreBackend::Postgres { pool_size, .. } => assert_eq!(pool_size, 8),
            _ => panic!("expected postgres backend"),
        }
    }

    #[test]
    fn test_known_documents() {
        let toml = r#"
            [[ingestion.documents]]
            id = "gdpr"
            name = "General Data Protection Regulation"
            designation = "Regulation (EU) 2016/679"
            aliases = ["GDPR"]
        "#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.ingestion.documents.len(), 1);
        assert_eq!(config.ingestion.documents[0].id, "gdpr");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let toml = r#"
            [store]
            query_timeout_seconds = 0
        "#;
        assert!(Config::from_str(toml).is_err());
    }
}
