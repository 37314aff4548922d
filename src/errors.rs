//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the regulatory corpus engine, providing one
//! structured error taxonomy shared by the parser, store, retrieval, and
//! throttle layers.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from various system components
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Parsing, Ingestion, Store, Retrieval, Throttle, Configuration
//!
//! ## Key Features
//! - `StructuralParse` is fatal only to the ingestion run that raised it
//! - `Unavailable` marks store connection/timeout failures as retryable
//! - `QueryFault` marks internally malformed queries as programming errors
//! - "Not found" is never an error: lookups return `Option`, not `Err`
//! - Structured logging integration via `category()`

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, CorpusError>;

/// Error taxonomy for the regulatory corpus engine
#[derive(Debug, Error)]
pub enum CorpusError {
    /// No article boundary was found in the raw text: the input is not a
    /// real document (e.g. an access-denial page served instead of content).
    #[error("no article boundaries found in '{document}': {details}")]
    StructuralParse { document: String, details: String },

    /// The external source could not deliver raw text. Retryable by rerun,
    /// distinct from a structural parse failure.
    #[error("source for '{document}' is unavailable: {details}")]
    SourceUnavailable { document: String, details: String },

    /// Store unreachable or a query timed out. Retryable by the caller.
    #[error("corpus store unavailable: {details}")]
    Unavailable { details: String },

    /// An internally constructed query was malformed. A programming error:
    /// all user input is parameter-bound and can never trigger this.
    #[error("malformed store query: {details}")]
    QueryFault { details: String },

    /// Throttle rejected the request. Carries remaining quota and the number
    /// of seconds until the fixed window resets.
    #[error("rate limit exceeded for '{client}', retry in {reset_after_seconds}s")]
    RateLimited {
        client: String,
        remaining: u32,
        reset_after_seconds: u64,
    },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Internal system errors
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CorpusError {
    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CorpusError::SourceUnavailable { .. }
                | CorpusError::Unavailable { .. }
                | CorpusError::RateLimited { .. }
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            CorpusError::StructuralParse { .. } => "parsing",
            CorpusError::SourceUnavailable { .. } => "ingestion",
            CorpusError::Unavailable { .. } | CorpusError::QueryFault { .. } => "store",
            CorpusError::RateLimited { .. } => "throttle",
            CorpusError::Config { .. } | CorpusError::Toml(_) => "configuration",
            CorpusError::Internal { .. } | CorpusError::Io(_) | CorpusError::Json(_) => "generic",
        }
    }
}

// Driver error conversions. Connection-level failures become `Unavailable`;
// everything else at the driver boundary means we built a bad statement,
// which is `QueryFault` by construction.

impl From<rusqlite::Error> for CorpusError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                ) =>
            {
                CorpusError::Unavailable {
                    details: err.to_string(),
                }
            }
            _ => CorpusError::QueryFault {
                details: err.to_string(),
            },
        }
    }
}

impl From<tokio_postgres::Error> for CorpusError {
    fn from(err: tokio_postgres::Error) -> Self {
        // An error without an SQLSTATE is a transport-level failure.
        if err.code().is_none() {
            CorpusError::Unavailable {
                details: err.to_string(),
            }
        } else {
            CorpusError::QueryFault {
                details: err.to_string(),
            }
        }
    }
}

impl From<deadpool_postgres::PoolError> for CorpusError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        CorpusError::Unavailable {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let unavailable = CorpusError::Unavailable {
            details: "connection refused".to_string(),
        };
        assert!(unavailable.is_recoverable());

        let fault = CorpusError::QueryFault {
            details: "syntax error".to_string(),
        };
        assert!(!fault.is_recoverable());

        let parse = CorpusError::StructuralParse {
            document: "gdpr".to_string(),
            details: "no article headers".to_string(),
        };
        assert!(!parse.is_recoverable());
    }

    #[test]
    fn test_categories() {
        let limited = CorpusError::RateLimited {
            client: "c1".to_string(),
            remaining: 0,
            reset_after_seconds: 42,
        };
        assert_eq!(limited.category(), "throttle");
        assert_eq!(
            CorpusError::Config {
                message: "bad".to_string()
            }
            .category(),
            "configuration"
        );
    }
}
