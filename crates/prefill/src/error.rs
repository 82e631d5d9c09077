//! Error types for prefill.
//!
//! All fallible operations in the library return [`Result`]. The error
//! taxonomy is deliberately small:
//!
//! - `Io` - file system errors, always bubble up unchanged
//! - `Validation` - invalid configuration or parameters, fatal at construction
//! - `Serialization` - JSON/YAML/TOML encode/decode failures
//! - `Oracle` - failures talking to the external extraction oracle
//!
//! Cache lookup misses are never errors. A label or key absent from the
//! cache, a position that falls outside the current matrix, or a heuristic
//! whose type no longer corroborates are all soft misses handled locally by
//! the heuristic cache; the only programmer error it surfaces is an invalid
//! capacity at construction time.
use thiserror::Error;

/// Result type alias using `PrefillError`.
pub type Result<T> = std::result::Result<T, PrefillError>;

/// Main error type for all prefill operations.
#[derive(Debug, Error)]
pub enum PrefillError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Oracle error: {message}")]
    Oracle {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl From<serde_json::Error> for PrefillError {
    fn from(err: serde_json::Error) -> Self {
        PrefillError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl PrefillError {
    /// Create a Validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Validation error with source
    pub fn validation_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Validation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a Serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Serialization error with source
    pub fn serialization_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an Oracle error
    pub fn oracle<S: Into<String>>(message: S) -> Self {
        Self::Oracle {
            message: message.into(),
            source: None,
        }
    }

    /// Create an Oracle error with source
    pub fn oracle_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Oracle {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
