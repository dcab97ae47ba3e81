//! Error types for hypothetical-index command generation.
//!
//! Every fallible operation in this crate returns [`AdvisorError`]. Command
//! generation is pure string construction, so the taxonomy is small: bad
//! statement text, bad identifiers or configuration, and the internal cache
//! invariant that should never break.

use thiserror::Error;

/// The primary error type for command generation.
#[derive(Error, Debug)]
pub enum AdvisorError {
    /// Placeholder normalization could not settle on a consistent marker scheme
    #[error("Malformed statement ({reason}): {statement}")]
    MalformedStatement { statement: String, reason: String },

    /// A statement inside a workload batch failed
    #[error("Workload statement #{index} failed: {source}")]
    Workload {
        index: usize,
        #[source]
        source: Box<AdvisorError>,
    },

    /// The prepared-statement cache is in a contradictory state (a bug)
    #[error("Cache consistency violation: {message}")]
    CacheConsistency { message: String },

    /// Identifier rejected by validation
    #[error("Invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl AdvisorError {
    /// Create a malformed statement error.
    pub fn malformed(statement: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedStatement {
            statement: statement.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error with the position of the offending workload entry.
    pub fn in_workload(index: usize, source: AdvisorError) -> Self {
        Self::Workload {
            index,
            source: Box::new(source),
        }
    }

    /// Create a cache consistency error.
    pub fn cache_consistency(message: impl Into<String>) -> Self {
        Self::CacheConsistency {
            message: message.into(),
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The statement text this error refers to, if any.
    ///
    /// Looks through [`AdvisorError::Workload`] wrappers.
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::MalformedStatement { statement, .. } => Some(statement),
            Self::Workload { source, .. } => source.statement(),
            _ => None,
        }
    }

    /// Position of the failing entry within a workload batch, if known.
    pub fn workload_index(&self) -> Option<usize> {
        match self {
            Self::Workload { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AdvisorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for command generation.
pub type Result<T> = std::result::Result<T, AdvisorError>;
