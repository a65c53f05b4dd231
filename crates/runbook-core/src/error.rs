//! Error types for the runbook library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which budget a [`RunbookError::BudgetExceeded`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetScope {
    /// The recovery loop of a step ran past its recovery timeout
    Recovery,
    /// The plan ran past its total-time budget
    Plan,
}

impl fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetScope::Recovery => write!(f, "recovery"),
            BudgetScope::Plan => write!(f, "plan"),
        }
    }
}

/// Comprehensive error type for all runbook operations.
#[derive(Error, Debug)]
pub enum RunbookError {
    /// Malformed plan, step or criterion definition
    #[error("Configuration error: {message}")]
    Configuration { message: String },
    /// A criterion or alternative trigger carries a regex that does not compile
    #[error("Invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// Invalid input validation errors
    #[error("Invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },
    /// The command channel itself is unusable (distinct from a non-zero exit)
    #[error("Transport error: {message}")]
    Transport { message: String },
    /// A time budget was exhausted
    #[error("{scope} budget of {limit_secs}s exceeded")]
    BudgetExceeded { scope: BudgetScope, limit_secs: u64 },
    /// Database connection or query errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: rusqlite::Error,
    },
    /// Stored run not found for the given ID
    #[error("Run with ID {id} not found")]
    RunNotFound { id: u64 },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// XDG directory specification errors
    #[error("XDG directory error: {0}")]
    XdgDirectory(String),
    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

/// Builder for creating database errors with optional context.
pub struct DatabaseErrorBuilder {
    message: String,
}

impl DatabaseErrorBuilder {
    /// Create a new database error builder with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build the error with the given source.
    pub fn with_source(self, source: rusqlite::Error) -> RunbookError {
        RunbookError::Database {
            message: self.message,
            source,
        }
    }
}

/// Builder for creating input validation errors.
pub struct InvalidInputBuilder {
    field: String,
}

impl InvalidInputBuilder {
    /// Create a new invalid input error builder for a field.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Build the error with the given reason.
    pub fn with_reason(self, reason: impl Into<String>) -> RunbookError {
        RunbookError::InvalidInput {
            field: self.field,
            reason: reason.into(),
        }
    }
}

impl RunbookError {
    /// Creates a builder for database errors.
    pub fn database(message: impl Into<String>) -> DatabaseErrorBuilder {
        DatabaseErrorBuilder::new(message)
    }

    /// Creates a builder for input validation errors.
    pub fn invalid_input(field: impl Into<String>) -> InvalidInputBuilder {
        InvalidInputBuilder::new(field)
    }

    /// Shorthand for a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Configuration errors are fatal and must never be retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::InvalidRegex { .. } | Self::InvalidInput { .. }
        )
    }
}

/// Extension trait for Result to provide concise error mapping with
/// anyhow-style context.
pub trait ResultExt<T, E> {
    /// Add context to any error type, converting to RunbookError.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static;
}

/// Specialized extension trait for database-related Results.
pub trait DatabaseResultExt<T> {
    /// Map database errors with a message.
    fn db_context(self, message: &str) -> Result<T>;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| RunbookError::Configuration {
            message: format!("{}: {}", context, e),
        })
    }
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context(self, message: &str) -> Result<T> {
        self.map_err(|e| RunbookError::database(message).with_source(e))
    }
}

/// Result type alias for runbook operations
pub type Result<T> = std::result::Result<T, RunbookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_classified() {
        let err = RunbookError::invalid_input("timeout_secs").with_reason("must be positive");
        assert!(err.is_configuration());
        assert!(!RunbookError::transport("connection reset").is_configuration());
        assert_eq!(
            err.to_string(),
            "Invalid input for field 'timeout_secs': must be positive"
        );
    }

    #[test]
    fn test_budget_message() {
        let err = RunbookError::BudgetExceeded {
            scope: BudgetScope::Plan,
            limit_secs: 10,
        };
        assert_eq!(err.to_string(), "plan budget of 10s exceeded");
    }

    #[test]
    fn test_transport_error() {
        let err = RunbookError::transport("ssh exited with status 255");
        assert!(matches!(err, RunbookError::Transport { .. }));
        assert!(err.to_string().contains("ssh exited"));
    }
}
