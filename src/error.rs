//! Centralized error types for mailsexp.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailsexp library.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The expression text could not be parsed.
    #[error("Cannot parse search expression: {reason}:\n{expression}")]
    Parse { expression: String, reason: String },

    /// The expression calls an operator that is not registered.
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    /// A built-in received an operand of the wrong shape.
    #[error("({operator}) {reason}")]
    Type { operator: String, reason: String },

    /// A configuration error that aborts the evaluation (e.g. illegal nesting).
    #[error("Fatal evaluation error: {0}")]
    Fatal(String),

    /// Evaluation failed; wraps the underlying cause with the expression text.
    #[error("Error executing search expression: {source}:\n{expression}")]
    Evaluation {
        expression: String,
        #[source]
        source: Box<SearchError>,
    },

    /// A body-contains clause names more words than the AND mask can hold.
    #[error("Too many words in one search phrase: {0} (at most 32 are supported)")]
    TooManyWords(usize),

    /// A regular expression argument did not compile.
    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    /// The summary database rejected a query.
    #[error("Error during searching {query}: {message}")]
    Store { query: String, message: String },

    /// The folder's table does not exist in the summary database.
    #[error("No such table: {0}")]
    MissingTable(String),

    /// The operation was cancelled before it could start.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// The full message for a uid could not be retrieved.
    #[error("Message not available: {0}")]
    MessageUnavailable(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// The index file is corrupt or was built with an incompatible version.
    #[error("Corrupt or incompatible index for '{path}': {reason}")]
    InvalidIndex { path: PathBuf, reason: String },

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    MimeError(String),
}

/// Convenience alias for `Result<T, SearchError>`.
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The underlying error, looking through `Evaluation` wrappers.
    pub fn root_cause(&self) -> &SearchError {
        match self {
            Self::Evaluation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Create a `Type` variant for the given operator.
    pub fn type_error(operator: &str, reason: impl Into<String>) -> Self {
        Self::Type {
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `SearchError::io`).
impl From<std::io::Error> for SearchError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

/// Queries against a folder that was never synced report "no such table";
/// that case is kept apart so callers can treat it as an empty result.
impl From<(String, rusqlite::Error)> for SearchError {
    fn from((query, e): (String, rusqlite::Error)) -> Self {
        let message = e.to_string();
        if message.starts_with("no such table") {
            Self::MissingTable(message)
        } else {
            Self::Store { query, message }
        }
    }
}
