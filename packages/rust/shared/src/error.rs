//! Error types for bookmark-reorg.
//!
//! Library crates use [`ReorgError`] via `thiserror` for failures that abort a
//! run. Failures that are recovered locally get their own types:
//! [`FetchError`] per record, [`LlmError`] and [`SchemaValidationError`] per batch.
//! The CLI wraps everything with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for fatal bookmark-reorg failures.
#[derive(Debug, thiserror::Error)]
pub enum ReorgError {
    /// Missing or corrupt persisted record collection.
    #[error("store error at {path:?}: {message}")]
    Store { path: PathBuf, message: String },

    /// Illegal combination of mode and flags.
    #[error("conflicting options: {0}")]
    ConfigConflict(String),

    /// A stage was requested whose preconditions are unmet.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A strict run produced a non-empty validation report.
    #[error("validation failed with {0} violation(s)")]
    ValidationFailed(usize),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Bookmark export parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// HTTP client construction or transport setup error.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReorgError>;

impl ReorgError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a store error for the artifact at `path`.
    pub fn store(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Store {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a precondition error from any displayable message.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a mode/flag conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConfigConflict(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-record fetch failures
// ---------------------------------------------------------------------------

/// Why a page's metadata could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The request did not complete in time.
    #[error("{url}: timed out")]
    Timeout { url: String },

    /// DNS, connect, TLS or body read failure.
    #[error("{url}: {message}")]
    Network { url: String, message: String },

    /// The response was not an HTML document.
    #[error("{url}: not an HTML page (content-type: {content_type})")]
    NotHtml { url: String, content_type: String },

    /// The bookmark URL cannot be requested over HTTP.
    #[error("{url}: invalid URL")]
    InvalidUrl { url: String },
}

impl FetchError {
    /// Status code carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 401, 403 and 407 responses, which earn one retry against the domain root.
    pub fn is_access_denied(&self) -> bool {
        matches!(self.status(), Some(401 | 403 | 407))
    }
}

// ---------------------------------------------------------------------------
// Per-batch LLM failures
// ---------------------------------------------------------------------------

/// Transport-level failure talking to the LLM provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// The requested model does not exist or is not enabled for the key.
    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// The model only accepts its default sampling temperature.
    #[error("model rejects a custom temperature")]
    UnsupportedTemperature,

    /// Non-success HTTP status from the provider.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection, timeout or body decoding failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider answered without any message content.
    #[error("response contained no message content")]
    EmptyResponse,
}

/// The LLM answered, but not with what the categorization schema expects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaValidationError {
    /// The content is not JSON at all.
    #[error("response is not valid JSON: {0}")]
    Unparsable(String),

    /// The JSON root is not an array.
    #[error("response root is not a list")]
    NotAList,

    /// An entry lacks a required field or has the wrong type.
    #[error("entry {position} is malformed: {reason}")]
    MalformedEntry { position: usize, reason: String },

    /// An entry's location has no folder names.
    #[error("entry for index {index} has an empty location_after")]
    EmptyLocation { index: usize },

    /// No entry for an input record of the batch.
    #[error("no entry for index {index}")]
    MissingEntry { index: usize },

    /// Two entries for the same input record.
    #[error("duplicate entries for index {index}")]
    DuplicateEntry { index: usize },

    /// An entry for a record outside the batch.
    #[error("entry for index {index} does not belong to this batch")]
    UnexpectedEntry { index: usize },
}
