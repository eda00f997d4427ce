//! Error types for feed ingestion and calendar persistence.
//!
//! Two families live here:
//! - [`ExtractError`]: per-entry failures raised by the extractor. These are
//!   never fatal; the offending entry is skipped and extraction continues.
//! - [`FeedError`]: failures of the collaborators around the core (fetching,
//!   feed parsing, reading and writing the calendar, configuration).

use thiserror::Error;

/// Why a single feed entry could not be turned into an [`Event`](crate::models::Event).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Malformed entry: title is empty")]
    MalformedEntry,

    #[error("Unparseable timestamp for '{title}': {raw:?}")]
    UnparseableTimestamp { title: String, raw: Option<String> },
}

/// Errors raised by the I/O layer surrounding the extractor and merge engine.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed XML error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<quick_xml::DeError> for FeedError {
    fn from(e: quick_xml::DeError) -> Self {
        FeedError::Xml(e.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for FeedError {
    fn from(e: serde_yaml::Error) -> Self {
        FeedError::Config(e.to_string())
    }
}

/// Result type alias for collaborator operations.
pub type FeedResult<T> = Result<T, FeedError>;
