//! Error kinds surfaced by the indexing and search core.
//!
//! Every public operation returns [`EngineResult`]. The variants are kept
//! distinct on purpose so that a caller can tell "the index is not there"
//! apart from "the index is there and nothing matched" (an empty result
//! vector).

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::RowSourceError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A required argument was blank, or an identifier was not usable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The index could not be opened or reopened.
    #[error("index unavailable at {}: {source}", location.display())]
    IndexUnavailable {
        location: PathBuf,
        #[source]
        source: tantivy::TantivyError,
    },

    /// The query normalized to nothing, or named nothing searchable.
    #[error("query parse error: {0}")]
    QueryParse(String),

    /// Reading a page from the external row source failed.
    #[error("row source failed for table {table}: {source}")]
    RowSource {
        table: String,
        #[source]
        source: RowSourceError,
    },

    /// Writing, committing or merging the index failed.
    #[error("index write failed at {}: {source}", location.display())]
    Write {
        location: PathBuf,
        #[source]
        source: tantivy::TantivyError,
    },

    /// A single row could not be turned into a document.
    #[error("row {} rejected: {reason}", key.as_deref().unwrap_or("<null key>"))]
    RowRejected { key: Option<String>, reason: String },

    /// Executing a query against an open snapshot failed.
    #[error("search failed at {}: {source}", location.display())]
    Search {
        location: PathBuf,
        #[source]
        source: tantivy::TantivyError,
    },
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub(crate) fn unavailable(location: impl Into<PathBuf>, source: tantivy::TantivyError) -> Self {
        EngineError::IndexUnavailable {
            location: location.into(),
            source,
        }
    }

    pub(crate) fn write(location: impl Into<PathBuf>, source: tantivy::TantivyError) -> Self {
        EngineError::Write {
            location: location.into(),
            source,
        }
    }

    /// True when the failure means "no index to ask", as opposed to a bad
    /// request or a broken run.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::IndexUnavailable { .. })
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
