//! Search layer facade.
//!
//! - **[`query`]**: Normalizes user text and field lists and lowers them to tantivy term queries.
//! - **[`tantivy`]**: Schemas, index locations, version checks and writer setup.
//! - **[`cache`]**: Per-index searcher cache that reopens only when the index changed on disk.
//! - **[`client`]**: Table and file search entry points returning ranked keys.
//! - **[`canonicalize`]**: Query text cleanup and markup-to-text conversion.

pub mod cache;
pub mod canonicalize;
pub mod client;
pub mod query;
pub mod tantivy;

pub use cache::{SearcherCache, SearcherHandle, SearcherSnapshot};
pub use client::{DEFAULT_TOP_N, SearchHit, SearchRequest, TableSearcher};
pub use query::{Combine, StructuredQuery};
