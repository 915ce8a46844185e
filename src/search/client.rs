use std::path::{Path, PathBuf};
use std::sync::Arc;

use tantivy::TantivyDocument;
use tantivy::collector::TopDocs;

use crate::error::{EngineError, EngineResult};
use crate::search::cache::SearcherCache;
use crate::search::canonicalize::canonical_field_name;
use crate::search::query::{Combine, build};
use crate::search::tantivy::{FILE_KEY_FIELD, FILE_TEXT_FIELD, index_location, stored_text};
use crate::storage::is_plain_identifier;

/// Result cap used when a request asks for fewer than one hit.
pub const DEFAULT_TOP_N: usize = 100;

#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub table: &'a str,
    pub query: &'a str,
    pub fields: &'a [String],
    pub key_field: &'a str,
    pub combine: Combine,
    pub top_n: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SearchHit {
    pub key: String,
    pub score: f32,
}

/// Answers keyword queries against the table indexes under one base
/// directory, through a shared [`SearcherCache`].
pub struct TableSearcher {
    cache: Arc<SearcherCache>,
    index_base: PathBuf,
    default_top_n: usize,
}

impl TableSearcher {
    pub fn new(cache: Arc<SearcherCache>, index_base: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            index_base: index_base.into(),
            default_top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_default_top_n(mut self, top_n: usize) -> Self {
        self.default_top_n = top_n.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<SearcherCache> {
        &self.cache
    }

    pub fn index_base(&self) -> &Path {
        &self.index_base
    }

    /// Ranked key values of the matching documents.
    ///
    /// An empty vector means the index answered and nothing matched; a
    /// missing or unreadable index is [`EngineError::IndexUnavailable`].
    pub fn search(&self, request: &SearchRequest<'_>) -> EngineResult<Vec<String>> {
        Ok(self
            .search_hits(request)?
            .into_iter()
            .map(|hit| hit.key)
            .collect())
    }

    /// Like [`search`](Self::search), keeping scores.
    pub fn search_hits(&self, request: &SearchRequest<'_>) -> EngineResult<Vec<SearchHit>> {
        validate(request)?;
        let query = build(request.query, request.fields, request.combine)?;

        let location = index_location(&self.index_base, request.table);
        let snapshot = self.cache.get(&location)?;
        let engine_query = query.lower(&snapshot)?;

        let key_name = canonical_field_name(request.key_field);
        let key_field = snapshot.schema().get_field(&key_name).map_err(|_| {
            EngineError::invalid(format!("index has no key field {key_name:?}"))
        })?;

        let top_n = if request.top_n < 1 {
            self.default_top_n
        } else {
            request.top_n
        };
        tracing::info!(
            table = request.table,
            query = query.text(),
            combine = ?request.combine,
            top_n = top_n,
            generation = snapshot.generation(),
            "search_start"
        );

        let search_err = |e| EngineError::Search {
            location: location.clone(),
            source: e,
        };
        let searcher = snapshot.searcher();
        let top_docs = searcher
            .search(&engine_query, &TopDocs::with_limit(top_n))
            .map_err(search_err)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(search_err)?;
            match stored_text(&doc, key_field) {
                Some(key) => hits.push(SearchHit { key, score }),
                None => tracing::warn!(table = request.table, ?addr, "hit without stored key"),
            }
        }
        tracing::debug!(table = request.table, hits = hits.len(), "search_done");
        Ok(hits)
    }

    /// Search a file index built by `FileIndexer`; returns file paths.
    pub fn search_files(&self, name: &str, query: &str, top_n: usize) -> EngineResult<Vec<String>> {
        let fields = [FILE_TEXT_FIELD.to_string()];
        self.search(&SearchRequest {
            table: name,
            query,
            fields: &fields,
            key_field: FILE_KEY_FIELD,
            combine: Combine::Any,
            top_n,
        })
    }
}

fn validate(request: &SearchRequest<'_>) -> EngineResult<()> {
    if request.table.trim().is_empty() {
        return Err(EngineError::invalid("table is empty"));
    }
    // Index names map to directories under the base; keep them there.
    if !is_plain_identifier(request.table.trim()) {
        return Err(EngineError::invalid(format!(
            "{:?} is not a plain index name",
            request.table
        )));
    }
    if request.query.trim().is_empty() {
        return Err(EngineError::invalid("query is empty"));
    }
    if request.key_field.trim().is_empty() {
        return Err(EngineError::invalid("key field is empty"));
    }
    if request.fields.iter().all(|f| f.trim().is_empty()) {
        return Err(EngineError::invalid("no fields given"));
    }
    Ok(())
}
