//! Cursor-driven bulk indexing of a table.
//!
//! Rows are read in pages ordered by the key column. Each page asks for one
//! row more than it will index; that lookahead row tells whether another page
//! exists and supplies the key the next page starts at. Every page is
//! committed when it completes, so a run that fails part way leaves the
//! earlier pages searchable and can be resumed with `start_key`.
//!
//! Paging is only gap-free and duplicate-free when the key column is unique
//! and the table is not modified while the run is in progress. Rows with a
//! NULL key cannot be paged to or addressed; they are counted up front and
//! either abort the run or are reported as skipped.

pub mod files;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tantivy::{IndexWriter, TantivyDocument, Term};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::extract::{HtmlTextExtractor, TextExtractor};
use crate::search::tantivy::{
    MIN_WRITER_HEAP_BYTES, TableFields, WriteMode, build_table_schema, finish_writer,
    index_location, open_for_write,
};
use crate::storage::{CellValue, PageRequest, Row, RowSource, is_plain_identifier};

/// Rows indexed per page.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Writer memory budget.
pub const DEFAULT_WRITER_HEAP_BYTES: usize = 50_000_000;

/// What to do with a row that cannot be turned into a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowErrorPolicy {
    /// Fail the run. Pages committed before the row stay in the index.
    #[default]
    Abort,
    /// Log, count and continue.
    Skip,
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub page_size: usize,
    pub writer_heap_bytes: usize,
    /// Merge to a single segment once the run completes.
    pub merge_on_close: bool,
    pub row_errors: RowErrorPolicy,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            writer_heap_bytes: DEFAULT_WRITER_HEAP_BYTES,
            merge_on_close: true,
            row_errors: RowErrorPolicy::Abort,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkIndexRequest {
    pub table: String,
    pub key_column: String,
    pub content_columns: Vec<String>,
    pub mode: WriteMode,
    /// Inclusive lower bound on the key column.
    pub start_key: Option<CellValue>,
    /// Stop after this many rows.
    pub row_limit: Option<usize>,
}

impl BulkIndexRequest {
    pub fn new(table: &str, key_column: &str, content_columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            key_column: key_column.to_string(),
            content_columns: content_columns.iter().map(|c| c.to_string()).collect(),
            mode: WriteMode::Recreate,
            start_key: None,
            row_limit: None,
        }
    }

    pub fn mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn start_key(mut self, key: CellValue) -> Self {
        self.start_key = Some(key);
        self
    }

    pub fn row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    fn validate(&self) -> EngineResult<()> {
        if self.table.trim().is_empty() {
            return Err(EngineError::invalid("table is empty"));
        }
        if self.key_column.trim().is_empty() {
            return Err(EngineError::invalid("key column is empty"));
        }
        if self.content_columns.iter().all(|c| c.trim().is_empty()) {
            return Err(EngineError::invalid("no content columns given"));
        }
        let names = [self.table.as_str(), self.key_column.as_str()]
            .into_iter()
            .chain(self.content_columns.iter().map(String::as_str));
        for name in names {
            if !is_plain_identifier(name) {
                return Err(EngineError::invalid(format!(
                    "{name:?} is not a plain identifier"
                )));
            }
        }
        if self.row_limit == Some(0) {
            return Err(EngineError::invalid("row limit must be positive"));
        }
        Ok(())
    }
}

/// Outcome of one bulk run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub rows_indexed: usize,
    pub rows_skipped: usize,
    /// Rows left out because their key is NULL; included in `rows_skipped`.
    pub null_key_rows: u64,
    pub pages: usize,
    /// Keys (or `None` for null keys) of rows skipped under [`RowErrorPolicy::Skip`].
    pub rejected: Vec<Option<String>>,
    /// Key of the first row not read because `row_limit` was reached.
    pub resume_key: Option<CellValue>,
    pub elapsed_ms: u128,
}

/// Position of a paged scan. Consumed and replaced by value each page.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    start_key: Option<CellValue>,
    page_size: usize,
    remaining: Option<usize>,
}

/// What a cursor does after a page.
#[derive(Debug, PartialEq)]
enum Step {
    Continue(Cursor),
    LimitReached(Option<CellValue>),
    /// The lookahead row has a NULL key, so no page can start past it.
    NullBoundary,
    Done,
}

impl Cursor {
    pub fn new(start_key: Option<CellValue>, page_size: usize, row_limit: Option<usize>) -> Self {
        Self {
            start_key,
            page_size: page_size.max(1),
            remaining: row_limit,
        }
    }

    pub fn start_key(&self) -> Option<&CellValue> {
        self.start_key.as_ref()
    }

    /// Rows to ask the source for: a page plus the lookahead sentinel.
    fn fetch_limit(&self) -> usize {
        self.page_size.saturating_add(1)
    }

    /// Rows of the fetched page this cursor may consume.
    fn budget(&self) -> usize {
        match self.remaining {
            Some(r) => r.min(self.page_size),
            None => self.page_size,
        }
    }

    /// Advance past `consumed` rows. `next_key` is the key of the first row
    /// that was fetched but not consumed, if any.
    fn advance(self, consumed: usize, next_key: Option<CellValue>) -> Step {
        let remaining = self.remaining.map(|r| r.saturating_sub(consumed));
        if remaining == Some(0) {
            return Step::LimitReached(next_key);
        }
        match next_key {
            Some(key) if consumed == self.page_size && !key.is_null() => Step::Continue(Cursor {
                start_key: Some(key),
                page_size: self.page_size,
                remaining,
            }),
            Some(_) if consumed == self.page_size => Step::NullBoundary,
            _ => Step::Done,
        }
    }
}

/// Loads a table from a [`RowSource`] into the index at
/// `index_base/<table>`.
pub struct BulkIndexer<S> {
    source: S,
    extractor: Arc<dyn TextExtractor>,
    index_base: PathBuf,
    options: IndexOptions,
}

impl<S: RowSource> BulkIndexer<S> {
    pub fn new(source: S, index_base: impl Into<PathBuf>) -> Self {
        Self {
            source,
            extractor: Arc::new(HtmlTextExtractor),
            index_base: index_base.into(),
            options: IndexOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Run one bulk load. See the module docs for paging and failure
    /// semantics.
    pub fn bulk_index(&self, request: &BulkIndexRequest) -> EngineResult<IndexReport> {
        request.validate()?;
        let start = Instant::now();
        let null_keys = self
            .source
            .count_null_keys(&request.table, &request.key_column)
            .map_err(|source| EngineError::RowSource {
                table: request.table.clone(),
                source,
            })?;
        if null_keys > 0 {
            if self.options.row_errors == RowErrorPolicy::Abort {
                return Err(EngineError::RowRejected {
                    key: None,
                    reason: format!(
                        "{null_keys} rows have a NULL {} and cannot be indexed",
                        request.key_column
                    ),
                });
            }
            warn!(table = %request.table, null_keys, "skipping rows with a NULL key");
        }
        let location = index_location(&self.index_base, &request.table);
        let schema = build_table_schema(&request.key_column, &request.content_columns);
        let mut target = open_for_write(
            &location,
            schema,
            request.mode,
            self.options.writer_heap_bytes.max(MIN_WRITER_HEAP_BYTES),
        )?;
        let fields = TableFields::resolve(
            &target.index.schema(),
            &request.key_column,
            &request.content_columns,
        )?;
        info!(
            table = %request.table,
            location = %location.display(),
            mode = ?request.mode,
            start_key = ?request.start_key,
            row_limit = ?request.row_limit,
            page_size = self.options.page_size,
            "bulk index start"
        );

        if target.needs_clear {
            target
                .writer
                .delete_all_documents()
                .map_err(|e| EngineError::write(&location, e))?;
        }

        let columns: Vec<String> = request
            .content_columns
            .iter()
            .filter(|c| !c.trim().is_empty() && !c.eq_ignore_ascii_case(&request.key_column))
            .cloned()
            .collect();

        let mut report = IndexReport {
            rows_skipped: usize::try_from(null_keys).unwrap_or(usize::MAX),
            null_key_rows: null_keys,
            ..IndexReport::default()
        };
        let mut cursor = Cursor::new(
            request.start_key.clone(),
            self.options.page_size,
            request.row_limit,
        );
        loop {
            let rows = self
                .source
                .fetch_page(&PageRequest {
                    table: &request.table,
                    key_column: &request.key_column,
                    columns: &columns,
                    start_key: cursor.start_key(),
                    limit: cursor.fetch_limit(),
                })
                .map_err(|source| EngineError::RowSource {
                    table: request.table.clone(),
                    source,
                })?;

            let consumed = rows.len().min(cursor.budget());
            for row in &rows[..consumed] {
                self.index_row(&mut target.writer, &location, request, &fields, row, &mut report)?;
            }
            target
                .writer
                .commit()
                .map_err(|e| EngineError::write(&location, e))?;
            report.pages += 1;
            debug!(
                table = %request.table,
                page = report.pages,
                fetched = rows.len(),
                consumed = consumed,
                indexed_total = report.rows_indexed,
                "page committed"
            );

            let next_key = rows
                .get(consumed)
                .map(|r| r.get(&request.key_column).cloned().unwrap_or(CellValue::Null));
            match cursor.advance(consumed, next_key) {
                Step::Continue(next) => cursor = next,
                Step::LimitReached(resume) => {
                    report.resume_key = resume;
                    break;
                }
                Step::NullBoundary => {
                    return Err(EngineError::RowRejected {
                        key: None,
                        reason: format!(
                            "row after page {} has a NULL {}; the rest of the table is unreachable",
                            report.pages, request.key_column
                        ),
                    });
                }
                Step::Done => break,
            }
        }

        finish_writer(
            &location,
            &target.index,
            target.writer,
            self.options.merge_on_close,
        )?;
        report.elapsed_ms = start.elapsed().as_millis();
        info!(
            table = %request.table,
            rows_indexed = report.rows_indexed,
            rows_skipped = report.rows_skipped,
            pages = report.pages,
            resume_key = ?report.resume_key,
            elapsed_ms = report.elapsed_ms,
            "bulk index done"
        );
        Ok(report)
    }

    fn index_row(
        &self,
        writer: &mut IndexWriter,
        location: &Path,
        request: &BulkIndexRequest,
        fields: &TableFields,
        row: &Row,
        report: &mut IndexReport,
    ) -> EngineResult<()> {
        let (key, doc) = match self.row_document(request, fields, row) {
            Ok(built) => built,
            Err(EngineError::RowRejected { key, reason })
                if self.options.row_errors == RowErrorPolicy::Skip =>
            {
                warn!(table = %request.table, key = ?key, reason = %reason, "skipping row");
                report.rows_skipped += 1;
                report.rejected.push(key);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if request.mode == WriteMode::Append {
            writer.delete_term(Term::from_field_text(fields.key, &key));
        }
        writer
            .add_document(doc)
            .map_err(|e| EngineError::write(location, e))?;
        report.rows_indexed += 1;
        Ok(())
    }

    fn row_document(
        &self,
        request: &BulkIndexRequest,
        fields: &TableFields,
        row: &Row,
    ) -> EngineResult<(String, TantivyDocument)> {
        let key = row
            .get(&request.key_column)
            .and_then(CellValue::to_key_string)
            .ok_or_else(|| EngineError::RowRejected {
                key: None,
                reason: format!("key column {} is null or not text", request.key_column),
            })?;

        let mut doc = TantivyDocument::default();
        doc.add_text(fields.key, &key);
        for (name, field) in &fields.content {
            let Some(raw) = row.get(name).and_then(CellValue::content_bytes) else {
                continue;
            };
            let text = self
                .extractor
                .to_plain_text(&raw)
                .map_err(|e| EngineError::RowRejected {
                    key: Some(key.clone()),
                    reason: format!("column {name}: {e}"),
                })?;
            if !text.trim().is_empty() {
                doc.add_text(*field, &text);
            }
        }
        Ok((key, doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RowSourceError;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// In-memory table sorted by integer key; records every page request.
    struct MemTable {
        rows: Vec<(i64, Option<CellValue>)>,
        requests: Mutex<Vec<(Option<CellValue>, usize)>>,
        fail_after: Option<usize>,
    }

    impl MemTable {
        fn new(n: i64) -> Self {
            Self {
                rows: (1..=n)
                    .map(|k| (k, Some(CellValue::Text(format!("row {k}")))))
                    .collect(),
                requests: Mutex::new(Vec::new()),
                fail_after: None,
            }
        }
    }

    impl RowSource for MemTable {
        fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<Row>, RowSourceError> {
            let mut log = self.requests.lock();
            if self.fail_after.is_some_and(|n| log.len() >= n) {
                return Err(RowSourceError::Other("connection lost".into()));
            }
            log.push((request.start_key.cloned(), request.limit));
            let start = match request.start_key {
                Some(CellValue::Integer(k)) => *k,
                _ => i64::MIN,
            };
            let columns: Arc<[String]> = std::iter::once(request.key_column.to_string())
                .chain(request.columns.iter().cloned())
                .collect::<Vec<_>>()
                .into();
            Ok(self
                .rows
                .iter()
                .filter(|(k, _)| *k >= start)
                .take(request.limit)
                .map(|(k, body)| {
                    Row::new(
                        Arc::clone(&columns),
                        vec![CellValue::Integer(*k), body.clone().unwrap_or(CellValue::Null)],
                    )
                })
                .collect())
        }
    }

    fn options(page_size: usize) -> IndexOptions {
        IndexOptions {
            page_size,
            writer_heap_bytes: MIN_WRITER_HEAP_BYTES,
            merge_on_close: true,
            row_errors: RowErrorPolicy::Abort,
        }
    }

    #[test]
    fn cursor_stops_on_short_page() {
        let c = Cursor::new(None, 10, None);
        assert_eq!(c.fetch_limit(), 11);
        assert_eq!(c.advance(7, None), Step::Done);
    }

    #[test]
    fn cursor_continues_from_lookahead_and_decrements_budget() {
        let c = Cursor::new(None, 10, Some(25));
        assert_eq!(c.budget(), 10);
        match c.advance(10, Some(CellValue::Integer(11))) {
            Step::Continue(next) => {
                assert_eq!(next.start_key(), Some(&CellValue::Integer(11)));
                assert_eq!(next.remaining, Some(15));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cursor_reports_resume_key_when_limit_hits_page_boundary() {
        let c = Cursor::new(None, 10, Some(10));
        assert_eq!(
            c.advance(10, Some(CellValue::Integer(11))),
            Step::LimitReached(Some(CellValue::Integer(11)))
        );
    }

    #[test]
    fn pages_through_the_whole_table() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MemTable::new(25));
        let indexer = BulkIndexer::new(Arc::clone(&source), dir.path()).with_options(options(10));
        let report = indexer
            .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]))
            .unwrap();
        assert_eq!(report.rows_indexed, 25);
        assert_eq!(report.pages, 3);
        assert_eq!(report.resume_key, None);

        let requests = source.requests.lock().clone();
        assert_eq!(
            requests,
            vec![
                (None, 11),
                (Some(CellValue::Integer(11)), 11),
                (Some(CellValue::Integer(21)), 11),
            ]
        );
    }

    #[test]
    fn exact_multiple_of_page_size_ends_without_extra_page() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MemTable::new(20));
        let indexer = BulkIndexer::new(Arc::clone(&source), dir.path()).with_options(options(10));
        let report = indexer
            .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]))
            .unwrap();
        assert_eq!(report.rows_indexed, 20);
        assert_eq!(report.pages, 2);
    }

    #[test]
    fn row_limit_stops_mid_page_with_resume_key() {
        let dir = TempDir::new().unwrap();
        let indexer = BulkIndexer::new(MemTable::new(25), dir.path()).with_options(options(10));
        let report = indexer
            .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]).row_limit(13))
            .unwrap();
        assert_eq!(report.rows_indexed, 13);
        assert_eq!(report.pages, 2);
        assert_eq!(report.resume_key, Some(CellValue::Integer(14)));
    }

    #[test]
    fn source_failure_aborts_but_keeps_committed_pages() {
        let dir = TempDir::new().unwrap();
        let mut table = MemTable::new(25);
        table.fail_after = Some(1);
        let indexer = BulkIndexer::new(table, dir.path()).with_options(options(10));
        let err = indexer
            .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::RowSource { .. }));

        let index = tantivy::Index::open_in_dir(dir.path().join("t")).unwrap();
        let reader = index.reader().unwrap();
        assert_eq!(reader.searcher().num_docs(), 10);
    }

    #[test]
    fn null_key_aborts_or_skips_by_policy() {
        let dir = TempDir::new().unwrap();

        struct NullKey;
        impl RowSource for NullKey {
            fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<Row>, RowSourceError> {
                let columns: Arc<[String]> =
                    vec![request.key_column.to_string(), "body".to_string()].into();
                Ok(vec![
                    Row::new(Arc::clone(&columns), vec![CellValue::Null, CellValue::Text("x".into())]),
                    Row::new(columns, vec![CellValue::Integer(1), CellValue::Text("y".into())]),
                ])
            }
        }

        let strict = BulkIndexer::new(NullKey, dir.path()).with_options(options(10));
        let err = strict
            .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::RowRejected { key: None, .. }));

        let lenient = BulkIndexer::new(NullKey, dir.path()).with_options(IndexOptions {
            row_errors: RowErrorPolicy::Skip,
            ..options(10)
        });
        let report = lenient
            .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]))
            .unwrap();
        assert_eq!(report.rows_indexed, 1);
        assert_eq!(report.rows_skipped, 1);
        assert_eq!(report.rejected, vec![None]);
    }

    #[test]
    fn cursor_flags_null_lookahead_at_page_boundary() {
        let c = Cursor::new(None, 2, None);
        assert_eq!(c.advance(2, Some(CellValue::Null)), Step::NullBoundary);
        let c = Cursor::new(None, 2, None);
        assert_eq!(c.advance(1, Some(CellValue::Null)), Step::Done);
    }

    /// Returns every stored row from `start` on, NULL keys first, the way
    /// SQLite orders them when nothing filters them out.
    struct NullsFirst;

    impl RowSource for NullsFirst {
        fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<Row>, RowSourceError> {
            let columns: Arc<[String]> =
                vec![request.key_column.to_string(), "body".to_string()].into();
            let keys = [None, None, None, Some(1), Some(2)];
            let skip = usize::from(request.start_key.is_some());
            Ok(keys
                .iter()
                .skip(skip)
                .take(request.limit)
                .map(|k| {
                    let key = k.map_or(CellValue::Null, CellValue::Integer);
                    Row::new(Arc::clone(&columns), vec![key, CellValue::Text("x".into())])
                })
                .collect())
        }
    }

    #[test]
    fn null_key_at_page_boundary_fails_instead_of_stopping_early() {
        let dir = TempDir::new().unwrap();
        let indexer = BulkIndexer::new(NullsFirst, dir.path()).with_options(IndexOptions {
            row_errors: RowErrorPolicy::Skip,
            ..options(2)
        });
        let err = indexer
            .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::RowRejected { key: None, .. }), "{err:?}");
    }

    /// A table whose NULL-key rows are filtered out of pages and counted.
    struct CountedNulls {
        inner: MemTable,
        nulls: u64,
    }

    impl RowSource for CountedNulls {
        fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<Row>, RowSourceError> {
            self.inner.fetch_page(request)
        }

        fn count_null_keys(&self, _table: &str, _key_column: &str) -> Result<u64, RowSourceError> {
            Ok(self.nulls)
        }
    }

    #[test]
    fn counted_null_keys_are_skipped_or_abort_by_policy() {
        let dir = TempDir::new().unwrap();
        let lenient = BulkIndexer::new(
            CountedNulls {
                inner: MemTable::new(2),
                nulls: 3,
            },
            dir.path(),
        )
        .with_options(IndexOptions {
            row_errors: RowErrorPolicy::Skip,
            ..options(2)
        });
        let report = lenient
            .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]))
            .unwrap();
        assert_eq!(report.rows_indexed, 2);
        assert_eq!(report.rows_skipped, 3);
        assert_eq!(report.null_key_rows, 3);

        let strict = BulkIndexer::new(
            CountedNulls {
                inner: MemTable::new(2),
                nulls: 1,
            },
            dir.path().join("strict"),
        )
        .with_options(options(2));
        let err = strict
            .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::RowRejected { key: None, .. }));
        assert!(!dir.path().join("strict").join("t").exists());
    }

    fn indexed_keys(location: &Path, total: i64) -> Vec<i64> {
        use tantivy::collector::Count;
        use tantivy::query::TermQuery;
        use tantivy::schema::IndexRecordOption;

        let index = tantivy::Index::open_in_dir(location).unwrap();
        let key = index.schema().get_field("id").unwrap();
        let searcher = index.reader().unwrap().searcher();
        let mut found = Vec::new();
        for k in 1..=total {
            let query = TermQuery::new(
                Term::from_field_text(key, &k.to_string()),
                IndexRecordOption::Basic,
            );
            let hits = searcher.search(&query, &Count).unwrap();
            assert!(hits <= 1, "key {k} indexed {hits} times");
            if hits == 1 {
                found.push(k);
            }
        }
        assert_eq!(searcher.num_docs(), found.len() as u64);
        found
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(24))]

        #[test]
        fn any_partition_point_resumes_to_the_full_table(
            total in 1i64..40,
            page_size in 1usize..12,
            limit in 1usize..45,
            from_last_indexed in proptest::bool::ANY,
        ) {
            let dir = TempDir::new().unwrap();
            let first = BulkIndexer::new(MemTable::new(total), dir.path())
                .with_options(options(page_size))
                .bulk_index(&BulkIndexRequest::new("t", "id", &["body"]).row_limit(limit))
                .unwrap();
            let expected_first = usize::try_from(total).unwrap().min(limit);
            proptest::prop_assert_eq!(first.rows_indexed, expected_first);

            if let Some(resume) = first.resume_key.clone() {
                let start = if from_last_indexed {
                    CellValue::Integer(i64::try_from(expected_first).unwrap())
                } else {
                    resume
                };
                let second = BulkIndexer::new(MemTable::new(total), dir.path())
                    .with_options(options(page_size))
                    .bulk_index(
                        &BulkIndexRequest::new("t", "id", &["body"])
                            .mode(WriteMode::Append)
                            .start_key(start),
                    )
                    .unwrap();
                proptest::prop_assert_eq!(second.resume_key, None);
            } else {
                proptest::prop_assert_eq!(expected_first, usize::try_from(total).unwrap());
            }

            let keys = indexed_keys(&dir.path().join("t"), total);
            proptest::prop_assert_eq!(keys, (1..=total).collect::<Vec<_>>());
        }
    }

    #[test]
    fn invalid_identifiers_fail_before_opening_the_index() {
        let dir = TempDir::new().unwrap();
        let indexer = BulkIndexer::new(MemTable::new(1), dir.path());
        let err = indexer
            .bulk_index(&BulkIndexRequest::new("t;--", "id", &["body"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(!dir.path().join("t;--").exists());
    }
}
