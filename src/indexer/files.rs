//! Directory-tree indexing.
//!
//! Every regular file under the docs root becomes one document keyed by its
//! path, with its modification time and its extracted text. The extractor is
//! picked by file extension (`.pdf` gets the PDF extractor), falling back to
//! the UTF-8/HTML one. Files that cannot
//! be read or decoded are logged and skipped; they never fail the run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};

use serde::Serialize;
use tantivy::schema::Field;
use tantivy::{TantivyDocument, Term};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};
use crate::extract::{HtmlTextExtractor, PdfTextExtractor, TextExtractor};
use crate::indexer::IndexOptions;
use crate::search::tantivy::{
    FILE_KEY_FIELD, FILE_TEXT_FIELD, FILE_TIME_FIELD, WriteMode, build_file_schema,
    finish_writer, index_location, open_for_write,
};
use crate::storage::is_plain_identifier;

/// Name of the file index when none is given.
pub const DEFAULT_FILE_INDEX: &str = "files";

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileIndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub elapsed_ms: u128,
}

pub struct FileIndexer {
    extractor: Arc<dyn TextExtractor>,
    by_extension: HashMap<String, Arc<dyn TextExtractor>>,
    index_base: PathBuf,
    options: IndexOptions,
}

struct FileFields {
    key: Field,
    time: Field,
    text: Field,
}

impl FileIndexer {
    pub fn new(index_base: impl Into<PathBuf>) -> Self {
        let mut by_extension: HashMap<String, Arc<dyn TextExtractor>> = HashMap::new();
        by_extension.insert("pdf".into(), Arc::new(PdfTextExtractor));
        Self {
            extractor: Arc::new(HtmlTextExtractor),
            by_extension,
            index_base: index_base.into(),
            options: IndexOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// Extractor for files without a more specific one.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Extractor for files ending in `.<extension>` (case-insensitive).
    pub fn with_extractor_for(mut self, extension: &str, extractor: Arc<dyn TextExtractor>) -> Self {
        self.by_extension
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), extractor);
        self
    }

    fn extractor_for(&self, path: &Path) -> &dyn TextExtractor {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(&ext.to_ascii_lowercase()))
            .unwrap_or(&self.extractor)
            .as_ref()
    }

    /// Index every file under `docs` into `index_base/<name>`.
    pub fn index_tree(&self, docs: &Path, name: &str, mode: WriteMode) -> EngineResult<FileIndexReport> {
        if !is_plain_identifier(name.trim()) {
            return Err(EngineError::invalid(format!("{name:?} is not a plain index name")));
        }
        if !docs.is_dir() {
            return Err(EngineError::invalid(format!(
                "{} is not a readable directory",
                docs.display()
            )));
        }
        let start = Instant::now();
        let location = index_location(&self.index_base, name);
        let target = open_for_write(
            &location,
            build_file_schema(),
            mode,
            self.options.writer_heap_bytes,
        )?;
        let schema = target.index.schema();
        let lookup = |n: &str| {
            schema
                .get_field(n)
                .map_err(|_| EngineError::invalid(format!("file index has no field {n:?}")))
        };
        let fields = FileFields {
            key: lookup(FILE_KEY_FIELD)?,
            time: lookup(FILE_TIME_FIELD)?,
            text: lookup(FILE_TEXT_FIELD)?,
        };
        if target.needs_clear {
            target
                .writer
                .delete_all_documents()
                .map_err(|e| EngineError::write(&location, e))?;
        }
        info!(docs = %docs.display(), location = %location.display(), mode = ?mode, "file index start");

        let mut report = FileIndexReport::default();
        for entry in WalkDir::new(docs).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    report.files_skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(doc) = self.file_document(path, &fields) else {
                report.files_skipped += 1;
                continue;
            };
            let key = path.to_string_lossy();
            if mode == WriteMode::Append {
                target
                    .writer
                    .delete_term(Term::from_field_text(fields.key, &key));
            }
            target
                .writer
                .add_document(doc)
                .map_err(|e| EngineError::write(&location, e))?;
            report.files_indexed += 1;
            debug!(path = %key, "indexed file");
        }

        finish_writer(
            &location,
            &target.index,
            target.writer,
            self.options.merge_on_close,
        )?;
        report.elapsed_ms = start.elapsed().as_millis();
        info!(
            files_indexed = report.files_indexed,
            files_skipped = report.files_skipped,
            elapsed_ms = report.elapsed_ms,
            "file index done"
        );
        Ok(report)
    }

    fn file_document(&self, path: &Path, fields: &FileFields) -> Option<TantivyDocument> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file");
                return None;
            }
        };
        let text = match self.extractor_for(path).to_plain_text(&bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file without text");
                return None;
            }
        };
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));

        let mut doc = TantivyDocument::default();
        doc.add_text(fields.key, path.to_string_lossy());
        doc.add_i64(fields.time, modified);
        if !text.trim().is_empty() {
            doc.add_text(fields.text, &text);
        }
        Some(doc)
    }
}
