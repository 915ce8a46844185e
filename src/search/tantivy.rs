use std::path::{Path, PathBuf};

use tantivy::schema::*;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tantivy::index::SegmentId;

use crate::error::{EngineError, EngineResult};
use crate::search::canonicalize::{canonical_field_name, canonical_field_names};

/// Field names of a file index.
pub const FILE_KEY_FIELD: &str = "key";
pub const FILE_TIME_FIELD: &str = "time";
pub const FILE_TEXT_FIELD: &str = "value";

/// Smallest writer heap tantivy accepts for a single indexing thread.
pub const MIN_WRITER_HEAP_BYTES: usize = 15_000_000;

/// How a writer treats what is already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Start from an empty index; keys cannot collide, documents are added.
    #[default]
    Recreate,
    /// Keep existing documents; each document replaces any with the same key.
    Append,
}

/// Location of one index under the index base directory.
pub fn index_location(base: &Path, name: &str) -> PathBuf {
    base.join(name.trim())
}

/// Schema for a table index: the key column as a raw stored term, every
/// content column as unstored full text. Names are case-folded.
pub fn build_table_schema(key_column: &str, content_columns: &[String]) -> Schema {
    let key = canonical_field_name(key_column);
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field(&key, STRING | STORED);
    for column in canonical_field_names(content_columns) {
        if column != key {
            schema_builder.add_text_field(&column, TEXT);
        }
    }
    schema_builder.build()
}

pub fn build_file_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field(FILE_KEY_FIELD, STRING | STORED);
    schema_builder.add_i64_field(FILE_TIME_FIELD, INDEXED | STORED);
    schema_builder.add_text_field(FILE_TEXT_FIELD, TEXT);
    schema_builder.build()
}

/// Resolved fields of a table index.
#[derive(Debug, Clone)]
pub struct TableFields {
    pub key: Field,
    pub content: Vec<(String, Field)>,
}

impl TableFields {
    /// Resolve the key and content fields against `schema`. A missing field
    /// means the index was built for different columns.
    pub fn resolve(
        schema: &Schema,
        key_column: &str,
        content_columns: &[String],
    ) -> EngineResult<Self> {
        let lookup = |name: &str| {
            schema.get_field(name).map_err(|_| {
                EngineError::invalid(format!(
                    "index has no field {name:?}; rebuild it in recreate mode"
                ))
            })
        };
        let key_name = canonical_field_name(key_column);
        let key = lookup(&key_name)?;
        let mut content = Vec::new();
        for column in canonical_field_names(content_columns) {
            if column != key_name {
                let field = lookup(&column)?;
                content.push((column, field));
            }
        }
        Ok(Self { key, content })
    }
}

/// On-disk state of an index as recorded in its `meta.json`.
///
/// Two versions differ whenever a commit landed in between: every commit
/// bumps the opstamp, and a recreated index gets fresh segment ids even if
/// the opstamp happens to repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexVersion {
    pub opstamp: u64,
    segments: Vec<SegmentId>,
}

impl IndexVersion {
    pub fn load(index: &Index) -> tantivy::Result<Self> {
        let metas = index.load_metas()?;
        let mut segments: Vec<SegmentId> = metas.segments.iter().map(|s| s.id()).collect();
        segments.sort();
        Ok(Self {
            opstamp: metas.opstamp,
            segments,
        })
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Open an existing index for reading.
pub fn open_index(location: &Path) -> tantivy::Result<Index> {
    Index::open_in_dir(location)
}

/// Reader that only moves when asked; the searcher cache decides when.
pub fn manual_reader(index: &Index) -> tantivy::Result<IndexReader> {
    index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()
}

fn index_exists(location: &Path) -> bool {
    location.join("meta.json").exists()
}

fn same_schema(a: &Schema, b: &Schema) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// An index opened for writing. `needs_clear` is set when a recreate run
/// reuses an existing index and must drop its documents in the first commit.
pub struct WritableIndex {
    pub index: Index,
    pub writer: IndexWriter,
    pub needs_clear: bool,
}

/// Open (or create) the index at `location` for writing.
///
/// Recreate keeps the directory when the schema is unchanged and clears it
/// through the writer; otherwise the directory is replaced. Append opens what
/// is there, creating it when missing.
pub fn open_for_write(
    location: &Path,
    schema: Schema,
    mode: WriteMode,
    heap_bytes: usize,
) -> EngineResult<WritableIndex> {
    let write_err = |e: tantivy::TantivyError| EngineError::write(location, e);
    let io_err = |e: std::io::Error| EngineError::write(location, tantivy::TantivyError::from(e));

    let (index, needs_clear) = if index_exists(location) {
        let existing = Index::open_in_dir(location).map_err(write_err)?;
        match mode {
            WriteMode::Append => (existing, false),
            WriteMode::Recreate if same_schema(&existing.schema(), &schema) => (existing, true),
            WriteMode::Recreate => {
                drop(existing);
                std::fs::remove_dir_all(location).map_err(io_err)?;
                std::fs::create_dir_all(location).map_err(io_err)?;
                (Index::create_in_dir(location, schema).map_err(write_err)?, false)
            }
        }
    } else {
        std::fs::create_dir_all(location).map_err(io_err)?;
        (Index::create_in_dir(location, schema).map_err(write_err)?, false)
    };

    let writer: IndexWriter = index
        .writer(heap_bytes.max(MIN_WRITER_HEAP_BYTES))
        .map_err(write_err)?;
    Ok(WritableIndex {
        index,
        writer,
        needs_clear,
    })
}

/// Commit, then optionally merge all searchable segments into one, and wait
/// for merge threads to finish. Consumes the writer.
pub fn finish_writer(
    location: &Path,
    index: &Index,
    mut writer: IndexWriter,
    merge: bool,
) -> EngineResult<()> {
    let write_err = |e: tantivy::TantivyError| EngineError::write(location, e);
    writer.commit().map_err(write_err)?;
    if merge {
        let segment_ids = index.searchable_segment_ids().map_err(write_err)?;
        if segment_ids.len() > 1 {
            writer.merge(&segment_ids).wait().map_err(write_err)?;
        }
    }
    writer.wait_merging_threads().map_err(write_err)?;
    Ok(())
}

/// Stored text value of `field`, if any.
pub fn stored_text(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
