//! Row sources feeding the bulk indexer.
//!
//! The indexer only needs one thing from a database: "give me the next page
//! of rows ordered by the key column, starting at this key". [`RowSource`]
//! captures that; [`sqlite::SqliteRowSource`] is the stock implementation.

pub mod sqlite;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use sqlite::{LazyDb, LazyDbError, SqliteRowSource};

#[derive(Debug, Error)]
pub enum RowSourceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Open(#[from] LazyDbError),

    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("{0}")]
    Other(String),
}

/// One cell as delivered by the row source.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// String form used for the stored key field. Blobs that are not UTF-8
    /// and nulls have no key form.
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Integer(v) => Some(v.to_string()),
            CellValue::Real(v) => Some(v.to_string()),
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Blob(b) => String::from_utf8(b.clone()).ok(),
        }
    }

    /// Raw bytes handed to the text extractor. `None` for nulls.
    pub fn content_bytes(&self) -> Option<std::borrow::Cow<'_, [u8]>> {
        use std::borrow::Cow;
        match self {
            CellValue::Null => None,
            CellValue::Integer(v) => Some(Cow::Owned(v.to_string().into_bytes())),
            CellValue::Real(v) => Some(Cow::Owned(v.to_string().into_bytes())),
            CellValue::Text(s) => Some(Cow::Borrowed(s.as_bytes())),
            CellValue::Blob(b) => Some(Cow::Borrowed(b.as_slice())),
        }
    }

    /// A key typed on the command line. It is always bound as text: SQLite
    /// applies the key column's affinity to it, so INTEGER and REAL columns
    /// compare numerically and TEXT columns compare `02` as `02`.
    pub fn from_cli_key(raw: &str) -> Self {
        CellValue::Text(raw.to_string())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Integer(v) => write!(f, "{v}"),
            CellValue::Real(v) => write!(f, "{v}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// A fetched row. Cells are aligned with [`Row::columns`], which is the
/// requested column list (key column first).
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    cells: Vec<CellValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, cells: Vec<CellValue>) -> Self {
        debug_assert_eq!(columns.len(), cells.len());
        Self { columns, cells }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Look a cell up by column name, ignoring ASCII case.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.cells.get(i))
    }
}

/// Parameters for one page read:
/// `SELECT key, columns.. FROM table WHERE key IS NOT NULL [AND key >= start] ORDER BY key LIMIT limit`.
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub table: &'a str,
    pub key_column: &'a str,
    pub columns: &'a [String],
    pub start_key: Option<&'a CellValue>,
    pub limit: usize,
}

/// Provider of key-ordered row pages.
pub trait RowSource: Send + Sync {
    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<Row>, RowSourceError>;

    /// Rows whose key is NULL. Sources that leave such rows out of their
    /// pages report them here so the indexer can account for them.
    fn count_null_keys(&self, _table: &str, _key_column: &str) -> Result<u64, RowSourceError> {
        Ok(0)
    }
}

impl<T: RowSource + ?Sized> RowSource for Arc<T> {
    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<Row>, RowSourceError> {
        (**self).fetch_page(request)
    }

    fn count_null_keys(&self, table: &str, key_column: &str) -> Result<u64, RowSourceError> {
        (**self).count_null_keys(table, key_column)
    }
}

/// True for plain SQL identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
