//! `SQLite` row source.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use thiserror::Error;
use tracing::{debug, info};

use super::{CellValue, PageRequest, Row, RowSource, RowSourceError, is_plain_identifier};

// -------------------------------------------------------------------------
// Lazy SQLite Connection
// -------------------------------------------------------------------------
// The database is opened on the first page request, read-only. Commands that
// never touch the row source (search) never pay for the open.

/// Error from lazy database initialization.
#[derive(Debug, Error)]
pub enum LazyDbError {
    #[error("Database not found at {0}")]
    NotFound(PathBuf),
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

/// A lazily-initialized, thread-safe SQLite connection handle.
pub struct LazyDb {
    path: PathBuf,
    conn: parking_lot::Mutex<Option<Connection>>,
}

/// RAII guard that dereferences to the inner `Connection`.
pub struct LazyDbGuard<'a>(parking_lot::MappedMutexGuard<'a, Connection>);

impl std::ops::Deref for LazyDbGuard<'_> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        &self.0
    }
}

impl LazyDb {
    /// Create a lazy handle pointing at `path`. No I/O is performed.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            conn: parking_lot::Mutex::new(None),
        }
    }

    /// Get the connection, opening the database on first access.
    pub fn get(&self, reason: &str) -> Result<LazyDbGuard<'_>, LazyDbError> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            if !self.path.exists() {
                return Err(LazyDbError::NotFound(self.path.clone()));
            }
            let start = Instant::now();
            let conn = Connection::open_with_flags(
                &self.path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| LazyDbError::OpenFailed {
                path: self.path.clone(),
                source: e,
            })?;
            info!(
                path = %self.path.display(),
                elapsed_ms = start.elapsed().as_millis(),
                reason = reason,
                "lazily opened SQLite database"
            );
            *guard = Some(conn);
        }
        parking_lot::MutexGuard::try_map(guard, Option::as_mut)
            .map(LazyDbGuard)
            .map_err(|_| LazyDbError::NotFound(self.path.clone()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }
}

/// Reads key-ordered pages from a SQLite database file.
pub struct SqliteRowSource {
    db: LazyDb,
}

impl SqliteRowSource {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            db: LazyDb::new(path.into()),
        }
    }

    pub fn db(&self) -> &LazyDb {
        &self.db
    }
}

/// Build the page query. Identifiers must already be validated.
pub(crate) fn page_sql(request: &PageRequest<'_>) -> String {
    let key = quote_identifier(request.key_column);
    let mut sql = format!("SELECT {key}");
    for column in request.columns {
        sql.push_str(", ");
        sql.push_str(&quote_identifier(column));
    }
    sql.push_str(" FROM ");
    sql.push_str(&quote_identifier(request.table));
    sql.push_str(&format!(" WHERE {key} IS NOT NULL"));
    if request.start_key.is_some() {
        sql.push_str(&format!(" AND {key} >= ?1 ORDER BY {key} LIMIT ?2"));
    } else {
        sql.push_str(&format!(" ORDER BY {key} LIMIT ?1"));
    }
    sql
}

fn null_key_sql(table: &str, key_column: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
        quote_identifier(table),
        quote_identifier(key_column)
    )
}

fn check_identifiers<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<(), RowSourceError> {
    for name in names {
        if !is_plain_identifier(name) {
            return Err(RowSourceError::InvalidIdentifier(name.to_string()));
        }
    }
    Ok(())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Integer(v) => Value::Integer(*v),
        CellValue::Real(v) => Value::Real(*v),
        CellValue::Text(s) => Value::Text(s.clone()),
        CellValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(v) => CellValue::Integer(v),
        ValueRef::Real(v) => CellValue::Real(v),
        // Undecodable text is passed on as bytes for the extractor to judge.
        ValueRef::Text(t) => match std::str::from_utf8(t) {
            Ok(text) => CellValue::Text(text.to_string()),
            Err(_) => CellValue::Blob(t.to_vec()),
        },
        ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
    }
}

impl RowSource for SqliteRowSource {
    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<Row>, RowSourceError> {
        check_identifiers(
            [request.table, request.key_column]
                .into_iter()
                .chain(request.columns.iter().map(String::as_str)),
        )?;

        let sql = page_sql(request);
        let limit = i64::try_from(request.limit).unwrap_or(i64::MAX);
        let mut params: Vec<Value> = Vec::with_capacity(2);
        if let Some(start) = request.start_key {
            params.push(to_sql_value(start));
        }
        params.push(Value::Integer(limit));

        let columns: Arc<[String]> = std::iter::once(request.key_column.to_string())
            .chain(request.columns.iter().cloned())
            .collect::<Vec<_>>()
            .into();
        let width = columns.len();

        let conn = self.db.get("bulk index page")?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut page = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(from_value_ref(row.get_ref(i)?));
            }
            page.push(Row::new(Arc::clone(&columns), cells));
        }
        debug!(table = request.table, rows = page.len(), "fetched page");
        Ok(page)
    }

    fn count_null_keys(&self, table: &str, key_column: &str) -> Result<u64, RowSourceError> {
        check_identifiers([table, key_column])?;
        let conn = self.db.get("null key count")?;
        let count: i64 = conn.query_row(&null_key_sql(table, key_column), [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
