use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, params};
use table_search::indexer::{BulkIndexRequest, BulkIndexer, IndexOptions, IndexReport};
use table_search::search::{Combine, SearchRequest, SearcherCache, TableSearcher};
use table_search::storage::SqliteRowSource;
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A temp directory holding a SQLite database (`source.db`) and an index
/// base (`index/`).
#[allow(dead_code)]
pub struct Fixture {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Fixture {
    pub fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().expect("tempdir"),
        };
        fixture
            .conn()
            .execute_batch(
                "CREATE TABLE article (id INTEGER PRIMARY KEY, title TEXT, body TEXT);",
            )
            .expect("create table");
        fixture
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("source.db")
    }

    pub fn index_base(&self) -> PathBuf {
        self.dir.path().join("index")
    }

    pub fn conn(&self) -> Connection {
        Connection::open(self.db_path()).expect("open fixture db")
    }

    pub fn insert(&self, id: i64, title: &str, body: &str) {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO article (id, title, body) VALUES (?1, ?2, ?3)",
                params![id, title, body],
            )
            .expect("insert row");
    }

    /// Rows `1..=n` titled `item {id}` with a body naming the parity.
    pub fn insert_numbered(&self, n: i64) {
        let mut conn = self.conn();
        let tx = conn.transaction().expect("tx");
        for id in 1..=n {
            let parity = if id % 2 == 0 { "even" } else { "odd" };
            tx.execute(
                "INSERT INTO article (id, title, body) VALUES (?1, ?2, ?3)",
                params![id, format!("item {id}"), format!("{parity} number")],
            )
            .expect("insert row");
        }
        tx.commit().expect("commit");
    }

    pub fn indexer(&self, page_size: usize) -> BulkIndexer<SqliteRowSource> {
        BulkIndexer::new(SqliteRowSource::open(self.db_path()), self.index_base()).with_options(
            IndexOptions {
                page_size,
                ..IndexOptions::default()
            },
        )
    }

    pub fn index(&self, request: &BulkIndexRequest) -> IndexReport {
        self.indexer(IndexOptions::default().page_size)
            .bulk_index(request)
            .expect("bulk index")
    }

    pub fn searcher(&self) -> TableSearcher {
        TableSearcher::new(Arc::new(SearcherCache::default()), self.index_base())
    }
}

#[allow(dead_code)]
pub fn article_request() -> BulkIndexRequest {
    BulkIndexRequest::new("article", "id", &["title", "body"])
}

/// Search `article` and return the keys.
#[allow(dead_code)]
pub fn keys(searcher: &TableSearcher, query: &str, fields: &[&str], combine: Combine) -> Vec<String> {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    searcher
        .search(&SearchRequest {
            table: "article",
            query,
            fields: &fields,
            key_field: "id",
            combine,
            top_n: 1000,
        })
        .expect("search")
}

#[allow(dead_code)]
pub fn sorted(mut keys: Vec<String>) -> Vec<String> {
    keys.sort_by_key(|k| k.parse::<i64>().unwrap_or(i64::MAX));
    keys
}

#[allow(dead_code)]
pub fn index_doc_count(location: &Path) -> u64 {
    let index = tantivy::Index::open_in_dir(location).expect("open index");
    index.reader().expect("reader").searcher().num_docs()
}
