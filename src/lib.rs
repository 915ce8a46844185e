pub mod config;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod search;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use config::Config;
use indexer::files::{DEFAULT_FILE_INDEX, FileIndexer};
use indexer::{BulkIndexRequest, BulkIndexer};
use search::tantivy::WriteMode;
use search::{Combine, SearchRequest, SearcherCache, TableSearcher};
use storage::{CellValue, SqliteRowSource};

pub use error::{EngineError, EngineResult};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "tsearch",
    version,
    about = "Bulk-index SQL tables and document trees into tantivy, then search them"
)]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding one index per table
    #[arg(long, global = true)]
    pub index_base: Option<PathBuf>,

    /// Path to the SQLite database rows are read from
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a table, one page of rows at a time
    Index {
        #[arg(long)]
        table: String,

        /// Unique column rows are ordered and identified by
        #[arg(long)]
        key: String,

        /// Columns to make searchable
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// Keep existing documents, replacing those with the same key
        #[arg(long)]
        append: bool,

        /// Start at this key (inclusive); used to resume an earlier run
        #[arg(long)]
        start_key: Option<String>,

        /// Stop after this many rows
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },
    /// Index every file under a directory
    IndexFiles {
        #[arg(long)]
        docs: PathBuf,

        #[arg(long, default_value = DEFAULT_FILE_INDEX)]
        name: String,

        #[arg(long)]
        append: bool,

        #[arg(long)]
        json: bool,
    },
    /// Search a table index and print matching keys
    Search {
        #[arg(long)]
        table: String,

        #[arg(long)]
        query: String,

        #[arg(long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Stored key field to print
        #[arg(long)]
        key: String,

        /// Require every term in every field instead of any term in any field
        #[arg(long)]
        all: bool,

        /// Maximum hits (0 uses the configured default)
        #[arg(long, default_value_t = 0)]
        top: usize,

        #[arg(long)]
        json: bool,
    },
    /// Search a file index and print matching paths
    SearchFiles {
        #[arg(long)]
        query: String,

        #[arg(long, default_value = DEFAULT_FILE_INDEX)]
        name: String,

        #[arg(long, default_value_t = 0)]
        top: usize,

        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(base) = cli.index_base {
        cfg.index_base = base;
    }
    if let Some(db) = cli.db {
        cfg.db_path = db;
    }

    match cli.command {
        Commands::Index {
            table,
            key,
            columns,
            append,
            start_key,
            limit,
            json,
        } => {
            let request = BulkIndexRequest {
                table,
                key_column: key,
                content_columns: columns,
                mode: write_mode(append),
                start_key: start_key.as_deref().map(CellValue::from_cli_key),
                row_limit: limit,
            };
            run_index(&cfg, &request, json)
        }
        Commands::IndexFiles {
            docs,
            name,
            append,
            json,
        } => {
            let report = FileIndexer::new(&cfg.index_base)
                .with_options(cfg.index_options())
                .index_tree(&docs, &name, write_mode(append))
                .with_context(|| format!("indexing files under {}", docs.display()))?;
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "indexed {} files ({} skipped) in {} ms",
                    report.files_indexed, report.files_skipped, report.elapsed_ms
                );
            }
            Ok(())
        }
        Commands::Search {
            table,
            query,
            fields,
            key,
            all,
            top,
            json,
        } => {
            let searcher = table_searcher(&cfg);
            let combine = if all { Combine::All } else { Combine::Any };
            let hits = searcher
                .search_hits(&SearchRequest {
                    table: &table,
                    query: &query,
                    fields: &fields,
                    key_field: &key,
                    combine,
                    top_n: top,
                })
                .with_context(|| format!("searching {table}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for hit in hits {
                    println!("{}", hit.key);
                }
            }
            Ok(())
        }
        Commands::SearchFiles {
            query,
            name,
            top,
            json,
        } => {
            let paths = table_searcher(&cfg)
                .search_files(&name, &query, top)
                .with_context(|| format!("searching file index {name}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&paths)?);
            } else {
                for path in paths {
                    println!("{path}");
                }
            }
            Ok(())
        }
    }
}

fn run_index(cfg: &Config, request: &BulkIndexRequest, json: bool) -> Result<()> {
    let source = SqliteRowSource::open(&cfg.db_path);
    let report = BulkIndexer::new(source, &cfg.index_base)
        .with_options(cfg.index_options())
        .bulk_index(request)
        .with_context(|| format!("indexing table {}", request.table))?;
    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }
    println!(
        "indexed {} rows in {} pages ({} skipped) in {} ms",
        report.rows_indexed, report.pages, report.rows_skipped, report.elapsed_ms
    );
    if let Some(next) = &report.resume_key {
        println!("resume with --append --start-key {next}");
    }
    Ok(())
}

fn table_searcher(cfg: &Config) -> TableSearcher {
    let cache = Arc::new(SearcherCache::new(cfg.refresh_interval()));
    TableSearcher::new(cache, &cfg.index_base).with_default_top_n(cfg.default_top_n)
}

fn write_mode(append: bool) -> WriteMode {
    if append {
        WriteMode::Append
    } else {
        WriteMode::Recreate
    }
}
