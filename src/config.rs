//! Runtime configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `TSEARCH_*` environment variables (a `.env` file is honoured through
//! `dotenvy`). Command-line flags are applied last by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::indexer::{DEFAULT_PAGE_SIZE, DEFAULT_WRITER_HEAP_BYTES, IndexOptions, RowErrorPolicy};
use crate::search::DEFAULT_TOP_N;
use crate::search::tantivy::MIN_WRITER_HEAP_BYTES;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index_base: PathBuf,
    pub db_path: PathBuf,
    pub page_size: usize,
    pub default_top_n: usize,
    pub writer_heap_bytes: usize,
    pub refresh_interval_ms: u64,
    pub merge_on_close: bool,
    pub row_error_policy: RowErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            index_base: data_dir.join("index"),
            db_path: data_dir.join("source.db"),
            page_size: DEFAULT_PAGE_SIZE,
            default_top_n: DEFAULT_TOP_N,
            writer_heap_bytes: DEFAULT_WRITER_HEAP_BYTES,
            refresh_interval_ms: 0,
            merge_on_close: true,
            row_error_policy: RowErrorPolicy::Abort,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then the environment.
    ///
    /// An explicit `path` must exist. Without one, the platform config file
    /// is read when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        cfg.apply_env(|key| dotenvy::var(key).ok());
        Ok(cfg.clamped())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `TSEARCH_*` overrides read through `lookup`. Values that do not
    /// parse are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("TSEARCH_INDEX_BASE") {
            self.index_base = PathBuf::from(path);
        }

        if let Some(path) = lookup("TSEARCH_DB") {
            self.db_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("TSEARCH_PAGE_SIZE") {
            set_parsed("TSEARCH_PAGE_SIZE", &val, &mut self.page_size);
        }

        if let Some(val) = lookup("TSEARCH_TOP_N") {
            set_parsed("TSEARCH_TOP_N", &val, &mut self.default_top_n);
        }

        if let Some(val) = lookup("TSEARCH_WRITER_HEAP") {
            set_parsed("TSEARCH_WRITER_HEAP", &val, &mut self.writer_heap_bytes);
        }

        if let Some(val) = lookup("TSEARCH_REFRESH_INTERVAL_MS") {
            set_parsed("TSEARCH_REFRESH_INTERVAL_MS", &val, &mut self.refresh_interval_ms);
        }

        if let Some(val) = lookup("TSEARCH_MERGE_ON_CLOSE") {
            match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.merge_on_close = true,
                "0" | "false" | "no" | "off" => self.merge_on_close = false,
                _ => warn!(value = %val, "ignoring invalid TSEARCH_MERGE_ON_CLOSE"),
            }
        }

        if let Some(val) = lookup("TSEARCH_ROW_ERRORS") {
            match val.trim().to_ascii_lowercase().as_str() {
                "abort" => self.row_error_policy = RowErrorPolicy::Abort,
                "skip" => self.row_error_policy = RowErrorPolicy::Skip,
                _ => warn!(value = %val, "ignoring invalid TSEARCH_ROW_ERRORS"),
            }
        }
    }

    fn clamped(mut self) -> Self {
        self.page_size = self.page_size.max(1);
        self.default_top_n = self.default_top_n.max(1);
        self.writer_heap_bytes = self.writer_heap_bytes.max(MIN_WRITER_HEAP_BYTES);
        self
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            page_size: self.page_size.max(1),
            writer_heap_bytes: self.writer_heap_bytes.max(MIN_WRITER_HEAP_BYTES),
            merge_on_close: self.merge_on_close,
            row_errors: self.row_error_policy,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn set_parsed<T: std::str::FromStr>(key: &str, raw: &str, slot: &mut T) {
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!(key, value = raw, "ignoring unparseable value"),
    }
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "table-search", "table-search")
        .map_or_else(|| PathBuf::from(".tsearch"), |dirs| dirs.data_dir().to_path_buf())
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "table-search", "table-search")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
