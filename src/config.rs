//! Export configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default number of rows fetched per streamed chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Settings shared by the partitioned and chunked export paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Rows per streamed chunk (default: 50,000). Bounds peak memory to
    /// roughly one chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Column the partition predicate filters on (default: "rowid").
    /// May be alias-qualified, e.g. "en.rowid".
    #[serde(default = "default_rowid_column")]
    pub rowid_column: String,

    /// Partitions allowed in flight at once (default: 1, strictly sequential).
    #[serde(default = "default_max_concurrent_partitions")]
    pub max_concurrent_partitions: usize,

    /// Directory for temporary chunk artifacts (None = platform temp dir).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Drop the first row of every partition result, as older exports did.
    #[serde(default)]
    pub legacy_skip_first_row: bool,

    /// Log SQL statements at debug level, with string literals redacted.
    #[serde(default)]
    pub log_sql: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_rowid_column() -> String {
    "rowid".to_string()
}

fn default_max_concurrent_partitions() -> usize {
    1
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            rowid_column: default_rowid_column(),
            max_concurrent_partitions: default_max_concurrent_partitions(),
            temp_dir: None,
            legacy_skip_first_row: false,
            log_sql: false,
        }
    }
}

impl ExportConfig {
    /// Loads and validates a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, is not valid
    /// JSON, or fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ExportConfig = serde_json::from_str(&text).map_err(|e| {
            AppError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be at least 1".into()));
        }
        if self.max_concurrent_partitions == 0 {
            return Err(AppError::Config(
                "max_concurrent_partitions must be at least 1".into(),
            ));
        }
        if self.rowid_column.trim().is_empty() {
            return Err(AppError::Config("rowid_column must not be empty".into()));
        }
        Ok(())
    }

    /// Directory temp artifacts are allocated in.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_max_concurrent_partitions(mut self, n: usize) -> Self {
        self.max_concurrent_partitions = n;
        self
    }
}
