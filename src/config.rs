// SPDX-License-Identifier: MIT OR Apache-2.0
//! Load pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LoadError, Result};
use crate::input::Codec;
use crate::schema;

pub const DEFAULT_DB_PATH: &str = "domains.duckdb";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_CHUNK_ROWS: u64 = 250_000;
pub const DEFAULT_MEMORY_LIMIT: &str = "8GB";
pub const DEFAULT_TEMP_DIR: &str = "./temp_dbs";

/// Everything `pipeline::run` needs to load one file. Fields are public;
/// callers tweak what they care about and `validate` rejects the rest.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Delimited input file, possibly compressed (see `compression`).
    pub input: PathBuf,
    /// Final store path.
    pub db_path: PathBuf,
    /// Maximum concurrent chunk workers.
    pub workers: usize,
    /// Target rows per chunk. Zero plans one chunk per worker instead of
    /// deriving the chunk count from the sampled row estimate.
    pub chunk_rows: u64,
    /// Engine memory limit applied to every connection.
    pub memory_limit: String,
    /// Directory for extracted chunk streams and partial stores.
    pub temp_dir: PathBuf,
    /// Input compression codec.
    pub compression: Codec,
    /// Bypass chunking: one bulk copy straight into the final store.
    pub direct: bool,
    /// Fields to index after the merge; empty skips indexing.
    pub index_fields: Vec<String>,
    /// Sample percentage in (0, 100] for index pre-builds; `None` builds
    /// against the full table only.
    pub sample_percent: Option<f64>,
    /// Skip the statistics refresh after indexing.
    pub skip_analyze: bool,
    /// Refresh interval of the progress monitor.
    pub progress_interval: Duration,
}

impl LoadConfig {
    /// Configuration with the CLI defaults for `input`.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            workers: DEFAULT_WORKERS,
            chunk_rows: DEFAULT_CHUNK_ROWS,
            memory_limit: DEFAULT_MEMORY_LIMIT.to_string(),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            compression: Codec::None,
            direct: false,
            index_fields: schema::DEFAULT_INDEX_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            sample_percent: None,
            skip_analyze: false,
            progress_interval: Duration::from_secs(1),
        }
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(LoadError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }
        if self.memory_limit.trim().is_empty() {
            return Err(LoadError::InvalidConfig(
                "memory limit must not be empty".into(),
            ));
        }
        for field in &self.index_fields {
            if !schema::is_valid_field(field) {
                return Err(LoadError::InvalidField(field.clone()));
            }
        }
        if let Some(percent) = self.sample_percent {
            if !(percent > 0.0 && percent <= 100.0) {
                return Err(LoadError::InvalidConfig(format!(
                    "sample percentage {percent} outside (0, 100]"
                )));
            }
        }
        if self.progress_interval.is_zero() {
            return Err(LoadError::InvalidConfig(
                "progress interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
