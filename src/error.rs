// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for the load pipeline.
//!
//! Errors that must isolate to a single chunk (extraction, bulk load, merge)
//! carry the chunk index so reports can attribute them. Workers convert these
//! into failed chunk results instead of propagating, which is what keeps one
//! bad chunk from sinking the whole load.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no record terminator within {window} bytes after offset {offset}")]
    BoundaryNotFound { offset: u64, window: u64 },

    #[error("chunk {chunk}: range extraction failed: {source}")]
    ChunkExtraction {
        chunk: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("chunk {chunk}: bulk load into partial store failed: {source}")]
    ChunkLoad {
        chunk: usize,
        #[source]
        source: Box<LoadError>,
    },

    #[error("chunk {chunk}: merge failed: {detail}")]
    Merge { chunk: usize, detail: String },

    #[error("index on '{field}' failed: {source}")]
    Index {
        field: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("unknown field '{0}'")]
    InvalidField(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(#[from] duckdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoadError>;
