// SPDX-License-Identifier: MIT OR Apache-2.0
//! Core record and result types shared across the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One row of the domain dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub domain: String,
    pub nameservers: String,
    pub ip: String,
    pub country: String,
    pub server: String,
    pub field5: String,
    pub field6: String,
    pub field7: String,
    pub field8: String,
}

impl DomainRecord {
    /// Entries of the comma-joined `nameservers` field.
    pub fn nameserver_list(&self) -> Vec<&str> {
        self.nameservers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Terminal state of one chunk after the load phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Partial store built and counted; ready to merge.
    Success,
    /// Extraction or bulk load failed; artifacts stay on disk for inspection.
    Failed,
    /// Never attempted (cancellation).
    Skipped,
}

/// Outcome of one chunk worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_index: usize,
    /// Rows in the partial store, counted by the engine after the bulk
    /// copy. Zero for failed and skipped chunks.
    pub rows_loaded: u64,
    pub elapsed_ms: u64,
    pub status: ChunkStatus,
    pub error_detail: Option<String>,
}

impl ChunkResult {
    pub fn success(chunk_index: usize, rows_loaded: u64, elapsed_ms: u64) -> Self {
        Self {
            chunk_index,
            rows_loaded,
            elapsed_ms,
            status: ChunkStatus::Success,
            error_detail: None,
        }
    }

    pub fn failed(chunk_index: usize, elapsed_ms: u64, detail: impl Into<String>) -> Self {
        Self {
            chunk_index,
            rows_loaded: 0,
            elapsed_ms,
            status: ChunkStatus::Failed,
            error_detail: Some(detail.into()),
        }
    }

    pub fn skipped(chunk_index: usize) -> Self {
        Self {
            chunk_index,
            rows_loaded: 0,
            elapsed_ms: 0,
            status: ChunkStatus::Skipped,
            error_detail: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ChunkStatus::Success
    }
}

/// Cooperative cancellation flag handed down the pipeline. Clones share
/// the flag; there is no process-global token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask everything holding this token to stop at the next safe point.
    /// Workers check between phases; a chunk already past its last check
    /// finishes normally.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
