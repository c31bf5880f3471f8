// SPDX-License-Identifier: MIT OR Apache-2.0
//! Post-load verification: row accounting, a timed benchmark probe, and
//! storage footprint.

use serde::Serialize;
use std::time::Instant;
use tracing::warn;

use crate::error::Result;
use crate::query::Condition;
use crate::store::Store;
use crate::types::{ChunkResult, ChunkStatus};

/// Probe value for the timed lookup. A selective-but-common equality gives
/// a stable signal on whether the country index is being used.
const BENCHMARK_COUNTRY: &str = "US";

#[derive(Debug, Serialize)]
pub struct VerificationReport {
    /// Sum of rows the successful chunks reported loading.
    pub expected_rows: u64,
    /// What the final store actually holds.
    pub actual_rows: u64,
    pub mismatch: bool,
    pub benchmark_rows: u64,
    pub benchmark_ms: f64,
    pub table_bytes: Option<u64>,
    /// Table bytes over input bytes, when both are known.
    pub storage_ratio: Option<f64>,
}

/// Compare the final store against what the chunks claimed, run the timed
/// probe, and report the storage footprint when the engine exposes it.
pub fn verify(store: &Store, results: &[ChunkResult], input_bytes: u64) -> Result<VerificationReport> {
    let expected_rows: u64 = results
        .iter()
        .filter(|r| r.status == ChunkStatus::Success)
        .map(|r| r.rows_loaded)
        .sum();
    let actual_rows = store.count_rows()?;

    let mismatch = expected_rows != actual_rows;
    if mismatch {
        warn!("row count mismatch: chunks reported {expected_rows}, store holds {actual_rows}");
    }

    let probe = Condition::exact("country", BENCHMARK_COUNTRY)?;
    let started = Instant::now();
    let benchmark_rows = store.count_matching(&probe)?;
    let benchmark_ms = started.elapsed().as_secs_f64() * 1000.0;

    let table_bytes = store.table_size();
    let storage_ratio = match table_bytes {
        Some(bytes) if input_bytes > 0 => Some(bytes as f64 / input_bytes as f64),
        _ => None,
    };

    Ok(VerificationReport {
        expected_rows,
        actual_rows,
        mismatch,
        benchmark_rows,
        benchmark_ms,
        table_bytes,
        storage_ratio,
    })
}
