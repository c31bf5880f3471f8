// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequential merge of partial stores into the final store.
//!
//! One writer, ordered by chunk index: attach read-only, copy, detach,
//! delete. A partial store that is missing, truncated, or unreadable is
//! skipped and recorded; the merge never aborts the run for one bad chunk.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{LoadError, Result};
use crate::store::Store;
use crate::types::{ChunkResult, ChunkStatus};
use crate::worker::chunk_store_path;

/// Partial stores below this size never held a loaded table; the engine's
/// empty file header alone is larger. Treat them as failed chunks.
const MIN_PARTIAL_STORE_BYTES: u64 = 1000;

/// A chunk whose rows did not reach the final store, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedChunk {
    pub chunk_index: usize,
    /// Rows the chunk claimed to have loaded, now absent from the final
    /// store. Zero when the chunk never loaded anything.
    pub rows_lost: u64,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct MergeReport {
    pub merged_chunks: usize,
    pub skipped: Vec<SkippedChunk>,
    pub rows_merged: u64,
    pub elapsed_ms: u64,
}

/// Fold every successful chunk's partial store into `final_store`,
/// ascending by chunk index. Non-success chunks and unreadable partials
/// land in `skipped`; everything merged is deleted from `temp_dir`.
pub fn merge_partial_stores(
    final_store: &Store,
    results: &[ChunkResult],
    temp_dir: &Path,
) -> MergeReport {
    let started = Instant::now();
    let mut report = MergeReport::default();

    let mut ordered: Vec<&ChunkResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.chunk_index);

    for result in ordered {
        if result.status != ChunkStatus::Success {
            report.skipped.push(SkippedChunk {
                chunk_index: result.chunk_index,
                rows_lost: 0,
                reason: match result.status {
                    ChunkStatus::Skipped => "chunk skipped before load".to_string(),
                    _ => format!(
                        "chunk failed: {}",
                        result.error_detail.as_deref().unwrap_or("unknown error")
                    ),
                },
            });
            continue;
        }

        match merge_one(final_store, result.chunk_index, temp_dir) {
            Ok(rows) => {
                if rows != result.rows_loaded {
                    warn!(
                        "chunk {}: merged {} rows but the load reported {}",
                        result.chunk_index, rows, result.rows_loaded
                    );
                }
                report.merged_chunks += 1;
                report.rows_merged += rows;
            }
            Err(e) => {
                warn!("chunk {}: not merged: {e}", result.chunk_index);
                report.skipped.push(SkippedChunk {
                    chunk_index: result.chunk_index,
                    rows_lost: result.rows_loaded,
                    reason: e.to_string(),
                });
            }
        }
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        "merged {} chunks ({} rows) in {}ms, {} skipped",
        report.merged_chunks,
        report.rows_merged,
        report.elapsed_ms,
        report.skipped.len()
    );
    report
}

/// Merge a single partial store and delete it. Returns the rows copied.
fn merge_one(final_store: &Store, index: usize, temp_dir: &Path) -> Result<u64> {
    let path = chunk_store_path(temp_dir, index);

    let meta = std::fs::metadata(&path).map_err(|_| LoadError::Merge {
        chunk: index,
        detail: format!("partial store missing: {}", path.display()),
    })?;
    if meta.len() < MIN_PARTIAL_STORE_BYTES {
        return Err(LoadError::Merge {
            chunk: index,
            detail: format!("partial store truncated ({} bytes)", meta.len()),
        });
    }

    let alias = format!("part_{index}");
    final_store.attach_read_only(&path, &alias)?;

    // Detach must run whether or not the copy worked, so the alias never
    // leaks into the next iteration.
    let copied = (|| -> Result<u64> {
        let available = final_store.count_attached(&alias)?;
        let inserted = final_store.copy_from_attached(&alias)?;
        if inserted != available {
            warn!(
                "chunk {index}: partial store held {available} rows, copied {inserted}"
            );
        }
        Ok(inserted)
    })();
    let detached = final_store.detach(&alias);

    let copied = copied?;
    detached?;

    if let Err(e) = std::fs::remove_file(&path) {
        // The rows are in; a leftover file is an annoyance, not data loss.
        warn!("chunk {index}: merged but could not delete {}: {e}", path.display());
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkResult;

    #[test]
    fn non_success_chunks_are_recorded_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("final.duckdb"), &Default::default()).unwrap();

        let results = vec![
            ChunkResult::failed(0, 12, "disk full".to_string()),
            ChunkResult::skipped(1),
        ];
        let report = merge_partial_stores(&store, &results, dir.path());

        assert_eq!(report.merged_chunks, 0);
        assert_eq!(report.rows_merged, 0);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped[0].reason.contains("disk full"));
        assert!(report.skipped[1].reason.contains("skipped"));
    }

    #[test]
    fn missing_partial_store_becomes_a_skip_with_rows_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("final.duckdb"), &Default::default()).unwrap();

        let results = vec![ChunkResult::success(0, 4242, 7)];
        let report = merge_partial_stores(&store, &results, dir.path());

        assert_eq!(report.merged_chunks, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].rows_lost, 4242);
        assert!(report.skipped[0].reason.contains("missing"));
    }

    #[test]
    fn truncated_partial_store_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("final.duckdb"), &Default::default()).unwrap();

        std::fs::write(chunk_store_path(dir.path(), 0), b"not a store").unwrap();
        let results = vec![ChunkResult::success(0, 10, 1)];
        let report = merge_partial_stores(&store, &results, dir.path());

        assert_eq!(report.merged_chunks, 0);
        assert!(report.skipped[0].reason.contains("truncated"));
    }
}
