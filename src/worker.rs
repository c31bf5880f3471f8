// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chunk workers: extract one byte range and load it into a private store.
//!
//! Share-nothing by construction. A worker touches its own extracted stream
//! and its own partial store, publishes progress through its own slot, and
//! reports exactly one `ChunkResult`. Failures stay inside the chunk.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use memchr::memchr_iter;
use tracing::{debug, error, warn};

use crate::error::{LoadError, Result};
use crate::plan::Chunk;
use crate::progress::ProgressTracker;
use crate::schema::RECORD_TERMINATOR;
use crate::store::{Store, StoreLimits};
use crate::types::{CancelToken, ChunkResult};

/// Extraction block size. Large blocks keep the copy sequential on disk
/// and amortize the per-block progress store.
const EXTRACT_BLOCK: usize = 8 * 1024 * 1024;

/// Extracted stream for a chunk. Deterministic by index so reruns and
/// failure inspection know where to look.
pub fn chunk_csv_path(temp_dir: &Path, index: usize) -> PathBuf {
    temp_dir.join(format!("chunk_{index}.csv"))
}

/// Partial store for a chunk.
pub fn chunk_store_path(temp_dir: &Path, index: usize) -> PathBuf {
    temp_dir.join(format!("chunk_{index}.duckdb"))
}

/// Load one chunk end to end: extract the byte range, bulk-copy it into a
/// fresh partial store, count what actually landed.
///
/// Every error becomes a `Failed` result here; nothing escapes to the
/// caller. On failure both artifacts stay on disk for inspection; on
/// success the extracted stream is removed and the partial store awaits
/// the merge.
pub fn run_chunk(
    input_path: &Path,
    chunk: Chunk,
    temp_dir: &Path,
    limits: &StoreLimits,
    tracker: &ProgressTracker,
    cancel: &CancelToken,
) -> ChunkResult {
    if cancel.is_cancelled() {
        return ChunkResult::skipped(chunk.index);
    }

    let started = Instant::now();
    tracker.start_chunk(chunk.index);

    match load_chunk(input_path, chunk, temp_dir, limits, tracker, cancel) {
        Ok(Some(rows)) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracker.finish_chunk(chunk.index, rows);
            debug!(
                "chunk {} loaded {} rows in {}ms",
                chunk.index, rows, elapsed_ms
            );
            ChunkResult::success(chunk.index, rows, elapsed_ms)
        }
        Ok(None) => ChunkResult::skipped(chunk.index),
        Err(e) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            error!("chunk {} failed after {}ms: {e}", chunk.index, elapsed_ms);
            ChunkResult::failed(chunk.index, elapsed_ms, e.to_string())
        }
    }
}

/// `Ok(None)` means cancelled between extraction and load; the extracted
/// stream is left behind for a rerun.
fn load_chunk(
    input_path: &Path,
    chunk: Chunk,
    temp_dir: &Path,
    limits: &StoreLimits,
    tracker: &ProgressTracker,
    cancel: &CancelToken,
) -> Result<Option<u64>> {
    let csv = chunk_csv_path(temp_dir, chunk.index);
    extract_range(input_path, chunk, &csv, tracker).map_err(|source| {
        LoadError::ChunkExtraction {
            chunk: chunk.index,
            source,
        }
    })?;

    if cancel.is_cancelled() {
        return Ok(None);
    }

    let store_path = chunk_store_path(temp_dir, chunk.index);
    let rows = bulk_load(&store_path, &csv, limits).map_err(|source| LoadError::ChunkLoad {
        chunk: chunk.index,
        source: Box::new(source),
    })?;

    // The stream has served its purpose; the partial store is what the
    // merge wants.
    if let Err(e) = std::fs::remove_file(&csv) {
        warn!(
            "chunk {}: could not remove extracted stream {}: {e}",
            chunk.index,
            csv.display()
        );
    }

    Ok(Some(rows))
}

/// Stream `[chunk.start, chunk.end)` of `input` into `dst`, publishing the
/// running record count as each block lands.
fn extract_range(
    input: &Path,
    chunk: Chunk,
    dst: &Path,
    tracker: &ProgressTracker,
) -> std::io::Result<()> {
    let mut src = File::open(input)?;
    src.seek(SeekFrom::Start(chunk.start))?;
    let mut out = BufWriter::with_capacity(EXTRACT_BLOCK, File::create(dst)?);

    let mut block = vec![0u8; EXTRACT_BLOCK];
    let mut remaining = chunk.len_bytes();
    let mut rows = 0u64;
    let mut last_byte = 0u8;

    while remaining > 0 {
        let want = (block.len() as u64).min(remaining) as usize;
        let buf = &mut block[..want];
        src.read_exact(buf)?;
        out.write_all(buf)?;

        rows += memchr_iter(RECORD_TERMINATOR, buf).count() as u64;
        tracker.record_rows(chunk.index, rows);

        last_byte = buf[want - 1];
        remaining -= want as u64;
    }

    // The final record of the file may lack its terminator.
    if chunk.len_bytes() > 0 && last_byte != RECORD_TERMINATOR {
        tracker.record_rows(chunk.index, rows + 1);
    }

    out.flush()?;
    Ok(())
}

/// Build the chunk's private store and bulk-copy the extracted stream in.
/// Returns the engine's row count, which stays authoritative even when the
/// engine dropped malformed rows the extraction counted.
fn bulk_load(store_path: &Path, csv: &Path, limits: &StoreLimits) -> Result<u64> {
    // A leftover partial store from an earlier run would double-count.
    if store_path.exists() {
        std::fs::remove_file(store_path)?;
    }
    let store = Store::open(store_path, limits)?;
    store.bulk_load_delimited(csv, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths_are_deterministic() {
        let dir = Path::new("/work/temp_dbs");
        assert_eq!(
            chunk_csv_path(dir, 3),
            PathBuf::from("/work/temp_dbs/chunk_3.csv")
        );
        assert_eq!(
            chunk_store_path(dir, 3),
            PathBuf::from("/work/temp_dbs/chunk_3.duckdb")
        );
    }

    #[test]
    fn extract_range_counts_records_and_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        std::fs::write(&input, "aa;1\nbb;2\ncc;3\ndd;4\n").unwrap();

        // Second and third records: bytes [5, 15).
        let chunk = Chunk {
            index: 0,
            start: 5,
            end: 15,
        };
        let dst = dir.path().join("chunk_0.csv");
        let tracker = ProgressTracker::new(1, 4);

        extract_range(&input, chunk, &dst, &tracker).unwrap();

        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "bb;2\ncc;3\n");
        assert_eq!(tracker.rows_so_far(), 2);
    }

    #[test]
    fn extract_range_counts_unterminated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        std::fs::write(&input, "aa;1\nbb;2").unwrap();

        let chunk = Chunk {
            index: 0,
            start: 0,
            end: 9,
        };
        let dst = dir.path().join("chunk_0.csv");
        let tracker = ProgressTracker::new(1, 2);

        extract_range(&input, chunk, &dst, &tracker).unwrap();
        assert_eq!(tracker.rows_so_far(), 2);
    }

    #[test]
    fn cancelled_before_start_reports_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        std::fs::write(&input, "aa;1\n").unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let tracker = ProgressTracker::new(1, 1);

        let result = run_chunk(
            &input,
            Chunk {
                index: 0,
                start: 0,
                end: 5,
            },
            dir.path(),
            &StoreLimits::default(),
            &tracker,
            &cancel,
        );
        assert_eq!(result.status, crate::types::ChunkStatus::Skipped);
        assert!(!chunk_csv_path(dir.path(), 0).exists(), "nothing extracted");
    }
}
