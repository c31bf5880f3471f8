// SPDX-License-Identifier: MIT OR Apache-2.0
//
// ==============================================================================
//                            DOMSTORE LOAD PIPELINE
// ==============================================================================
//
// End-to-end bulk load of one delimited input into one final store, built
// around the engine's single-writer constraint: the parallel phase never
// touches the final store, and the merge phase is the only writer.
//
// ## STAGES
//
//   [Input Prep] -> [Chunk Plan] -> [Parallel Chunk Load] -> [Merge] -> [Index] -> [Verify]
//        │               │                   │                  │           │          │
//   Decompress      Boundary scan      N loader threads     Sequential   Optional   Row counts,
//   if needed       (main thread)      (share nothing)      attach/copy  sampling   timed probe
//
// ### Input prep
// Compressed inputs are decompressed into the temp directory once, so the
// chunk phase always works on a seekable plain stream. A head window gives
// the row estimate that drives progress totals and row-based planning.
//
// ### Chunk plan
// Equal byte targets snapped forward to record boundaries. Chunks cover the
// stream exactly, so every record lands in exactly one chunk.
//
// ### Parallel chunk load
// A bounded channel feeds chunks to loader threads. Each worker extracts
// its byte range to a private stream, bulk-copies it into a private partial
// store, and reports one ChunkResult. A failed chunk costs only its own
// rows. Workers publish running row counts through per-chunk slots; a
// monitor thread turns those into throughput/ETA events and stall warnings.
//
// ### Merge
// Single-threaded, ascending chunk order: attach the partial store
// read-only, copy its table into the final store, detach, delete. Missing
// or truncated partials are skipped and recorded, never fatal.
//
// ### Index / verify
// Indexes build per field with an optional sampled pre-pass; failures are
// collected per field. Verification compares the final row count against
// what the chunks reported and times one probe query.
//
// ## FAILURE POLICY
//
// The pipeline prefers partial data over no data. Chunk failures, merge
// skips, and index failures are all recorded in the report; only setup
// errors (bad config, unreadable input, unopenable final store) abort the
// run. Callers decide the exit status from `LoadReport::has_data_loss`.
//
// ==============================================================================

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::bounded;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::LoadConfig;
use crate::error::Result;
use crate::index::{build_indexes, IndexReport};
use crate::input::InputFile;
use crate::merge::{merge_partial_stores, MergeReport};
use crate::plan::{plan_by_rows, plan_for_workers, ChunkPlan};
use crate::progress::{ProgressMonitor, ProgressSink, ProgressTracker};
use crate::store::{Store, StoreLimits};
use crate::types::{CancelToken, ChunkResult};
use crate::verify::{verify, VerificationReport};
use crate::worker::run_chunk;

/// Everything one load did, serializable for `--json` consumers.
#[derive(Debug, Serialize)]
pub struct LoadReport {
    pub chunks: Vec<ChunkResult>,
    pub merge: MergeReport,
    pub index: Option<IndexReport>,
    pub verification: Option<VerificationReport>,
    /// Rows that reached the final store.
    pub rows_loaded: u64,
    pub elapsed_ms: u64,
}

impl LoadReport {
    /// True when any input rows did not reach the final store: a chunk
    /// failed or was skipped, or the merge left a partial store behind.
    pub fn has_data_loss(&self) -> bool {
        self.chunks.iter().any(|c| !c.is_success()) || !self.merge.skipped.is_empty()
    }

    pub fn rows_per_sec(&self) -> f64 {
        if self.elapsed_ms > 0 {
            self.rows_loaded as f64 / (self.elapsed_ms as f64 / 1000.0)
        } else {
            0.0
        }
    }
}

/// Run one load end to end. `sink` receives progress events until the
/// chunk phase ends; `cancel` stops chunks that have not started yet
/// (running chunks finish, already-loaded data still merges).
pub fn run(
    config: &LoadConfig,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
) -> Result<LoadReport> {
    config.validate()?;
    std::fs::create_dir_all(&config.temp_dir)?;
    let started = Instant::now();

    let final_limits = StoreLimits {
        memory_limit: config.memory_limit.clone(),
        threads: Some((num_cpus::get() / 2).max(1)),
    };

    if config.direct {
        return run_direct(config, &final_limits, started);
    }

    let input = InputFile::open(&config.input, config.compression, &config.temp_dir)?;
    let plan = if config.chunk_rows > 0 {
        plan_by_rows(&input, config.chunk_rows)?
    } else {
        plan_for_workers(&input, config.workers)?
    };

    if plan.is_empty() {
        info!("input {} is empty; creating empty store", config.input.display());
        Store::open(&config.db_path, &final_limits)?;
        return Ok(LoadReport {
            chunks: Vec::new(),
            merge: MergeReport::default(),
            index: None,
            verification: None,
            rows_loaded: 0,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }

    info!(
        "loading {} ({} bytes, ~{} rows): {} chunks, {} workers",
        config.input.display(),
        input.size_bytes,
        input.estimated_rows,
        plan.len(),
        config.workers.min(plan.len())
    );

    let tracker = ProgressTracker::new(plan.len(), input.estimated_rows);
    let monitor = ProgressMonitor::spawn(tracker.clone(), sink, config.progress_interval)?;

    let results = run_load_phase(&input, &plan, config, &tracker, &cancel);

    monitor.stop();

    let store = Store::open(&config.db_path, &final_limits)?;
    let merge = merge_partial_stores(&store, &results, &config.temp_dir);

    let index = if config.index_fields.is_empty() || cancel.is_cancelled() {
        None
    } else {
        Some(build_indexes(
            &store,
            &config.index_fields,
            config.sample_percent,
            config.skip_analyze,
        ))
    };

    let verification = match verify(&store, &results, input.size_bytes) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!("verification failed: {e}");
            None
        }
    };

    let rows_loaded = merge.rows_merged;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        "load complete: {} rows in {:.1}s",
        rows_loaded,
        elapsed_ms as f64 / 1000.0
    );

    // Release the decompressed scratch (if any) before sweeping, so an
    // artifact-free run leaves no temp directory behind.
    drop(input);
    cleanup_temp_dir(&config.temp_dir);

    Ok(LoadReport {
        chunks: results,
        merge,
        index,
        verification,
        rows_loaded,
        elapsed_ms,
    })
}

/// Parallel phase: feed chunks to loader threads, collect one result per
/// chunk. Always returns exactly `plan.len()` results, sorted by index.
fn run_load_phase(
    input: &InputFile,
    plan: &ChunkPlan,
    config: &LoadConfig,
    tracker: &Arc<ProgressTracker>,
    cancel: &CancelToken,
) -> Vec<ChunkResult> {
    let workers = config.workers.min(plan.len()).max(1);
    // The engine's internal parallelism multiplies across workers; divide
    // the cores so N partial loads do not oversubscribe the machine.
    let worker_limits = StoreLimits {
        memory_limit: config.memory_limit.clone(),
        threads: Some((num_cpus::get() / workers).max(1)),
    };

    let (chunk_tx, chunk_rx) = bounded(plan.len());
    let (result_tx, result_rx) = bounded(plan.len());

    for chunk in &plan.chunks {
        chunk_tx.send(*chunk).expect("chunk channel sized to fit");
    }
    drop(chunk_tx); // Loaders exit once the queue drains

    let loader_threads: Vec<_> = (0..workers)
        .map(|id| {
            let chunk_rx = chunk_rx.clone();
            let result_tx = result_tx.clone();
            let input_path = input.path().to_path_buf();
            let temp_dir = config.temp_dir.clone();
            let limits = worker_limits.clone();
            let tracker = tracker.clone();
            let cancel = cancel.clone();

            thread::Builder::new()
                .name(format!("loader-{id}"))
                .spawn(move || {
                    while let Ok(chunk) = chunk_rx.recv() {
                        let result =
                            run_chunk(&input_path, chunk, &temp_dir, &limits, &tracker, &cancel);
                        if result_tx.send(result).is_err() {
                            return; // Collector gone; nothing left to report to
                        }
                    }
                })
                .expect("Failed to spawn loader thread")
        })
        .collect();

    drop(result_tx);
    drop(chunk_rx);

    let mut results: Vec<ChunkResult> = result_rx.iter().collect();

    for handle in loader_threads {
        if handle.join().is_err() {
            warn!("a loader thread panicked; its unreported chunks count as failed");
        }
    }

    // A panicked loader reports nothing; the merge and the exit status
    // still need one result per chunk.
    if results.len() < plan.len() {
        let mut reported = vec![false; plan.len()];
        for result in &results {
            reported[result.chunk_index] = true;
        }
        for (index, reported) in reported.iter().enumerate() {
            if !reported {
                results.push(ChunkResult::failed(
                    index,
                    0,
                    "loader thread died before reporting",
                ));
            }
        }
    }

    results.sort_by_key(|r| r.chunk_index);
    results
}

/// Single-connection load: hand the whole input (compressed or not) to the
/// engine's bulk copy. The baseline path and the fallback when the
/// parallel phase is not worth its setup.
fn run_direct(config: &LoadConfig, limits: &StoreLimits, started: Instant) -> Result<LoadReport> {
    info!("direct load of {} (no chunking)", config.input.display());
    let input_bytes = std::fs::metadata(&config.input)?.len();

    let store = Store::open(&config.db_path, limits)?;
    let copy_started = Instant::now();
    let rows = store.bulk_load_delimited(&config.input, config.compression.engine_name())?;
    let copy_ms = copy_started.elapsed().as_millis() as u64;
    info!("direct load copied {} rows in {}ms", rows, copy_ms);

    // One synthetic chunk keeps the report shape uniform for consumers.
    let results = vec![ChunkResult::success(0, rows, copy_ms)];

    let index = if config.index_fields.is_empty() {
        None
    } else {
        Some(build_indexes(
            &store,
            &config.index_fields,
            config.sample_percent,
            config.skip_analyze,
        ))
    };

    let verification = match verify(&store, &results, input_bytes) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!("verification failed: {e}");
            None
        }
    };

    Ok(LoadReport {
        chunks: results,
        merge: MergeReport::default(),
        index,
        verification,
        rows_loaded: rows,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

/// Remove the temp directory only when the run left nothing in it.
/// Failed-chunk artifacts keep it alive for inspection.
fn cleanup_temp_dir(temp_dir: &Path) {
    match std::fs::read_dir(temp_dir) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                if let Err(e) = std::fs::remove_dir(temp_dir) {
                    warn!("could not remove temp dir {}: {e}", temp_dir.display());
                }
            } else {
                info!(
                    "temp dir {} kept: it still holds artifacts",
                    temp_dir.display()
                );
            }
        }
        Err(e) => warn!("could not inspect temp dir {}: {e}", temp_dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::SkippedChunk;

    fn report_with(chunks: Vec<ChunkResult>, skipped: Vec<SkippedChunk>) -> LoadReport {
        LoadReport {
            chunks,
            merge: MergeReport {
                skipped,
                ..Default::default()
            },
            index: None,
            verification: None,
            rows_loaded: 0,
            elapsed_ms: 2000,
        }
    }

    #[test]
    fn clean_report_has_no_data_loss() {
        let report = report_with(vec![ChunkResult::success(0, 10, 1)], Vec::new());
        assert!(!report.has_data_loss());
    }

    #[test]
    fn failed_chunk_is_data_loss() {
        let report = report_with(
            vec![
                ChunkResult::success(0, 10, 1),
                ChunkResult::failed(1, 1, "boom"),
            ],
            Vec::new(),
        );
        assert!(report.has_data_loss());
    }

    #[test]
    fn merge_skip_is_data_loss_even_when_chunks_succeeded() {
        let report = report_with(
            vec![ChunkResult::success(0, 10, 1)],
            vec![SkippedChunk {
                chunk_index: 0,
                rows_lost: 10,
                reason: "partial store missing".to_string(),
            }],
        );
        assert!(report.has_data_loss());
    }

    #[test]
    fn throughput_uses_wall_time() {
        let mut report = report_with(Vec::new(), Vec::new());
        report.rows_loaded = 5000;
        assert!((report.rows_per_sec() - 2500.0).abs() < f64::EPSILON);
    }
}
