// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chunk planning: carve the input into contiguous record-aligned byte
//! ranges.
//!
//! Planning costs one bounded seek-and-scan per split point, so it stays
//! O(chunks) no matter how large the input is. The resulting plan is
//! immutable; workers only ever read it.

use std::fs::File;
use std::path::Path;

use tracing::debug;

use crate::boundary::find_boundary;
use crate::error::Result;
use crate::input::InputFile;

/// One record-aligned byte range, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len_bytes(&self) -> u64 {
        self.end - self.start
    }
}

/// Record-aligned partition of the whole input.
///
/// Invariants: chunks are ordered by index, contiguous, non-overlapping,
/// never empty, and together cover exactly `[0, total_bytes)`. An empty
/// input yields an empty plan.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub total_bytes: u64,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Plan one chunk per worker.
pub fn plan_for_workers(input: &InputFile, workers: usize) -> Result<ChunkPlan> {
    plan_chunks(input.path(), input.size_bytes, workers)
}

/// Plan chunks of roughly `chunk_rows` records each, sized off the sampled
/// average record length. The worker pool then works through however many
/// chunks this yields.
pub fn plan_by_rows(input: &InputFile, chunk_rows: u64) -> Result<ChunkPlan> {
    let rows = input.estimated_rows.max(1);
    let count = rows.div_ceil(chunk_rows.max(1)) as usize;
    plan_chunks(input.path(), input.size_bytes, count)
}

/// Split `[0, file_size)` into up to `target_chunks` record-aligned ranges.
pub fn plan_chunks(path: &Path, file_size: u64, target_chunks: usize) -> Result<ChunkPlan> {
    if file_size == 0 {
        return Ok(ChunkPlan {
            chunks: Vec::new(),
            total_bytes: 0,
        });
    }

    // Fewer bytes than chunks degenerates to a single chunk.
    let target_chunks = if file_size < target_chunks as u64 {
        1
    } else {
        target_chunks.max(1)
    };

    let mut file = File::open(path)?;
    let target_bytes = file_size / target_chunks as u64;

    let mut boundaries = Vec::with_capacity(target_chunks + 1);
    boundaries.push(0u64);
    for i in 1..target_chunks {
        let approx = i as u64 * target_bytes;
        let snapped = find_boundary(&mut file, approx, file_size)?;
        // A record longer than the target swallows its split point; two
        // targets snapping to the same boundary collapse into one chunk.
        if snapped > *boundaries.last().unwrap() && snapped < file_size {
            boundaries.push(snapped);
        }
    }
    boundaries.push(file_size);

    let chunks = boundaries
        .windows(2)
        .enumerate()
        .map(|(index, pair)| Chunk {
            index,
            start: pair[0],
            end: pair[1],
        })
        .collect();

    let plan = ChunkPlan {
        chunks,
        total_bytes: file_size,
    };
    debug!(
        "planned {} chunks over {} bytes (targets of ~{} bytes)",
        plan.len(),
        file_size,
        target_bytes
    );
    Ok(plan)
}
