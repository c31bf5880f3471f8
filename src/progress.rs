// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-worker progress aggregation.
//!
//! Workers publish a running row count into a per-chunk slot with a relaxed
//! atomic store, so reporting can never block or slow a worker. A monitor
//! thread periodically folds the slots into totals, a windowed rate and an
//! ETA, and hands them to whatever sink the caller installed; the library
//! never assumes a terminal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use serde::Serialize;
use tracing::warn;

/// A started chunk whose slot has not moved for this long draws a stall
/// warning. Warned once per chunk; stalls are operational noise, not
/// failures, and nothing gets killed over one.
pub const STALL_AFTER: Duration = Duration::from_secs(30);

/// One progress observation, as handed to a sink.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub rows_so_far: u64,
    /// Sampled estimate; the denominator for ETA, not a promise.
    pub estimated_total: u64,
    /// Rows per second over the last refresh window.
    pub rows_per_sec: f64,
    pub eta_secs: Option<f64>,
    pub chunks_finished: usize,
    pub chunks_total: usize,
}

/// Events emitted by the monitor thread.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Tick(ProgressSnapshot),
    ChunkStalled { chunk_index: usize, idle_secs: u64 },
    Finished(ProgressSnapshot),
}

/// Where progress goes. A slow sink slows only the monitor thread, never
/// the workers.
pub trait ProgressSink: Send + Sync {
    fn handle(&self, event: ProgressEvent);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn handle(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct ChunkSlot {
    rows: AtomicU64,
    started: AtomicBool,
    finished: AtomicBool,
    /// Millis since tracker creation of the last slot update.
    last_update_ms: AtomicU64,
    stall_warned: AtomicBool,
}

/// Shared progress state for one load: a slot per chunk.
pub struct ProgressTracker {
    slots: Vec<ChunkSlot>,
    estimated_total: u64,
    epoch: Instant,
}

impl ProgressTracker {
    pub fn new(chunks: usize, estimated_total: u64) -> Arc<Self> {
        Arc::new(Self {
            slots: (0..chunks).map(|_| ChunkSlot::default()).collect(),
            estimated_total,
            epoch: Instant::now(),
        })
    }

    pub fn start_chunk(&self, index: usize) {
        let slot = &self.slots[index];
        slot.started.store(true, Ordering::Relaxed);
        slot.last_update_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    /// Publish the running row count for a chunk.
    pub fn record_rows(&self, index: usize, rows: u64) {
        let slot = &self.slots[index];
        slot.rows.store(rows, Ordering::Relaxed);
        slot.last_update_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    /// Overwrite the slot with the authoritative count and mark it done.
    pub fn finish_chunk(&self, index: usize, rows: u64) {
        let slot = &self.slots[index];
        slot.rows.store(rows, Ordering::Relaxed);
        slot.finished.store(true, Ordering::Relaxed);
        slot.last_update_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    pub fn rows_so_far(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| slot.rows.load(Ordering::Relaxed))
            .sum()
    }

    pub fn chunks_finished(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.finished.load(Ordering::Relaxed))
            .count()
    }

    /// Rows per second since the tracker was created.
    pub fn average_rate(&self) -> f64 {
        let secs = self.epoch.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.rows_so_far() as f64 / secs
        } else {
            0.0
        }
    }

    pub fn snapshot(&self, rows_per_sec: f64) -> ProgressSnapshot {
        let rows_so_far = self.rows_so_far();
        let eta_secs = if rows_per_sec > 0.0 && self.estimated_total > rows_so_far {
            Some((self.estimated_total - rows_so_far) as f64 / rows_per_sec)
        } else {
            None
        };
        ProgressSnapshot {
            rows_so_far,
            estimated_total: self.estimated_total,
            rows_per_sec,
            eta_secs,
            chunks_finished: self.chunks_finished(),
            chunks_total: self.slots.len(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Chunks that look stuck: started, unfinished, slot unchanged for
    /// `idle`. Each chunk is reported at most once.
    fn stalled(&self, idle: Duration) -> Vec<(usize, u64)> {
        let now = self.now_ms();
        let idle_ms = idle.as_millis() as u64;
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                if !slot.started.load(Ordering::Relaxed)
                    || slot.finished.load(Ordering::Relaxed)
                    || slot.stall_warned.load(Ordering::Relaxed)
                {
                    return None;
                }
                let idle_for = now.saturating_sub(slot.last_update_ms.load(Ordering::Relaxed));
                if idle_for >= idle_ms {
                    slot.stall_warned.store(true, Ordering::Relaxed);
                    Some((index, idle_for / 1000))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Monitor thread driving a sink at a fixed interval. Emits a `Tick` per
/// interval and one final `Finished` when stopped.
pub struct ProgressMonitor {
    stop_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProgressMonitor {
    pub fn spawn(
        tracker: Arc<ProgressTracker>,
        sink: Arc<dyn ProgressSink>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("progress-monitor".to_string())
            .spawn(move || {
                let mut last_rows = 0u64;
                let mut last_tick = Instant::now();
                loop {
                    // Anything but a timeout (explicit stop, or the handle
                    // vanishing) ends the monitor.
                    let stopped = !matches!(
                        stop_rx.recv_timeout(interval),
                        Err(crossbeam_channel::RecvTimeoutError::Timeout)
                    );

                    if stopped {
                        sink.handle(ProgressEvent::Finished(
                            tracker.snapshot(tracker.average_rate()),
                        ));
                        return;
                    }

                    let rows = tracker.rows_so_far();
                    let window = last_tick.elapsed().as_secs_f64();
                    let rate = if window > 0.0 {
                        rows.saturating_sub(last_rows) as f64 / window
                    } else {
                        0.0
                    };
                    last_rows = rows;
                    last_tick = Instant::now();

                    for (chunk_index, idle_secs) in tracker.stalled(STALL_AFTER) {
                        warn!("chunk {chunk_index} has made no progress for {idle_secs}s");
                        sink.handle(ProgressEvent::ChunkStalled {
                            chunk_index,
                            idle_secs,
                        });
                    }
                    sink.handle(ProgressEvent::Tick(tracker.snapshot(rate)));
                }
            })?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Stop the monitor and wait for its final event.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
