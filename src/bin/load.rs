// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

use domstore::{
    CancelToken, ChunkStatus, Codec, LoadConfig, LoadReport, NullSink, ProgressEvent, ProgressSink,
};

#[derive(Parser, Debug)]
#[command(name = "domstore-load")]
#[command(about = "Bulk-load a delimited domain dataset into a DuckDB store", long_about = None)]
struct Args {
    /// Input file (semicolon-delimited, optionally gzip/zstd compressed)
    #[arg(short, long)]
    file: PathBuf,

    /// Path of the final store
    #[arg(short, long, default_value = "domains.duckdb")]
    db_path: PathBuf,

    /// Number of parallel loader threads
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Target rows per chunk; 0 sizes chunks by bytes, one per worker
    #[arg(short, long, default_value = "250000")]
    chunk_size: u64,

    /// Load in one pass on a single connection instead of chunking
    #[arg(long)]
    direct: bool,

    /// Engine memory budget per connection (e.g. 8GB, 512MB)
    #[arg(short, long, default_value = "8GB")]
    memory_limit: String,

    /// Input compression (none, gzip, zstd); inferred from the file
    /// extension when omitted
    #[arg(long)]
    compression: Option<Codec>,

    /// Directory for per-chunk scratch files and partial stores
    #[arg(long, default_value = "./temp_dbs")]
    temp_dir: PathBuf,

    /// Fields to index after the merge (comma separated; "" disables)
    #[arg(long, value_delimiter = ',', default_value = "domain,ip,country")]
    index_fields: Vec<String>,

    /// Warm each index build with a sampled pre-pass of this percentage
    #[arg(long, value_name = "PERCENT")]
    sample_percent: Option<f64>,

    /// Skip the statistics refresh after indexing
    #[arg(long)]
    no_analyze: bool,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Print the full report as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

/// Progress bar over the monitor's event stream.
struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:30.cyan/blue} {pos:>10}/{len:10} rows {msg} (ETA: {eta})",
            )
            .unwrap()
            .progress_chars("##-"),
        );
        Self { bar }
    }
}

impl ProgressSink for BarSink {
    fn handle(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Tick(snap) => {
                // The length is an estimate; never let the bar overflow it.
                self.bar
                    .set_length(snap.estimated_total.max(snap.rows_so_far));
                self.bar.set_position(snap.rows_so_far);
                self.bar
                    .set_message(format!("{:.0} rows/s", snap.rows_per_sec));
            }
            ProgressEvent::ChunkStalled {
                chunk_index,
                idle_secs,
            } => {
                self.bar.println(format!(
                    "{} chunk {} has made no progress for {}s",
                    "Warning:".yellow(),
                    chunk_index,
                    idle_secs
                ));
            }
            ProgressEvent::Finished(snap) => {
                self.bar.set_position(snap.rows_so_far);
                self.bar.finish_and_clear();
            }
        }
    }
}

fn main() -> Result<()> {
    domstore::logging::init_tracing();
    let args = Args::parse();

    let compression = args
        .compression
        .unwrap_or_else(|| Codec::from_path(&args.file));

    let mut config = LoadConfig::new(&args.file);
    config.db_path = args.db_path;
    config.workers = args.workers;
    config.chunk_rows = args.chunk_size;
    config.memory_limit = args.memory_limit;
    config.temp_dir = args.temp_dir;
    config.compression = compression;
    config.direct = args.direct;
    config.index_fields = args
        .index_fields
        .into_iter()
        .filter(|f| !f.is_empty())
        .collect();
    config.sample_percent = args.sample_percent;
    config.skip_analyze = args.no_analyze;

    let sink: Arc<dyn ProgressSink> = if args.json || args.no_progress {
        Arc::new(NullSink)
    } else {
        Arc::new(BarSink::new())
    };

    // TODO: hook SIGINT up to this token (needs a signal handler crate)
    let cancel = CancelToken::new();

    let report = domstore::run(&config, sink, cancel)
        .with_context(|| format!("loading {}", args.file.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, &config);
    }

    // Setup failures already bailed; a nonzero exit here means some input
    // rows did not make it into the store.
    if report.has_data_loss() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(report: &LoadReport, config: &LoadConfig) {
    println!("\n{}", "=== Load Complete ===".bold().green());
    println!("Rows loaded: {}", report.rows_loaded);
    println!("Total time: {:.1}s", report.elapsed_ms as f64 / 1000.0);
    println!("Throughput: {:.0} rows/sec", report.rows_per_sec());
    println!("Store: {}", config.db_path.display());

    let failed: Vec<_> = report
        .chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Failed)
        .collect();
    let skipped = report
        .chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Skipped)
        .count();
    if !failed.is_empty() || skipped > 0 {
        println!("\n{}", "=== Lost Chunks ===".bold().red());
        for chunk in &failed {
            println!(
                "  chunk {}: {}",
                chunk.chunk_index,
                chunk.error_detail.as_deref().unwrap_or("unknown error")
            );
        }
        if skipped > 0 {
            println!("  {skipped} chunks skipped before loading");
        }
    }

    // Chunks that loaded fine but whose rows the merge could not bring in.
    let merge_skips: Vec<_> = report
        .merge
        .skipped
        .iter()
        .filter(|s| s.rows_lost > 0)
        .collect();
    if !merge_skips.is_empty() {
        println!("\n{}", "=== Merge Skips ===".bold().red());
        for skip in merge_skips {
            println!(
                "  chunk {}: {} ({} rows lost)",
                skip.chunk_index, skip.reason, skip.rows_lost
            );
        }
    }

    if let Some(index) = &report.index {
        println!("\n{}", "=== Indexes ===".bold().green());
        for timing in &index.built {
            println!(
                "  idx_{}: {:.1}s",
                timing.field,
                timing.elapsed_ms as f64 / 1000.0
            );
        }
        for (field, detail) in &index.failed {
            println!("  {} {}: {}", "failed".red(), field, detail);
        }
        if index.analyzed {
            println!("  statistics refreshed");
        }
    }

    if let Some(v) = &report.verification {
        println!("\n{}", "=== Verification ===".bold().green());
        if v.mismatch {
            println!(
                "  {} chunks reported {} rows, store holds {}",
                "Mismatch:".yellow(),
                v.expected_rows,
                v.actual_rows
            );
        } else {
            println!("  Row count matches: {}", v.actual_rows);
        }
        println!(
            "  Benchmark (country = 'US'): {} rows in {:.1}ms",
            v.benchmark_rows, v.benchmark_ms
        );
        if let Some(bytes) = v.table_bytes {
            print!("  Table size: {:.2} GB", bytes as f64 / 1e9);
            if let Some(ratio) = v.storage_ratio {
                print!(" ({:.0}% of input)", ratio * 100.0);
            }
            println!();
        }
    }
}
