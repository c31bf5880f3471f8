// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Instant;

use domstore::{index::build_indexes, Condition, Store, StoreLimits};

#[derive(Parser, Debug)]
#[command(name = "domstore-index")]
#[command(about = "Build or rebuild indexes on an existing domain store", long_about = None)]
struct Args {
    /// Path of the store to index
    #[arg(short, long)]
    db_path: PathBuf,

    /// Engine memory budget (e.g. 8GB, 512MB)
    #[arg(short, long, default_value = "8GB")]
    memory_limit: String,

    /// Fields to index (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "domain,ip,country")]
    fields: Vec<String>,

    /// Warm each index build with a sampled pre-pass of this percentage
    #[arg(long, value_name = "PERCENT")]
    sample_percent: Option<f64>,

    /// Skip the statistics refresh after indexing
    #[arg(long)]
    no_analyze: bool,

    /// Skip the timed benchmark query
    #[arg(long)]
    no_verify: bool,
}

fn main() -> Result<()> {
    domstore::logging::init_tracing();
    let args = Args::parse();

    let limits = StoreLimits {
        memory_limit: args.memory_limit.clone(),
        threads: Some((num_cpus::get() / 2).max(1)),
    };
    let store = Store::open(&args.db_path, &limits)
        .with_context(|| format!("opening store {}", args.db_path.display()))?;

    let rows = store.count_rows()?;
    println!("Store {} holds {} rows", args.db_path.display(), rows);

    let report = build_indexes(&store, &args.fields, args.sample_percent, args.no_analyze);

    println!("\n{}", "=== Index Build Complete ===".bold().green());
    println!("Total time: {:.1}s", report.elapsed_ms as f64 / 1000.0);
    for timing in &report.built {
        println!(
            "  idx_{}: {:.1}s",
            timing.field,
            timing.elapsed_ms as f64 / 1000.0
        );
    }
    for (field, detail) in &report.failed {
        println!("  {} {}: {}", "failed".red(), field, detail);
    }
    if report.analyzed {
        println!("  statistics refreshed");
    }

    if !args.no_verify {
        let probe = Condition::exact("country", "US")?;
        let started = Instant::now();
        let matches = store.count_matching(&probe)?;
        println!(
            "\nBenchmark (country = 'US'): {} rows in {:.1}ms",
            matches,
            started.elapsed().as_secs_f64() * 1000.0
        );
    }

    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
