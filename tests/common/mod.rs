// SPDX-License-Identifier: MIT OR Apache-2.0
//! Common test helpers and fixtures: a scratch directory, synthetic
//! inputs, and a load config wired to it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::Command;
use tempfile::TempDir;

use domstore::{CancelToken, LoadConfig, LoadReport, NullSink};

/// Test environment wrapper that keeps every artifact inside one temp dir
pub struct TestEnv {
    temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            temp_dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Get the path to the temporary directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the path to the final store
    pub fn db_path(&self) -> PathBuf {
        self.path().join("domains.duckdb")
    }

    /// Get the path used for per-chunk scratch files and partial stores
    pub fn work_dir(&self) -> PathBuf {
        self.path().join("temp_dbs")
    }

    /// Write `rows` synthetic records to `name` under the test dir
    pub fn write_input(&self, name: &str, rows: usize) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, synthetic_records(rows, 0)).expect("Failed to write input");
        path
    }

    /// Config with every path inside the test dir, sized for CI machines
    pub fn config(&self, input: impl Into<PathBuf>) -> LoadConfig {
        let mut config = LoadConfig::new(input);
        config.db_path = self.db_path();
        config.temp_dir = self.work_dir();
        config.workers = 4;
        config.memory_limit = "512MB".to_string();
        config
    }

    /// Run one load with no progress output and a fresh cancel token
    pub fn run(&self, config: &LoadConfig) -> domstore::Result<LoadReport> {
        domstore::run(config, Arc::new(NullSink), CancelToken::new())
    }
}

/// Builder for running the domstore-load binary with various options
pub struct LoadRunner<'a> {
    env: &'a TestEnv,
    input: PathBuf,
    chunk_rows: u64,
    json: bool,
}

impl<'a> LoadRunner<'a> {
    /// Create a new load runner for the given input file
    pub fn new(env: &'a TestEnv, input: PathBuf) -> Self {
        Self {
            env,
            input,
            chunk_rows: 100,
            json: false,
        }
    }

    /// Target rows per chunk
    pub fn with_chunk_rows(mut self, rows: u64) -> Self {
        self.chunk_rows = rows;
        self
    }

    /// Emit the report as JSON instead of the human summary
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("domstore-load").expect("Failed to find domstore-load");
        // An inherited RUST_LOG would interleave log lines with the report.
        cmd.env_remove("RUST_LOG");
        cmd.arg("--file")
            .arg(&self.input)
            .arg("--db-path")
            .arg(self.env.db_path())
            .arg("--temp-dir")
            .arg(self.env.work_dir())
            .arg("--chunk-size")
            .arg(self.chunk_rows.to_string())
            .arg("--workers")
            .arg("4")
            .arg("--memory-limit")
            .arg("512MB")
            .arg("--no-progress");
        if self.json {
            cmd.arg("--json");
        }
        cmd
    }

    /// Run domstore-load and return the raw output
    pub fn run(self) -> std::process::Output {
        self.command()
            .output()
            .expect("Failed to run domstore-load")
    }

    /// Run and return an assert_cmd::Assert for fluent assertions
    pub fn assert(self) -> assert_cmd::assert::Assert {
        self.command().assert()
    }
}

/// Predicates for common assertions on binary output
pub mod predicates {
    use predicates::str::ContainsPredicate;

    /// Predicate that matches the final row count line
    pub fn has_rows_loaded(rows: u64) -> ContainsPredicate {
        predicates::str::contains(format!("Rows loaded: {}", rows))
    }

    /// Predicate that matches the timing line of a built index
    pub fn has_index_timing(field: &str) -> ContainsPredicate {
        predicates::str::contains(format!("idx_{}:", field))
    }
}

/// Deterministic semicolon-delimited records. Every third row is DE, the
/// rest US, so country counts are predictable.
pub fn synthetic_records(rows: usize, offset: usize) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(rows * 80);
    for i in offset..offset + rows {
        let country = if i % 3 == 0 { "DE" } else { "US" };
        writeln!(
            out,
            "example{i}.com;ns1.example{i}.com,ns2.example{i}.com;10.0.{}.{};{country};nginx;a;b;c;d",
            (i / 256) % 256,
            i % 256,
        )
        .expect("Failed to format record");
    }
    out
}
