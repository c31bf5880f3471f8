// SPDX-License-Identifier: MIT OR Apache-2.0
// Module declarations
pub mod boundary;
pub mod config;
pub mod error;
pub mod index;
pub mod input;
pub mod merge;
pub mod pipeline;
pub mod plan;
pub mod pool;
pub mod progress;
pub mod query;
pub mod schema;
pub mod store;
pub mod types;
pub mod verify;
pub mod worker;

// Re-export the main types and structs
pub use config::LoadConfig;
pub use error::{LoadError, Result};
pub use index::IndexReport;
pub use input::{Codec, InputFile};
pub use merge::MergeReport;
pub use pipeline::{run, LoadReport};
pub use plan::{Chunk, ChunkPlan};
pub use pool::{ConnectionPool, PooledStore};
pub use progress::{NullSink, ProgressEvent, ProgressSink, ProgressSnapshot, ProgressTracker};
pub use query::Condition;
pub use store::{Store, StoreLimits};
pub use types::{CancelToken, ChunkResult, ChunkStatus, DomainRecord};
pub use verify::VerificationReport;

// Logging utilities
pub mod logging {
    use tracing_subscriber::EnvFilter;

    /// Initialize tracing with DOMSTORE_DEBUG environment variable support
    /// This provides consistent logging configuration across all domstore binaries
    pub fn init_tracing() {
        let log_level = std::env::var("DOMSTORE_DEBUG").unwrap_or_else(|_| "error".to_string());

        // Map common values to appropriate filter strings
        let filter_str = match log_level.as_str() {
            "0" | "off" | "none" => "error",
            "1" | "warn" => "warn",
            "2" | "info" => "info",
            "3" | "debug" => "debug",
            "4" | "trace" => "trace",
            // Allow custom filter strings like "domstore=debug,duckdb=warn"
            custom => custom,
        };

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}
