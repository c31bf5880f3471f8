// SPDX-License-Identifier: MIT OR Apache-2.0
//! Index building over the final store, with optional sampling pre-pass.

use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

use crate::store::Store;

/// How long one index took. `elapsed_ms` covers only the full index, not
/// the sampling pre-pass.
#[derive(Debug, Clone, Serialize)]
pub struct IndexTiming {
    pub field: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct IndexReport {
    pub built: Vec<IndexTiming>,
    /// Field name paired with the failure detail.
    pub failed: Vec<(String, String)>,
    pub analyzed: bool,
    pub elapsed_ms: u64,
}

impl IndexReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Build an index per field, continuing past failures. When
/// `sample_percent` is set, each field first gets a throwaway index over a
/// sampled temporary table so the column's data lands hot in cache before
/// the full build.
pub fn build_indexes(
    store: &Store,
    fields: &[String],
    sample_percent: Option<f64>,
    skip_analyze: bool,
) -> IndexReport {
    let started = Instant::now();
    let mut report = IndexReport::default();

    for field in fields {
        if let Some(percent) = sample_percent {
            if let Err(e) = store.presample_index(field, percent) {
                // The pre-pass is an optimization; the real index still runs.
                warn!("sampling pre-pass for '{field}' failed: {e}");
            }
        }

        let field_started = Instant::now();
        match store.create_index(field) {
            Ok(()) => {
                let elapsed_ms = field_started.elapsed().as_millis() as u64;
                info!("index on '{field}' built in {elapsed_ms}ms");
                report.built.push(IndexTiming {
                    field: field.clone(),
                    elapsed_ms,
                });
            }
            Err(e) => {
                warn!("index on '{field}' failed: {e}");
                report.failed.push((field.clone(), e.to_string()));
            }
        }
    }

    report.analyzed = !skip_analyze && store.analyze();
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("t.duckdb"), &Default::default()).unwrap();
        (dir, store)
    }

    #[test]
    fn builds_every_valid_field() {
        let (_dir, store) = empty_store();
        let fields = vec!["domain".to_string(), "country".to_string()];
        let report = build_indexes(&store, &fields, None, true);
        assert_eq!(report.built.len(), 2);
        assert!(report.all_succeeded());
        assert!(!report.analyzed);
    }

    #[test]
    fn bad_field_is_collected_and_the_rest_proceed() {
        let (_dir, store) = empty_store();
        let fields = vec!["bogus".to_string(), "ip".to_string()];
        let report = build_indexes(&store, &fields, None, true);
        assert_eq!(report.built.len(), 1);
        assert_eq!(report.built[0].field, "ip");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bogus");
    }

    #[test]
    fn sampling_pre_pass_does_not_block_the_index() {
        let (_dir, store) = empty_store();
        let fields = vec!["domain".to_string()];
        let report = build_indexes(&store, &fields, Some(10.0), true);
        assert_eq!(report.built.len(), 1);
        assert!(report.all_succeeded());
    }
}
