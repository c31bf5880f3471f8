// SPDX-License-Identifier: MIT OR Apache-2.0
//! Thin wrapper around one storage engine connection.
//!
//! The engine is an external collaborator; everything the pipeline needs
//! from it (bulk copy, attach/detach, counting, indexing, queries) funnels
//! through here so no other module assembles SQL. One `Store` owns one
//! connection and one connection allows one writer, which is the constraint
//! the whole chunk-and-merge design exists to work around.

use std::path::{Path, PathBuf};

use duckdb::{AccessMode, Config, Connection};
use tracing::{debug, warn};

use crate::error::{LoadError, Result};
use crate::query::Condition;
use crate::schema;
use crate::types::DomainRecord;

/// Engine limits pushed down to a connection at open time.
#[derive(Debug, Clone)]
pub struct StoreLimits {
    /// Engine memory budget, e.g. `"8GB"`.
    pub memory_limit: String,
    /// Engine worker threads for this connection; `None` keeps the engine
    /// default. Chunk workers get a slice so k parallel loads do not
    /// oversubscribe the machine.
    pub threads: Option<usize>,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            memory_limit: "8GB".to_string(),
            threads: None,
        }
    }
}

impl StoreLimits {
    fn pragma_sql(&self) -> String {
        // The limit string is operator configuration, not record data, but
        // it still never gets to close the quote.
        let memory = self.memory_limit.replace('\'', "");
        let mut sql = format!("PRAGMA memory_limit='{memory}';");
        if let Some(threads) = self.threads {
            sql.push_str(&format!("\nPRAGMA threads={threads};"));
        }
        sql
    }
}

/// One open connection to a store file.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) with `limits` applied and the table
    /// ensured.
    pub fn open(path: &Path, limits: &StoreLimits) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.apply_limits(limits)?;
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open an existing store read-only. Readers are unlimited; only
    /// writers are exclusive.
    pub fn open_read_only(path: &Path, limits: &StoreLimits) -> Result<Self> {
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, config)?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.apply_limits(limits)?;
        Ok(store)
    }

    fn apply_limits(&self, limits: &StoreLimits) -> Result<()> {
        self.conn.execute_batch(&limits.pragma_sql())?;
        Ok(())
    }

    /// Create the domains table if missing.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(schema::CREATE_TABLE_SQL)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bulk copy a delimited file in with the engine's native loader,
    /// then return the table's row count. `compression` names an engine
    /// codec when the file is handed over still compressed.
    pub fn bulk_load_delimited(&self, file: &Path, compression: Option<&str>) -> Result<u64> {
        let sql = format!(
            "COPY {} FROM '{}' {}",
            schema::TABLE,
            sql_str(file),
            schema::copy_options(compression)
        );
        debug!("bulk copy into {}: {sql}", self.path.display());
        self.conn.execute_batch(&sql)?;
        self.count_rows()
    }

    /// Rows currently in the table.
    pub fn count_rows(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", schema::TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Attach another store file read-only under `alias`.
    pub fn attach_read_only(&self, path: &Path, alias: &str) -> Result<()> {
        self.conn.execute_batch(&format!(
            "ATTACH '{}' AS {alias} (READ_ONLY)",
            sql_str(path)
        ))?;
        Ok(())
    }

    pub fn detach(&self, alias: &str) -> Result<()> {
        self.conn.execute_batch(&format!("DETACH {alias}"))?;
        Ok(())
    }

    /// Rows in an attached store's table.
    pub fn count_attached(&self, alias: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {alias}.{}", schema::TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Copy every row of an attached store's table into this one; returns
    /// the number of rows the insert reported.
    pub fn copy_from_attached(&self, alias: &str) -> Result<u64> {
        let inserted = self.conn.execute(
            &format!(
                "INSERT INTO {table} SELECT * FROM {alias}.{table}",
                table = schema::TABLE
            ),
            [],
        )?;
        Ok(inserted as u64)
    }

    /// Create `idx_<field>` on the table.
    pub fn create_index(&self, field: &str) -> Result<()> {
        let field = checked(field)?;
        self.conn
            .execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{field} ON {}({field})",
                schema::TABLE
            ))
            .map_err(|source| LoadError::Index {
                field: field.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Build a throwaway index over a sampled copy of the table, warming
    /// the engine before the real build. Everything it creates is dropped
    /// again before returning.
    pub fn presample_index(&self, field: &str, percent: f64) -> Result<()> {
        let field = checked(field)?;
        let sample = format!("sample_{field}");
        self.conn
            .execute_batch(&format!(
                "CREATE TEMPORARY TABLE {sample} AS \
                 SELECT * FROM {table} USING SAMPLE {percent} PERCENT;\n\
                 CREATE INDEX idx_{field}_sample ON {sample}({field});\n\
                 DROP TABLE {sample};",
                table = schema::TABLE
            ))
            .map_err(|source| LoadError::Index {
                field: field.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Refresh planner statistics. Best-effort: some engine builds lack
    /// the command, and indexes work without it.
    pub fn analyze(&self) -> bool {
        match self
            .conn
            .execute_batch(&format!("ANALYZE {}", schema::TABLE))
        {
            Ok(()) => true,
            Err(e) => {
                warn!("statistics refresh failed (indexes unaffected): {e}");
                false
            }
        }
    }

    /// On-disk size of the table, when the engine can report one.
    pub fn table_size(&self) -> Option<u64> {
        self.conn
            .query_row(
                &format!("SELECT pg_table_size('{}')", schema::TABLE),
                [],
                |row| row.get::<_, i64>(0),
            )
            .ok()
            .map(|n| n as u64)
    }

    /// Fetch up to `limit` records matching `condition`.
    pub fn query(&self, condition: &Condition, limit: usize) -> Result<Vec<DomainRecord>> {
        let (clause, values) = condition.to_sql();
        let sql = format!(
            "SELECT {fields} FROM {table} WHERE {clause} LIMIT {limit}",
            fields = schema::FIELDS.join(", "),
            table = schema::TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let params: Vec<&dyn duckdb::ToSql> =
            values.iter().map(|v| v as &dyn duckdb::ToSql).collect();

        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok(DomainRecord {
                domain: row.get(0)?,
                nameservers: row.get(1)?,
                ip: row.get(2)?,
                country: row.get(3)?,
                server: row.get(4)?,
                field5: row.get(5)?,
                field6: row.get(6)?,
                field7: row.get(7)?,
                field8: row.get(8)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Count rows matching `condition`.
    pub fn count_matching(&self, condition: &Condition) -> Result<u64> {
        let (clause, values) = condition.to_sql();
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {clause}",
            schema::TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let params: Vec<&dyn duckdb::ToSql> =
            values.iter().map(|v| v as &dyn duckdb::ToSql).collect();
        let n: i64 = stmt.query_row(params.as_slice(), |row| row.get(0))?;
        Ok(n as u64)
    }
}

/// Single-quote escape for SQL string literals (paths only; record values
/// go through bound parameters).
fn sql_str(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "''")
}

fn checked(field: &str) -> Result<&str> {
    if schema::is_valid_field(field) {
        Ok(field)
    } else {
        Err(LoadError::InvalidField(field.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pragma_sql_strips_quotes_and_adds_threads() {
        let limits = StoreLimits {
            memory_limit: "4GB".to_string(),
            threads: Some(2),
        };
        let sql = limits.pragma_sql();
        assert!(sql.contains("PRAGMA memory_limit='4GB';"));
        assert!(sql.contains("PRAGMA threads=2;"));

        let sneaky = StoreLimits {
            memory_limit: "1GB'; DROP TABLE domains; --".to_string(),
            threads: None,
        };
        let sql = sneaky.pragma_sql();
        assert_eq!(sql.matches('\'').count(), 2, "value cannot close the quote");
    }

    #[test]
    fn sql_str_escapes_quotes() {
        let path = Path::new("/tmp/it's here/data.csv");
        assert_eq!(sql_str(path), "/tmp/it''s here/data.csv");
    }
}
