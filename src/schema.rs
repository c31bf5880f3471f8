// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fixed nine-field schema of the domain dataset.
//!
//! Every phase (extraction, bulk copy, merge, indexing, queries) agrees on
//! this shape. Field names are validated against `FIELDS` before they are
//! ever interpolated into SQL; record values never are, they travel as bound
//! parameters.

/// Table holding the records, in partial and final stores alike.
pub const TABLE: &str = "domains";

/// Record fields in file column order. All columns are textual;
/// `nameservers` holds a comma-joined sub-list.
pub const FIELDS: [&str; 9] = [
    "domain",
    "nameservers",
    "ip",
    "country",
    "server",
    "field5",
    "field6",
    "field7",
    "field8",
];

/// Fields indexed by default after a load.
pub const DEFAULT_INDEX_FIELDS: [&str; 3] = ["domain", "ip", "country"];

/// Record terminator. Boundary snapping and progress row counting both key
/// on this byte, so a record may contain it only inside a quoted field,
/// which the dataset does not use.
pub const RECORD_TERMINATOR: u8 = b'\n';

/// DDL shared by the final store and every partial store.
pub const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS domains (
    domain VARCHAR,
    nameservers VARCHAR,
    ip VARCHAR,
    country VARCHAR,
    server VARCHAR,
    field5 VARCHAR,
    field6 VARCHAR,
    field7 VARCHAR,
    field8 VARCHAR
)";

/// Options for the engine's native bulk copy: `;`-delimited, header-less
/// rows with `"` quoting. `compression` names an engine codec when the
/// source file is handed over still compressed (direct mode only; chunked
/// loads always copy from a decompressed stream).
pub fn copy_options(compression: Option<&str>) -> String {
    match compression {
        Some(codec) => {
            format!("(DELIMITER ';', HEADER 0, QUOTE '\"', COMPRESSION '{codec}')")
        }
        None => "(DELIMITER ';', HEADER 0, QUOTE '\"')".to_string(),
    }
}

/// True when `name` is one of the nine record fields.
pub fn is_valid_field(name: &str) -> bool {
    FIELDS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_validation() {
        assert!(is_valid_field("domain"));
        assert!(is_valid_field("field8"));
        assert!(!is_valid_field("Domain"));
        assert!(!is_valid_field("domain; DROP TABLE domains"));
        assert!(!is_valid_field(""));
    }

    #[test]
    fn copy_options_carry_compression() {
        assert!(!copy_options(None).contains("COMPRESSION"));
        assert!(copy_options(Some("gzip")).contains("COMPRESSION 'gzip'"));
    }
}
