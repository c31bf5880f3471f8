// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed query conditions over the domain table.
//!
//! The operator is part of the condition, chosen by the caller: an exact
//! match never turns into a wildcard search because the value happens to
//! contain `%`. Field names are checked against the schema when a condition
//! is built; values always travel as bound parameters.

use crate::error::{LoadError, Result};
use crate::schema;

/// One predicate against a record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Field equals the value exactly. `%` and `_` stay literal.
    Exact { field: String, value: String },
    /// SQL LIKE match; the caller supplies the wildcards.
    Pattern { field: String, value: String },
    /// Lexicographic closed range `[lo, hi]`.
    Range { field: String, lo: String, hi: String },
}

impl Condition {
    pub fn exact(field: &str, value: impl Into<String>) -> Result<Self> {
        Ok(Self::Exact {
            field: checked_field(field)?,
            value: value.into(),
        })
    }

    pub fn pattern(field: &str, value: impl Into<String>) -> Result<Self> {
        Ok(Self::Pattern {
            field: checked_field(field)?,
            value: value.into(),
        })
    }

    pub fn range(field: &str, lo: impl Into<String>, hi: impl Into<String>) -> Result<Self> {
        Ok(Self::Range {
            field: checked_field(field)?,
            lo: lo.into(),
            hi: hi.into(),
        })
    }

    /// Field the condition applies to.
    pub fn field(&self) -> &str {
        match self {
            Self::Exact { field, .. } | Self::Pattern { field, .. } | Self::Range { field, .. } => {
                field
            }
        }
    }

    /// WHERE clause fragment plus its bound values, placeholders in order.
    pub fn to_sql(&self) -> (String, Vec<String>) {
        match self {
            Self::Exact { field, value } => (format!("{field} = ?"), vec![value.clone()]),
            Self::Pattern { field, value } => (format!("{field} LIKE ?"), vec![value.clone()]),
            Self::Range { field, lo, hi } => (
                format!("{field} >= ? AND {field} <= ?"),
                vec![lo.clone(), hi.clone()],
            ),
        }
    }
}

fn checked_field(field: &str) -> Result<String> {
    if schema::is_valid_field(field) {
        Ok(field.to_string())
    } else {
        Err(LoadError::InvalidField(field.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_rejected_at_construction() {
        assert!(matches!(
            Condition::exact("bogus", "x"),
            Err(LoadError::InvalidField(f)) if f == "bogus"
        ));
        assert!(Condition::pattern("no; DROP TABLE domains", "x").is_err());
        assert!(Condition::range("", "a", "b").is_err());
    }

    #[test]
    fn exact_keeps_percent_literal() {
        let condition = Condition::exact("domain", "50%.example.com").unwrap();
        let (clause, values) = condition.to_sql();
        assert_eq!(clause, "domain = ?");
        assert_eq!(values, vec!["50%.example.com".to_string()]);
    }

    #[test]
    fn pattern_renders_like() {
        let condition = Condition::pattern("domain", "%.example.com").unwrap();
        let (clause, values) = condition.to_sql();
        assert_eq!(clause, "domain LIKE ?");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn range_binds_both_endpoints() {
        let condition = Condition::range("country", "DE", "US").unwrap();
        let (clause, values) = condition.to_sql();
        assert_eq!(clause, "country >= ? AND country <= ?");
        assert_eq!(values, vec!["DE".to_string(), "US".to_string()]);
        assert_eq!(condition.field(), "country");
    }
}
