//! Decides whether a candidate column can be compared against the key.

use super::catalog::ColumnDescriptor;

const NUMERIC_TYPES: &[&str] = &[
    "int",
    "integer",
    "bigint",
    "smallint",
    "tinyint",
    "mediumint",
    "numeric",
    "decimal",
    "float",
    "real",
    "double",
    "double precision",
];

/// The key as it is bound into a count or delete statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    Integer(i64),
    Text(String),
    /// Matches cells stored either way. Used for untyped columns, which
    /// compare without any conversion.
    IntegerOrText { integer: i64, text: String },
}

/// Base type name of a declared type: lowercased, `(p, s)` suffix removed,
/// inner whitespace collapsed.
fn base_type(declared: &str) -> String {
    let head = declared.split('(').next().unwrap_or_default();
    head.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

pub fn is_numeric_type(declared: &str) -> bool {
    let base = base_type(declared);
    NUMERIC_TYPES.contains(&base.as_str())
}

/// SQLite's BLOB affinity: no declared type, or one naming `BLOB` without
/// an `INT`, `CHAR`, `CLOB` or `TEXT` part. Such columns keep whatever
/// storage class was inserted and never convert the bound key.
pub fn has_blob_affinity(declared: &str) -> bool {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("INT") || ["CHAR", "CLOB", "TEXT"].iter().any(|t| upper.contains(t)) {
        return false;
    }
    upper.trim().is_empty() || upper.contains("BLOB")
}

/// Returns the value to bind for this column, or `None` when the column is
/// numeric and the key does not parse as an integer. A `None` is a silent
/// skip, not an error.
pub fn bind_value(column: &ColumnDescriptor, key: &str) -> Option<KeyValue> {
    let key = key.trim();
    let declared = column.declared_type();
    if is_numeric_type(declared) {
        return key.parse::<i64>().ok().map(KeyValue::Integer);
    }
    if has_blob_affinity(declared) {
        if let Ok(integer) = key.parse::<i64>() {
            return Some(KeyValue::IntegerOrText {
                integer,
                text: key.to_string(),
            });
        }
    }
    Some(KeyValue::Text(key.to_string()))
}
