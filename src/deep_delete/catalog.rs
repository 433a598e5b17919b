//! Schema catalog types and the database seam the engine talks through.
//!
//! Table and column descriptors are only ever built from what a catalog
//! query returned. The statement builders accept nothing else, so an
//! identifier that reaches SQL text always names an object the database
//! itself reported.

use std::fmt;

use crate::config::TargetDatabase;
use crate::AppResult;

use super::eligibility::KeyValue;

/// A base table discovered by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableDescriptor {
    schema: String,
    name: String,
}

impl TableDescriptor {
    pub(crate) fn from_catalog(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `schema.table`, the key used in per-table counts.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A column of a discovered table with its declared data type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDescriptor {
    table: TableDescriptor,
    name: String,
    declared_type: String,
}

impl ColumnDescriptor {
    pub(crate) fn from_catalog(
        table: &TableDescriptor,
        name: impl Into<String>,
        declared_type: impl Into<String>,
    ) -> Self {
        Self {
            table: table.clone(),
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

fn qualified_table(table: &TableDescriptor) -> String {
    format!("{}.{}", quote_ident(table.schema()), quote_ident(table.name()))
}

/// `"column" = ?1`, or both storage classes for an integer-or-text key.
fn key_predicate(column: &ColumnDescriptor, value: &KeyValue) -> String {
    let name = quote_ident(column.name());
    match value {
        KeyValue::IntegerOrText { .. } => format!("({name} = ?1 OR {name} = ?2)"),
        KeyValue::Integer(_) | KeyValue::Text(_) => format!("{name} = ?1"),
    }
}

pub(crate) fn count_sql(column: &ColumnDescriptor, value: &KeyValue) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        qualified_table(column.table()),
        key_predicate(column, value)
    )
}

pub(crate) fn delete_sql(column: &ColumnDescriptor, value: &KeyValue) -> String {
    format!(
        "DELETE FROM {} WHERE {}",
        qualified_table(column.table()),
        key_predicate(column, value)
    )
}

/// Opens one exclusive connection per database pass.
pub trait TargetConnector {
    type Session: TargetSession;

    fn connect(&self, target: &TargetDatabase) -> AppResult<Self::Session>;
}

/// The read and delete operations a database pass needs. Every statement is
/// its own unit of work; no transaction spans several calls.
pub trait TargetSession {
    /// Base tables only: views, virtual and internal tables are excluded.
    /// A database without tables yields an empty list.
    fn base_tables(&mut self) -> AppResult<Vec<TableDescriptor>>;

    fn columns(&mut self, table: &TableDescriptor) -> AppResult<Vec<ColumnDescriptor>>;

    fn count_matching(&mut self, column: &ColumnDescriptor, value: &KeyValue) -> AppResult<u64>;

    /// Returns the row count the database reports for the delete.
    fn delete_matching(&mut self, column: &ColumnDescriptor, value: &KeyValue) -> AppResult<u64>;

    fn close(self) -> AppResult<()>;
}
