use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::KeyKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionErrorScope {
    /// The database could not be opened; it contributed no rows.
    Connection,
    /// Listing the tables of a reachable database failed.
    Catalog,
    /// Listing the columns of one table failed.
    Table,
    /// A count or delete against one column failed.
    Column,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionError {
    pub scope: DeletionErrorScope,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub code: String,
    pub message: String,
}

impl fmt::Display for DeletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.database)?;
        if let Some(table) = &self.table {
            write!(f, ".{table}")?;
        }
        if let Some(column) = &self.column {
            write!(f, ".{column}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Rows removed from one database, grouped by `schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseOutcome {
    pub database: String,
    pub reachable: bool,
    pub tables: BTreeMap<String, u64>,
    pub rows_removed: u64,
}

impl DatabaseOutcome {
    pub(crate) fn reachable(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            reachable: true,
            tables: BTreeMap::new(),
            rows_removed: 0,
        }
    }

    pub(crate) fn unreachable(database: impl Into<String>) -> Self {
        Self {
            reachable: false,
            ..Self::reachable(database)
        }
    }

    /// Adds to the table's count; several columns of one table accumulate.
    pub(crate) fn record(&mut self, table: String, rows: u64) {
        if rows == 0 {
            return;
        }
        *self.tables.entry(table).or_insert(0) += rows;
        self.rows_removed += rows;
    }
}

/// The result of one key's deep delete across every configured database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionOutcome {
    key: String,
    kind: KeyKind,
    success: bool,
    total_rows_removed: u64,
    databases: Vec<DatabaseOutcome>,
    errors: Vec<DeletionError>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl DeletionOutcome {
    pub(crate) fn begin(key: &str, kind: KeyKind) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            kind,
            success: true,
            total_rows_removed: 0,
            databases: Vec::new(),
            errors: Vec::new(),
            started_at: now,
            completed_at: now,
        }
    }

    pub(crate) fn push_database(&mut self, database: DatabaseOutcome, errors: Vec<DeletionError>) {
        if !database.reachable || !errors.is_empty() {
            self.success = false;
        }
        self.total_rows_removed += database.rows_removed;
        self.databases.push(database);
        self.errors.extend(errors);
    }

    pub(crate) fn finish(mut self) -> Self {
        self.completed_at = Utc::now();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn total_rows_removed(&self) -> u64 {
        self.total_rows_removed
    }

    pub fn databases(&self) -> &[DatabaseOutcome] {
        &self.databases
    }

    pub fn errors(&self) -> &[DeletionError] {
        &self.errors
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Rows removed per `database.schema.table`, in database order.
    pub fn per_table(&self) -> Vec<(String, u64)> {
        self.databases
            .iter()
            .flat_map(|db| {
                db.tables
                    .iter()
                    .map(move |(table, rows)| (format!("{}.{}", db.database, table), *rows))
            })
            .collect()
    }

    pub fn rows_removed_from(&self, database: &str, table: &str) -> u64 {
        self.databases
            .iter()
            .filter(|db| db.database == database)
            .filter_map(|db| db.tables.get(table))
            .sum()
    }

    pub fn breakdown(&self) -> Vec<String> {
        self.per_table()
            .into_iter()
            .map(|(table, rows)| format!("{table}: {rows} rows"))
            .collect()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub key: String,
    pub rows_removed: u64,
    pub success: bool,
}

/// Aggregate of a batch of single-key deep deletes, in input order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    run_id: Uuid,
    kind: KeyKind,
    success_count: usize,
    failure_count: usize,
    skipped_count: usize,
    cancelled: bool,
    total_rows_removed: u64,
    entries: Vec<BatchEntry>,
}

impl BatchOutcome {
    pub(crate) fn new(run_id: Uuid, kind: KeyKind) -> Self {
        Self {
            run_id,
            kind,
            success_count: 0,
            failure_count: 0,
            skipped_count: 0,
            cancelled: false,
            total_rows_removed: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, outcome: &DeletionOutcome) {
        if outcome.success() {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.total_rows_removed += outcome.total_rows_removed();
        self.entries.push(BatchEntry {
            key: outcome.key().to_string(),
            rows_removed: outcome.total_rows_removed(),
            success: outcome.success(),
        });
    }

    pub(crate) fn cancel(&mut self, remaining: usize) {
        self.cancelled = true;
        self.skipped_count = remaining;
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    /// Keys never attempted because the batch was cancelled.
    pub fn skipped_count(&self) -> usize {
        self.skipped_count
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn total_rows_removed(&self) -> u64 {
        self.total_rows_removed
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0 && !self.cancelled
    }
}
