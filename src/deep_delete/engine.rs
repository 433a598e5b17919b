use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{TargetDatabase, TargetsConfig};
use crate::{AppError, AppResult};

use super::catalog::{ColumnDescriptor, TargetConnector, TargetSession};
use super::eligibility::{bind_value, is_numeric_type, KeyValue};
use super::outcome::{
    BatchOutcome, DatabaseOutcome, DeletionError, DeletionErrorScope, DeletionOutcome,
};
use super::sqlite::SqliteConnector;
use super::KeyKind;

pub type BatchProgressObserver = Arc<dyn Fn(BatchProgress) + Send + Sync + 'static>;
pub type CancellationFlag = Arc<AtomicBool>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum BatchStage {
    Started,
    Finished { outcome: DeletionOutcome },
}

/// Reported synchronously before and after each key of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    /// 1-based position of `key` in the batch.
    pub index: usize,
    pub total: usize,
    pub key: String,
    pub stage: BatchStage,
}

#[derive(Clone, Default)]
pub struct BatchOptions {
    pub progress: Option<BatchProgressObserver>,
    /// Checked between keys only; a key that started always runs to the end.
    pub cancel: Option<CancellationFlag>,
}

impl BatchOptions {
    fn emit(&self, progress: BatchProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateColumn {
    pub table: String,
    pub column: String,
    pub declared_type: String,
    pub numeric: bool,
}

/// Columns a deep delete of some kind would consider in one database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCandidates {
    pub database: String,
    pub reachable: bool,
    pub columns: Vec<CandidateColumn>,
    pub errors: Vec<DeletionError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub database: String,
    pub path: String,
    pub reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cascading delete of one business key across every configured database.
///
/// Each database pass opens its own connection, walks every base table,
/// deletes from every candidate column and closes the connection. There is
/// no transaction across columns, tables or databases: rows already deleted
/// stay deleted when a later statement fails.
pub struct DeepDeleteEngine<C = SqliteConnector> {
    targets: Vec<TargetDatabase>,
    connector: C,
}

impl DeepDeleteEngine<SqliteConnector> {
    pub fn from_config(config: &TargetsConfig) -> AppResult<Self> {
        Self::new(config.resolve()?, SqliteConnector)
    }
}

impl<C: TargetConnector> DeepDeleteEngine<C> {
    pub fn new(targets: Vec<TargetDatabase>, connector: C) -> AppResult<Self> {
        if targets.is_empty() {
            return Err(AppError::new(
                "DEEP_DELETE/NO_TARGETS",
                "At least one target database is required",
            ));
        }
        Ok(Self { targets, connector })
    }

    pub fn targets(&self) -> &[TargetDatabase] {
        &self.targets
    }

    /// Deletes every row referencing `key` in every configured database.
    ///
    /// Unreachable databases and failing statements are reported inside the
    /// outcome; `Err` is only returned for a blank key, before any database
    /// is touched. Surrounding whitespace is not part of the key.
    pub fn delete_key(&self, key: &str, kind: KeyKind) -> AppResult<DeletionOutcome> {
        let key = normalize_key(key, 0)?;
        Ok(self.delete_validated(key, kind))
    }

    /// Runs [`Self::delete_key`] for each key in order. A failing key does
    /// not stop the batch.
    pub fn delete_keys<K: AsRef<str>>(
        &self,
        keys: &[K],
        kind: KeyKind,
        options: &BatchOptions,
    ) -> AppResult<BatchOutcome> {
        let keys = keys
            .iter()
            .enumerate()
            .map(|(index, key)| normalize_key(key.as_ref(), index))
            .collect::<AppResult<Vec<_>>>()?;

        let run_id = Uuid::now_v7();
        let total = keys.len();
        let start = Instant::now();
        let mut batch = BatchOutcome::new(run_id, kind);
        info!(
            target: "kerzz_admin",
            event = "deep_delete_batch_start",
            run_id = %run_id,
            kind = kind.as_str(),
            total = total
        );

        for (position, key) in keys.iter().copied().enumerate() {
            if options.is_cancelled() {
                batch.cancel(total - position);
                warn!(
                    target: "kerzz_admin",
                    event = "deep_delete_batch_cancelled",
                    run_id = %run_id,
                    skipped = total - position
                );
                break;
            }

            let index = position + 1;
            options.emit(BatchProgress {
                index,
                total,
                key: key.to_string(),
                stage: BatchStage::Started,
            });
            let outcome = self.delete_validated(key, kind);
            batch.record(&outcome);
            options.emit(BatchProgress {
                index,
                total,
                key: key.to_string(),
                stage: BatchStage::Finished { outcome },
            });
        }

        info!(
            target: "kerzz_admin",
            event = "deep_delete_batch_complete",
            run_id = %run_id,
            succeeded = batch.success_count(),
            failed = batch.failure_count(),
            skipped = batch.skipped_count(),
            rows = batch.total_rows_removed(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(batch)
    }

    /// Read-only walk of every target's catalog listing the columns a deep
    /// delete of `kind` would consider. Nothing is counted or deleted.
    pub fn candidate_columns(&self, kind: KeyKind) -> Vec<TargetCandidates> {
        self.targets
            .iter()
            .map(|target| {
                let mut report = TargetCandidates {
                    database: target.name.clone(),
                    reachable: false,
                    columns: Vec::new(),
                    errors: Vec::new(),
                };
                let mut session = match self.connector.connect(target) {
                    Ok(session) => session,
                    Err(err) => {
                        report.errors.push(connection_error(target, &err));
                        return report;
                    }
                };
                report.reachable = true;
                match session.base_tables() {
                    Ok(tables) => {
                        for table in &tables {
                            match session.columns(table) {
                                Ok(columns) => {
                                    report.columns.extend(
                                        kind.candidate_columns(&columns).into_iter().map(
                                            |column| CandidateColumn {
                                                table: table.qualified_name(),
                                                column: column.name().to_string(),
                                                declared_type: column.declared_type().to_string(),
                                                numeric: is_numeric_type(column.declared_type()),
                                            },
                                        ),
                                    );
                                }
                                Err(err) => report.errors.push(DeletionError {
                                    scope: DeletionErrorScope::Table,
                                    database: target.name.clone(),
                                    table: Some(table.qualified_name()),
                                    column: None,
                                    code: err.code().to_string(),
                                    message: err.message().to_string(),
                                }),
                            }
                        }
                    }
                    Err(err) => report.errors.push(catalog_error(target, &err)),
                }
                close_session(target, session);
                report
            })
            .collect()
    }

    /// Opens and closes each target once.
    pub fn check_targets(&self) -> Vec<TargetStatus> {
        self.targets
            .iter()
            .map(|target| {
                let result = self
                    .connector
                    .connect(target)
                    .and_then(|session| session.close());
                TargetStatus {
                    database: target.name.clone(),
                    path: target.path.display().to_string(),
                    reachable: result.is_ok(),
                    error: result.err().map(|err| err.to_string()),
                }
            })
            .collect()
    }

    fn delete_validated(&self, key: &str, kind: KeyKind) -> DeletionOutcome {
        let start = Instant::now();
        let mut outcome = DeletionOutcome::begin(key, kind);
        for target in &self.targets {
            let (database, errors) = self.database_pass(target, key, kind);
            outcome.push_database(database, errors);
        }
        let outcome = outcome.finish();

        info!(
            target: "kerzz_admin",
            event = "deep_delete_key_complete",
            key = key,
            kind = kind.as_str(),
            success = outcome.success(),
            rows = outcome.total_rows_removed(),
            errors = outcome.errors().len(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        outcome
    }

    fn database_pass(
        &self,
        target: &TargetDatabase,
        key: &str,
        kind: KeyKind,
    ) -> (DatabaseOutcome, Vec<DeletionError>) {
        let mut errors = Vec::new();
        let mut session = match self.connector.connect(target) {
            Ok(session) => session,
            Err(err) => {
                warn!(
                    target: "kerzz_admin",
                    event = "deep_delete_target_unreachable",
                    database = target.name.as_str(),
                    error = %err
                );
                errors.push(connection_error(target, &err));
                return (DatabaseOutcome::unreachable(target.name.clone()), errors);
            }
        };

        let mut database = DatabaseOutcome::reachable(target.name.clone());
        let tables = match session.base_tables() {
            Ok(tables) => tables,
            Err(err) => {
                warn!(
                    target: "kerzz_admin",
                    event = "deep_delete_catalog_failed",
                    database = target.name.as_str(),
                    error = %err
                );
                errors.push(catalog_error(target, &err));
                close_session(target, session);
                return (database, errors);
            }
        };
        debug!(
            target: "kerzz_admin",
            event = "deep_delete_tables_listed",
            database = target.name.as_str(),
            tables = tables.len()
        );

        for table in &tables {
            let columns = match session.columns(table) {
                Ok(columns) => columns,
                Err(err) => {
                    warn!(
                        target: "kerzz_admin",
                        event = "deep_delete_columns_failed",
                        database = target.name.as_str(),
                        table = %table,
                        error = %err
                    );
                    errors.push(DeletionError {
                        scope: DeletionErrorScope::Table,
                        database: target.name.clone(),
                        table: Some(table.qualified_name()),
                        column: None,
                        code: err.code().to_string(),
                        message: err.message().to_string(),
                    });
                    continue;
                }
            };

            for column in kind.candidate_columns(&columns) {
                let Some(value) = bind_value(column, key) else {
                    debug!(
                        target: "kerzz_admin",
                        event = "deep_delete_column_type_skip",
                        database = target.name.as_str(),
                        table = %table,
                        column = column.name(),
                        declared_type = column.declared_type()
                    );
                    continue;
                };

                match delete_from_column(&mut session, column, &value) {
                    Ok(rows) => {
                        if rows > 0 {
                            info!(
                                target: "kerzz_admin",
                                event = "deep_delete_rows_removed",
                                database = target.name.as_str(),
                                table = %table,
                                column = column.name(),
                                rows = rows
                            );
                        }
                        database.record(table.qualified_name(), rows);
                    }
                    Err(err) => {
                        warn!(
                            target: "kerzz_admin",
                            event = "deep_delete_column_failed",
                            database = target.name.as_str(),
                            table = %table,
                            column = column.name(),
                            error = %err
                        );
                        errors.push(DeletionError {
                            scope: DeletionErrorScope::Column,
                            database: target.name.clone(),
                            table: Some(table.qualified_name()),
                            column: Some(column.name().to_string()),
                            code: err.code().to_string(),
                            message: err.message().to_string(),
                        });
                    }
                }
            }
        }

        close_session(target, session);
        (database, errors)
    }
}

/// Counts first and deletes only when something matches. The delete's own
/// affected-row count is what gets reported.
fn delete_from_column<S: TargetSession>(
    session: &mut S,
    column: &ColumnDescriptor,
    value: &KeyValue,
) -> AppResult<u64> {
    let matching = session.count_matching(column, value)?;
    if matching == 0 {
        return Ok(0);
    }
    session.delete_matching(column, value)
}

fn close_session<S: TargetSession>(target: &TargetDatabase, session: S) {
    if let Err(err) = session.close() {
        warn!(
            target: "kerzz_admin",
            event = "deep_delete_close_failed",
            database = target.name.as_str(),
            error = %err
        );
    }
}

fn normalize_key(key: &str, index: usize) -> AppResult<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(
            AppError::new("DEEP_DELETE/BLANK_KEY", "Key value must not be blank")
                .with_context("index", index.to_string()),
        );
    }
    Ok(key)
}

fn connection_error(target: &TargetDatabase, err: &AppError) -> DeletionError {
    DeletionError {
        scope: DeletionErrorScope::Connection,
        database: target.name.clone(),
        table: None,
        column: None,
        code: err.code().to_string(),
        message: err.message().to_string(),
    }
}

fn catalog_error(target: &TargetDatabase, err: &AppError) -> DeletionError {
    DeletionError {
        scope: DeletionErrorScope::Catalog,
        database: target.name.clone(),
        table: None,
        column: None,
        code: err.code().to_string(),
        message: err.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deep_delete::catalog::TableDescriptor;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Count(String, String),
        Delete(String, String),
    }

    #[derive(Default)]
    struct FakeTable {
        columns: Vec<(String, String)>,
        rows: Vec<Vec<String>>,
    }

    #[derive(Default)]
    struct FakeDb {
        tables: Vec<(String, FakeTable)>,
        failing_columns: HashSet<(String, String)>,
    }

    #[derive(Default)]
    struct FakeState {
        databases: HashMap<String, FakeDb>,
        failing_connects: HashSet<usize>,
        connects: usize,
        open_sessions: usize,
        ops: Vec<Op>,
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeConnector {
        fn with_db(self, name: &str, db: FakeDb) -> Self {
            self.state
                .lock()
                .unwrap()
                .databases
                .insert(name.to_string(), db);
            self
        }

        fn failing_connects(self, calls: &[usize]) -> Self {
            self.state
                .lock()
                .unwrap()
                .failing_connects
                .extend(calls.iter().copied());
            self
        }

        fn ops(&self) -> Vec<Op> {
            self.state.lock().unwrap().ops.clone()
        }

        fn connects(&self) -> usize {
            self.state.lock().unwrap().connects
        }

        fn open_sessions(&self) -> usize {
            self.state.lock().unwrap().open_sessions
        }
    }

    struct FakeSession {
        state: Arc<Mutex<FakeState>>,
        database: String,
    }

    impl TargetConnector for FakeConnector {
        type Session = FakeSession;

        fn connect(&self, target: &TargetDatabase) -> AppResult<FakeSession> {
            let mut state = self.state.lock().unwrap();
            state.connects += 1;
            let call = state.connects;
            if state.failing_connects.contains(&call)
                || !state.databases.contains_key(&target.name)
            {
                return Err(AppError::new("SQLITE/CannotOpen", "unable to open database file"));
            }
            state.open_sessions += 1;
            Ok(FakeSession {
                state: self.state.clone(),
                database: target.name.clone(),
            })
        }
    }

    fn matches(cell: &str, value: &KeyValue) -> bool {
        match value {
            KeyValue::Integer(v) => cell.parse::<i64>().ok() == Some(*v),
            KeyValue::Text(v) => cell == v,
            KeyValue::IntegerOrText { integer, text } => {
                cell == text || cell.parse::<i64>().ok() == Some(*integer)
            }
        }
    }

    impl FakeSession {
        fn with_table<T>(
            &self,
            column: &ColumnDescriptor,
            f: impl FnOnce(&mut FakeTable, usize) -> T,
        ) -> AppResult<T> {
            let mut state = self.state.lock().unwrap();
            let db = state.databases.get_mut(&self.database).unwrap();
            let key = (column.table().name().to_string(), column.name().to_string());
            if db.failing_columns.contains(&key) {
                return Err(AppError::new(
                    "SQLITE/ConstraintViolation",
                    "FOREIGN KEY constraint failed",
                ));
            }
            let table = db
                .tables
                .iter_mut()
                .find(|(name, _)| name == column.table().name())
                .map(|(_, table)| table)
                .unwrap();
            let idx = table
                .columns
                .iter()
                .position(|(name, _)| name == column.name())
                .unwrap();
            Ok(f(table, idx))
        }

        fn log(&self, op: Op) {
            self.state.lock().unwrap().ops.push(op);
        }
    }

    impl TargetSession for FakeSession {
        fn base_tables(&mut self) -> AppResult<Vec<TableDescriptor>> {
            let state = self.state.lock().unwrap();
            Ok(state.databases[&self.database]
                .tables
                .iter()
                .map(|(name, _)| TableDescriptor::from_catalog("main", name.clone()))
                .collect())
        }

        fn columns(&mut self, table: &TableDescriptor) -> AppResult<Vec<ColumnDescriptor>> {
            let state = self.state.lock().unwrap();
            let (_, fake) = state.databases[&self.database]
                .tables
                .iter()
                .find(|(name, _)| name == table.name())
                .unwrap();
            Ok(fake
                .columns
                .iter()
                .map(|(name, ty)| ColumnDescriptor::from_catalog(table, name.clone(), ty.clone()))
                .collect())
        }

        fn count_matching(&mut self, column: &ColumnDescriptor, value: &KeyValue) -> AppResult<u64> {
            self.log(Op::Count(column.table().name().into(), column.name().into()));
            self.with_table(column, |table, idx| {
                table.rows.iter().filter(|row| matches(&row[idx], value)).count() as u64
            })
        }

        fn delete_matching(&mut self, column: &ColumnDescriptor, value: &KeyValue) -> AppResult<u64> {
            self.log(Op::Delete(column.table().name().into(), column.name().into()));
            self.with_table(column, |table, idx| {
                let before = table.rows.len();
                table.rows.retain(|row| !matches(&row[idx], value));
                (before - table.rows.len()) as u64
            })
        }

        fn close(self) -> AppResult<()> {
            self.state.lock().unwrap().open_sessions -= 1;
            Ok(())
        }
    }

    fn table(columns: &[(&str, &str)], rows: &[&[&str]]) -> FakeTable {
        FakeTable {
            columns: columns
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn db(tables: Vec<(&str, FakeTable)>) -> FakeDb {
        FakeDb {
            tables: tables
                .into_iter()
                .map(|(name, table)| (name.to_string(), table))
                .collect(),
            failing_columns: HashSet::new(),
        }
    }

    fn targets(names: &[&str]) -> Vec<TargetDatabase> {
        names
            .iter()
            .map(|name| TargetDatabase {
                name: name.to_string(),
                path: PathBuf::from(format!("/fake/{name}.sqlite3")),
                busy_timeout_ms: 0,
            })
            .collect()
    }

    fn adisyon_table() -> FakeTable {
        table(
            &[("ID", "INTEGER"), ("ADISYONNO", "nvarchar(20)")],
            &[&["1", "1042"], &["2", "1042"], &["3", "1042"], &["4", "2001"]],
        )
    }

    #[test]
    fn unreachable_database_does_not_stop_the_next_one() {
        let connector = FakeConnector::default().with_db("VERI", db(vec![("TBL_ADISYON", adisyon_table())]));
        let engine = DeepDeleteEngine::new(targets(&["TALAS", "VERI"]), connector.clone()).unwrap();

        let outcome = engine.delete_key("1042", KeyKind::OrderNumber).unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.total_rows_removed(), 3);
        assert_eq!(outcome.errors().len(), 1);
        assert_eq!(outcome.errors()[0].database, "TALAS");
        assert_eq!(outcome.errors()[0].scope, DeletionErrorScope::Connection);
        assert_eq!(outcome.breakdown(), vec!["VERI.main.TBL_ADISYON: 3 rows"]);
        assert!(!outcome.databases()[0].reachable);
        assert_eq!(connector.open_sessions(), 0);
    }

    #[test]
    fn non_numeric_key_never_touches_numeric_columns() {
        let connector = FakeConnector::default().with_db(
            "TALAS",
            db(vec![("TBL_MASA", table(&[("ID", "int"), ("AD", "TEXT")], &[&["1", "Bahce"]]))]),
        );
        let engine = DeepDeleteEngine::new(targets(&["TALAS"]), connector.clone()).unwrap();

        let outcome = engine.delete_key("ABC", KeyKind::PrimaryKey).unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.total_rows_removed(), 0);
        assert!(outcome.errors().is_empty());
        assert!(connector.ops().is_empty(), "no statement may reach a numeric column");
    }

    #[test]
    fn zero_matches_skip_the_delete_statement() {
        let connector = FakeConnector::default().with_db("TALAS", db(vec![("TBL_ADISYON", adisyon_table())]));
        let engine = DeepDeleteEngine::new(targets(&["TALAS"]), connector.clone()).unwrap();

        let first = engine.delete_key("1042", KeyKind::OrderNumber).unwrap();
        assert_eq!(first.total_rows_removed(), 3);

        let ops_before = connector.ops().len();
        let second = engine.delete_key("1042", KeyKind::OrderNumber).unwrap();
        assert!(second.success());
        assert_eq!(second.total_rows_removed(), 0);
        assert_eq!(
            connector.ops()[ops_before..].to_vec(),
            vec![Op::Count("TBL_ADISYON".into(), "ADISYONNO".into())]
        );
    }

    #[test]
    fn failing_column_is_recorded_and_the_pass_continues() {
        let mut talas = db(vec![
            ("TBL_ADISYON", adisyon_table()),
            (
                "TBL_ADISYON_DETAY",
                table(&[("adisyon_no", "TEXT")], &[&["1042"], &["1042"]]),
            ),
        ]);
        talas
            .failing_columns
            .insert(("TBL_ADISYON".into(), "ADISYONNO".into()));
        let connector = FakeConnector::default().with_db("TALAS", talas);
        let engine = DeepDeleteEngine::new(targets(&["TALAS"]), connector).unwrap();

        let outcome = engine.delete_key("1042", KeyKind::OrderNumber).unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.total_rows_removed(), 2);
        assert_eq!(
            outcome.error_lines(),
            vec!["TALAS.main.TBL_ADISYON.ADISYONNO: FOREIGN KEY constraint failed"]
        );
        assert_eq!(outcome.rows_removed_from("TALAS", "main.TBL_ADISYON_DETAY"), 2);
    }

    #[test]
    fn multiple_candidate_columns_are_each_tried() {
        let connector = FakeConnector::default().with_db(
            "TALAS",
            db(vec![(
                "TBL_IPTAL",
                table(
                    &[("ID", "INTEGER"), ("Anahtar", "INTEGER")],
                    &[&["5", "9"], &["6", "5"], &["7", "8"]],
                ),
            )]),
        );
        let engine = DeepDeleteEngine::new(targets(&["TALAS"]), connector.clone()).unwrap();

        let outcome = engine.delete_key("5", KeyKind::PrimaryKey).unwrap();

        assert_eq!(outcome.total_rows_removed(), 2);
        assert_eq!(outcome.rows_removed_from("TALAS", "main.TBL_IPTAL"), 2);
        let deletes = connector
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Delete(..)))
            .count();
        assert_eq!(deletes, 2);
    }

    #[test]
    fn batch_continues_past_a_fully_unreachable_key() {
        // two targets, so key #3 owns connect calls 5 and 6
        let connector = FakeConnector::default()
            .with_db("TALAS", db(vec![("TBL_ADISYON", adisyon_table())]))
            .with_db("VERI", db(vec![]))
            .failing_connects(&[5, 6]);
        let engine = DeepDeleteEngine::new(targets(&["TALAS", "VERI"]), connector.clone()).unwrap();

        let progress: Arc<Mutex<Vec<(usize, usize, String, bool)>>> = Arc::default();
        let sink = progress.clone();
        let options = BatchOptions {
            progress: Some(Arc::new(move |event: BatchProgress| {
                let finished = matches!(event.stage, BatchStage::Finished { .. });
                sink.lock()
                    .unwrap()
                    .push((event.index, event.total, event.key, finished));
            })),
            cancel: None,
        };
        let keys = ["1042", "2001", "3000", "4000", "5000"];

        let batch = engine.delete_keys(&keys, KeyKind::OrderNumber, &options).unwrap();

        assert_eq!(batch.success_count(), 4);
        assert_eq!(batch.failure_count(), 1);
        assert_eq!(batch.success_count() + batch.failure_count(), keys.len());
        assert_eq!(batch.total_rows_removed(), 4);
        let failed: Vec<_> = batch
            .entries()
            .iter()
            .filter(|entry| !entry.success)
            .map(|entry| entry.key.as_str())
            .collect();
        assert_eq!(failed, vec!["3000"]);
        assert_eq!(connector.connects(), 10);

        let progress = progress.lock().unwrap();
        assert_eq!(progress.len(), 10);
        assert_eq!(progress[0], (1, 5, "1042".to_string(), false));
        assert_eq!(progress[1], (1, 5, "1042".to_string(), true));
        assert_eq!(progress[9], (5, 5, "5000".to_string(), true));
    }

    #[test]
    fn cancellation_is_observed_between_keys() {
        let connector = FakeConnector::default().with_db("TALAS", db(vec![("TBL_ADISYON", adisyon_table())]));
        let engine = DeepDeleteEngine::new(targets(&["TALAS"]), connector.clone()).unwrap();

        let flag: CancellationFlag = Arc::new(AtomicBool::new(false));
        let trip = flag.clone();
        let options = BatchOptions {
            progress: Some(Arc::new(move |event: BatchProgress| {
                if event.index == 2 && matches!(event.stage, BatchStage::Started) {
                    trip.store(true, Ordering::SeqCst);
                }
            })),
            cancel: Some(flag),
        };

        let batch = engine
            .delete_keys(&["1042", "2001", "3000"], KeyKind::OrderNumber, &options)
            .unwrap();

        assert!(batch.cancelled());
        assert_eq!(batch.entries().len(), 2, "key #2 was already running");
        assert_eq!(batch.skipped_count(), 1);
        assert_eq!(
            batch.success_count() + batch.failure_count() + batch.skipped_count(),
            3
        );
        assert!(!batch.all_succeeded());
    }

    #[test]
    fn padded_key_matches_text_and_integer_columns_alike() {
        let connector = FakeConnector::default().with_db(
            "TALAS",
            db(vec![(
                "TBL_IPTAL",
                table(
                    &[("ID", "INTEGER"), ("Anahtar", "TEXT")],
                    &[&["42", "X"], &["43", "42"], &["44", "Y"]],
                ),
            )]),
        );
        let engine = DeepDeleteEngine::new(targets(&["TALAS"]), connector).unwrap();

        let outcome = engine.delete_key(" 42\t", KeyKind::PrimaryKey).unwrap();

        assert_eq!(outcome.key(), "42");
        assert_eq!(outcome.total_rows_removed(), 2);

        let batch = engine
            .delete_keys(&[" 44 "], KeyKind::PrimaryKey, &BatchOptions::default())
            .unwrap();
        assert_eq!(batch.entries()[0].key, "44");
        assert_eq!(batch.total_rows_removed(), 1);
    }

    #[test]
    fn blank_key_fails_before_any_connection() {
        let connector = FakeConnector::default().with_db("TALAS", db(vec![("TBL_ADISYON", adisyon_table())]));
        let engine = DeepDeleteEngine::new(targets(&["TALAS"]), connector.clone()).unwrap();

        let err = engine
            .delete_keys(&["1042", "  "], KeyKind::OrderNumber, &BatchOptions::default())
            .unwrap_err();

        assert_eq!(err.code(), "DEEP_DELETE/BLANK_KEY");
        assert_eq!(err.context().get("index"), Some(&"1".to_string()));
        assert_eq!(connector.connects(), 0);
    }

    #[test]
    fn engine_requires_targets() {
        let err = DeepDeleteEngine::new(Vec::new(), FakeConnector::default())
            .err()
            .expect("empty target list");
        assert_eq!(err.code(), "DEEP_DELETE/NO_TARGETS");
    }

    #[test]
    fn candidate_inspection_reads_only_the_catalog() {
        let connector = FakeConnector::default().with_db("TALAS", db(vec![("TBL_ADISYON", adisyon_table())]));
        let engine = DeepDeleteEngine::new(targets(&["TALAS", "LOG_DB"]), connector.clone()).unwrap();

        let report = engine.candidate_columns(KeyKind::Identity);

        assert_eq!(report.len(), 2);
        assert!(report[0].reachable);
        let cols: Vec<_> = report[0]
            .columns
            .iter()
            .map(|c| (c.table.as_str(), c.column.as_str(), c.numeric))
            .collect();
        assert_eq!(cols, vec![("main.TBL_ADISYON", "ID", true)]);
        assert!(!report[1].reachable);
        assert_eq!(report[1].errors[0].scope, DeletionErrorScope::Connection);
        assert!(connector.ops().is_empty());
    }
}
