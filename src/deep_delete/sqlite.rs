use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OpenFlags};

use crate::config::TargetDatabase;
use crate::{AppError, AppResult};

use super::catalog::{
    count_sql, delete_sql, ColumnDescriptor, TableDescriptor, TargetConnector, TargetSession,
};
use super::eligibility::KeyValue;

const MAIN_SCHEMA: &str = "main";

/// Parameters in the order the key predicate numbers them.
fn key_params(value: &KeyValue) -> Vec<&dyn ToSql> {
    match value {
        KeyValue::Integer(integer) => vec![integer as &dyn ToSql],
        KeyValue::Text(text) => vec![text as &dyn ToSql],
        KeyValue::IntegerOrText { integer, text } => {
            vec![integer as &dyn ToSql, text as &dyn ToSql]
        }
    }
}

/// Absolute path of an existing database file. SQLite reads a name starting
/// with `file:` as a URI that may create the file; an absolute path never
/// starts that way.
fn existing_database_file(path: &Path) -> AppResult<PathBuf> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(AppError::new(
            "SQLITE/NOT_A_FILE",
            "Target database path is not a file",
        ));
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Connects to SQLite database files. A missing file is unreachable: the
/// connector never creates databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

pub struct SqliteSession {
    conn: Connection,
    database: String,
}

impl TargetConnector for SqliteConnector {
    type Session = SqliteSession;

    fn connect(&self, target: &TargetDatabase) -> AppResult<SqliteSession> {
        let with_target = |err: AppError, operation: &str| {
            err.with_context("operation", operation.to_string())
                .with_context("database", target.name.clone())
                .with_context("path", target.path.display().to_string())
        };

        let path = existing_database_file(&target.path)
            .map_err(|err| with_target(err, "locate_target"))?;
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| with_target(AppError::from(err), "open_target"))?;

        conn.busy_timeout(Duration::from_millis(target.busy_timeout_ms))
            .map_err(|err| with_target(AppError::from(err), "busy_timeout"))?;
        conn.pragma_update(None, "foreign_keys", 1)
            .map_err(|err| with_target(AppError::from(err), "enable_foreign_keys"))?;
        // SQLite opens lazily; touch the schema so a file that is not a
        // database fails here rather than halfway through the pass.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|err| with_target(AppError::from(err), "check_target"))?;

        Ok(SqliteSession {
            conn,
            database: target.name.clone(),
        })
    }
}

impl SqliteSession {
    fn column_error(&self, err: rusqlite::Error, operation: &str, column: &ColumnDescriptor) -> AppError {
        AppError::from(err)
            .with_context("operation", operation.to_string())
            .with_context("database", self.database.clone())
            .with_context("table", column.table().qualified_name())
            .with_context("column", column.name().to_string())
    }
}

impl TargetSession for SqliteSession {
    fn base_tables(&mut self) -> AppResult<Vec<TableDescriptor>> {
        // `type` separates ordinary tables from views, virtual tables and the
        // shadow tables that back virtual tables such as FTS indexes.
        let mut stmt = self
            .conn
            .prepare("SELECT schema, name, type FROM pragma_table_list ORDER BY name")
            .map_err(|err| AppError::from(err).with_context("operation", "list_tables"))?;
        let rows = stmt
            .query_map([], |row| {
                let schema: String = row.get(0)?;
                let name: String = row.get(1)?;
                let kind: String = row.get(2)?;
                Ok((schema, name, kind))
            })
            .map_err(|err| AppError::from(err).with_context("operation", "list_tables_query"))?;

        let mut tables = Vec::new();
        for row in rows {
            let (schema, name, kind) =
                row.map_err(|err| AppError::from(err).with_context("operation", "collect_tables"))?;
            if schema == MAIN_SCHEMA && kind == "table" && !name.starts_with("sqlite_") {
                tables.push(TableDescriptor::from_catalog(MAIN_SCHEMA, name));
            }
        }
        Ok(tables)
    }

    fn columns(&mut self, table: &TableDescriptor) -> AppResult<Vec<ColumnDescriptor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid")
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "table_info")
                    .with_context("table", table.qualified_name())
            })?;
        let rows = stmt
            .query_map(params![table.name(), table.schema()], |row| {
                let name: String = row.get(0)?;
                let declared: Option<String> = row.get(1)?;
                Ok((name, declared.unwrap_or_default()))
            })
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "table_info_query")
                    .with_context("table", table.qualified_name())
            })?;

        let mut columns = Vec::new();
        for row in rows {
            let (name, declared) = row.map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "table_info_iter")
                    .with_context("table", table.qualified_name())
            })?;
            columns.push(ColumnDescriptor::from_catalog(table, name, declared));
        }
        Ok(columns)
    }

    fn count_matching(&mut self, column: &ColumnDescriptor, value: &KeyValue) -> AppResult<u64> {
        let count: i64 = self
            .conn
            .query_row(&count_sql(column, value), &*key_params(value), |row| {
                row.get(0)
            })
            .map_err(|err| self.column_error(err, "count_matching", column))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn delete_matching(&mut self, column: &ColumnDescriptor, value: &KeyValue) -> AppResult<u64> {
        let removed = self
            .conn
            .execute(&delete_sql(column, value), &*key_params(value))
            .map_err(|err| self.column_error(err, "delete_matching", column))?;
        Ok(removed as u64)
    }

    fn close(self) -> AppResult<()> {
        let database = self.database;
        self.conn.close().map_err(|(_, err)| {
            AppError::from(err)
                .with_context("operation", "close_target")
                .with_context("database", database)
        })
    }
}
