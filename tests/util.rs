#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use kerzz_admin_lib::config::TargetDatabase;
use rusqlite::Connection;
use serde_json::json;

/// Order tables shaped like the point-of-sale schema.
pub const POS_SCHEMA: &str = "
    CREATE TABLE TBL_ADISYON (
        ID INTEGER PRIMARY KEY,
        ADISYONNO nvarchar(20) NOT NULL,
        TUTAR decimal(10, 2)
    );
    CREATE TABLE TBL_ADISYON_DETAY (
        ID INTEGER PRIMARY KEY,
        adisyon_no TEXT,
        URUN TEXT
    );
    CREATE TABLE TBL_MASA (ID INTEGER PRIMARY KEY, AD TEXT);
";

pub fn create_db(dir: &Path, name: &str, sql: &str) -> PathBuf {
    let path = dir.join(format!("{name}.sqlite3"));
    let conn = Connection::open(&path).expect("create database");
    conn.execute_batch(sql).expect("seed database");
    conn.close().expect("close seeded database");
    path
}

pub fn target(name: &str, path: &Path) -> TargetDatabase {
    TargetDatabase {
        name: name.to_string(),
        path: path.to_path_buf(),
        busy_timeout_ms: 1_000,
    }
}

pub fn count_rows(path: &Path, sql: &str) -> i64 {
    let conn = Connection::open(path).expect("open database");
    conn.query_row(sql, [], |row| row.get(0)).expect("count rows")
}

/// Writes a targets file using explicit paths and returns its location.
pub fn write_config(dir: &Path, targets: &[(&str, &Path)]) -> PathBuf {
    let targets: Vec<_> = targets
        .iter()
        .map(|(name, path)| json!({ "name": name, "path": path }))
        .collect();
    let path = dir.join("targets.json");
    fs::write(
        &path,
        serde_json::to_string_pretty(&json!({ "busyTimeoutMs": 1000, "targets": targets }))
            .expect("serialize config"),
    )
    .expect("write config");
    path
}
