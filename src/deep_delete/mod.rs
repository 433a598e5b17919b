//! Cascading "deep delete" of one business key across every configured
//! point-of-sale database.
//!
//! A key is matched by column name only: every base table of every target is
//! inspected, every column whose name is an alias of the [`KeyKind`] becomes a
//! candidate, and matching rows are counted and then deleted. Foreign-key
//! metadata is not used to order deletes. Failures are collected into the
//! outcome and the pass keeps going.

use std::sync::Arc;

use tokio::task;

use crate::{AppError, AppResult};

mod catalog;
mod eligibility;
mod engine;
mod key_kind;
mod outcome;
mod sqlite;

pub use catalog::{ColumnDescriptor, TableDescriptor, TargetConnector, TargetSession};
pub use eligibility::{bind_value, is_numeric_type, KeyValue};
pub use engine::{
    BatchOptions, BatchProgress, BatchProgressObserver, BatchStage, CancellationFlag,
    CandidateColumn, DeepDeleteEngine, TargetCandidates, TargetStatus,
};
pub use key_kind::{KeyKind, KeyKindParseError};
pub use outcome::{
    BatchEntry, BatchOutcome, DatabaseOutcome, DeletionError, DeletionErrorScope,
    DeletionOutcome,
};
pub use sqlite::{SqliteConnector, SqliteSession};

fn join_error(err: task::JoinError) -> AppError {
    AppError::new("DEEP_DELETE/JOIN", "Deep delete task panicked")
        .with_context("error", err.to_string())
}

/// Runs [`DeepDeleteEngine::delete_key`] on the blocking pool.
pub async fn deep_delete_key_async<C>(
    engine: Arc<DeepDeleteEngine<C>>,
    key: String,
    kind: KeyKind,
) -> AppResult<DeletionOutcome>
where
    C: TargetConnector + Send + Sync + 'static,
{
    task::spawn_blocking(move || engine.delete_key(&key, kind))
        .await
        .map_err(join_error)?
}

/// Runs [`DeepDeleteEngine::delete_keys`] on the blocking pool. The progress
/// observer is called on the worker thread.
pub async fn deep_delete_keys_async<C>(
    engine: Arc<DeepDeleteEngine<C>>,
    keys: Vec<String>,
    kind: KeyKind,
    options: BatchOptions,
) -> AppResult<BatchOutcome>
where
    C: TargetConnector + Send + Sync + 'static,
{
    task::spawn_blocking(move || engine.delete_keys(&keys, kind, &options))
        .await
        .map_err(join_error)?
}
