use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use once_cell::sync::{Lazy, OnceCell};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::writer::{EitherWriter, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{AppError, AppResult};

pub const LOG_ENV: &str = "KERZZ_ADMIN_LOG";
pub const LOG_MAX_SIZE_ENV: &str = "KERZZ_ADMIN_LOG_MAX_SIZE_BYTES";
pub const LOG_MAX_FILES_ENV: &str = "KERZZ_ADMIN_LOG_MAX_FILES";
pub const LOG_FILE_NAME: &str = "kerzz-admin.log";

const DEFAULT_FILTER: &str = "kerzz_admin=info";
const DEFAULT_MAX_SIZE_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 5;

static FILE_WRITER: OnceCell<NonBlocking> = OnceCell::new();
static FILE_GUARD: Lazy<Mutex<Option<WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

/// Writes to the rotating file once [`init_file_logging`] ran, and to
/// nowhere before that.
#[derive(Debug, Clone, Copy)]
struct FileSink;

impl<'a> MakeWriter<'a> for FileSink {
    type Writer = EitherWriter<NonBlocking, io::Sink>;

    fn make_writer(&'a self) -> Self::Writer {
        match FILE_WRITER.get() {
            Some(writer) => EitherWriter::A(writer.clone()),
            None => EitherWriter::B(io::sink()),
        }
    }
}

/// Installs the global subscriber: JSON lines on stderr plus the file sink.
/// Calling it again is a no-op.
pub fn init_logging() {
    let _ = tracing_log::LogTracer::init();
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(io::stderr);
    let file = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(false)
        .with_writer(FileSink);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init();
}

fn limit_from(raw: Option<String>, default: usize) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// Starts writing `<dir>/kerzz-admin.log`, rotated by size. Returns the path
/// of the current log file.
pub fn init_file_logging(dir: &Path) -> AppResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_log_dir")
            .with_context("path", dir.display().to_string())
    })?;
    let path = dir.join(LOG_FILE_NAME);
    let max_size = limit_from(std::env::var(LOG_MAX_SIZE_ENV).ok(), DEFAULT_MAX_SIZE_BYTES);
    let max_files = limit_from(std::env::var(LOG_MAX_FILES_ENV).ok(), DEFAULT_MAX_FILES);

    let rotate = FileRotate::new(
        &path,
        AppendCount::new(max_files),
        ContentLimit::Bytes(max_size),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let (writer, guard) = tracing_appender::non_blocking(rotate);
    FILE_WRITER.set(writer).map_err(|_| {
        AppError::new("LOGGING/ALREADY_INITIALIZED", "File logging is already running")
            .with_context("path", path.display().to_string())
    })?;
    if let Ok(mut slot) = FILE_GUARD.lock() {
        *slot = Some(guard);
    }
    Ok(path)
}

/// Flushes pending file log lines. Later events are no longer written.
pub fn flush_file_logs() {
    let guard = FILE_GUARD.lock().ok().and_then(|mut slot| slot.take());
    drop(guard);
}
