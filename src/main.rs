use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use kerzz_admin_lib::config::{resolve_config_path, TargetsConfig};
use kerzz_admin_lib::deep_delete::{
    BatchOptions, BatchOutcome, BatchProgress, BatchStage, DeepDeleteEngine, DeletionOutcome,
    KeyKind,
};

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 1;
const EXIT_DELETE_FAILED: i32 = 2;
const MAX_PRINTED_ERRORS: usize = 10;

#[derive(Debug, Parser)]
#[command(
    name = "kerzz-admin",
    about = "Point-of-sale database administration",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("KERZZ_ADMIN_GIT_HASH"), ")")
)]
struct Cli {
    /// Target configuration file. Falls back to KERZZ_ADMIN_CONFIG, then the
    /// per-user config directory.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Also write JSON logs to a size-rotated file in this directory.
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the configured target databases and whether each can be opened.
    Targets {
        #[arg(long)]
        json: bool,
    },
    /// Show the columns a deep delete of the given kind would consider.
    Columns {
        #[arg(long, value_parser = parse_kind)]
        kind: KeyKind,
        #[arg(long)]
        json: bool,
    },
    /// Delete every row referencing the keys from every target database.
    DeepDelete {
        #[arg(long, value_parser = parse_kind)]
        kind: KeyKind,
        /// Read additional keys from a file, one per line.
        #[arg(long, value_name = "FILE")]
        keys_file: Option<PathBuf>,
        /// Emit the outcome as JSON instead of the text report.
        #[arg(long)]
        json: bool,
        /// Confirm the delete. Deleted rows cannot be restored.
        #[arg(long)]
        yes: bool,
        keys: Vec<String>,
    },
}

fn parse_kind(raw: &str) -> std::result::Result<KeyKind, String> {
    raw.parse::<KeyKind>().map_err(|err| err.to_string())
}

fn main() {
    kerzz_admin_lib::init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(if err.use_stderr() { EXIT_USAGE } else { EXIT_OK });
        }
    };

    if let Some(dir) = &cli.log_dir {
        if let Err(err) = kerzz_admin_lib::init_file_logging(dir) {
            eprintln!("Error: {err}");
            process::exit(EXIT_USAGE);
        }
    }

    let code = match handle_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            EXIT_USAGE
        }
    };
    kerzz_admin_lib::flush_file_logs();
    process::exit(code);
}

fn handle_cli(cli: Cli) -> Result<i32> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Targets { json } => handle_targets(config, json),
        Commands::Columns { kind, json } => handle_columns(config, kind, json),
        Commands::DeepDelete {
            kind,
            keys_file,
            json,
            yes,
            keys,
        } => handle_deep_delete(config, kind, keys, keys_file.as_deref(), json, yes),
    }
}

fn load_engine(config: Option<&Path>) -> Result<DeepDeleteEngine> {
    let path = resolve_config_path(config)?;
    let targets = TargetsConfig::load(&path)
        .with_context(|| format!("load target configuration {}", path.display()))?;
    tracing::debug!(
        target: "kerzz_admin",
        event = "config_loaded",
        path = %path.display(),
        targets = targets.targets.len()
    );
    Ok(DeepDeleteEngine::from_config(&targets)?)
}

fn handle_targets(config: Option<&Path>, json: bool) -> Result<i32> {
    let engine = load_engine(config)?;
    let statuses = engine.check_targets();
    if json {
        let rendered =
            serde_json::to_string_pretty(&statuses).context("serialize target statuses")?;
        println!("{rendered}");
        return Ok(EXIT_OK);
    }

    println!("{:<16} {:<11} Path", "Target", "Reachable");
    for status in &statuses {
        let reachable = if status.reachable { "yes" } else { "no" };
        println!("{:<16} {:<11} {}", status.database, reachable, status.path);
        if let Some(error) = &status.error {
            println!("{:<16} {:<11} {}", "", "", error);
        }
    }
    Ok(EXIT_OK)
}

fn handle_columns(config: Option<&Path>, kind: KeyKind, json: bool) -> Result<i32> {
    let engine = load_engine(config)?;
    let report = engine.candidate_columns(kind);
    if json {
        let rendered = serde_json::to_string_pretty(&report).context("serialize candidates")?;
        println!("{rendered}");
        return Ok(EXIT_OK);
    }

    println!("Candidate columns for {} ({})", kind, kind.tag());
    for target in &report {
        println!();
        if !target.reachable {
            println!("{}: unreachable", target.database);
        } else if target.columns.is_empty() {
            println!("{}: no candidate columns", target.database);
        } else {
            println!("{}:", target.database);
        }
        for column in &target.columns {
            let numeric = if column.numeric { "  numeric" } else { "" };
            println!(
                "  {}.{}  {}{}",
                column.table, column.column, column.declared_type, numeric
            );
        }
        for error in &target.errors {
            println!("  error: {error}");
        }
    }
    Ok(EXIT_OK)
}

fn read_keys(keys: Vec<String>, keys_file: Option<&Path>) -> Result<Vec<String>> {
    let mut keys: Vec<String> = keys.iter().map(|key| key.trim().to_string()).collect();
    if let Some(path) = keys_file {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read keys file {}", path.display()))?;
        keys.extend(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    Ok(keys)
}

fn handle_deep_delete(
    config: Option<&Path>,
    kind: KeyKind,
    keys: Vec<String>,
    keys_file: Option<&Path>,
    json: bool,
    yes: bool,
) -> Result<i32> {
    if !yes {
        eprintln!("Refusing to delete without --yes. Deleted rows cannot be restored.");
        return Ok(EXIT_USAGE);
    }
    let keys = read_keys(keys, keys_file)?;
    if keys.is_empty() {
        eprintln!("Error: no keys given");
        return Ok(EXIT_USAGE);
    }
    let engine = load_engine(config)?;

    if let [key] = keys.as_slice() {
        let outcome = engine.delete_key(key, kind)?;
        if json {
            let rendered = serde_json::to_string_pretty(&outcome).context("serialize outcome")?;
            println!("{rendered}");
        } else {
            print_outcome(&outcome);
        }
        return Ok(if outcome.success() {
            EXIT_OK
        } else {
            EXIT_DELETE_FAILED
        });
    }

    let finished: Arc<Mutex<Vec<DeletionOutcome>>> = Arc::default();
    let sink = finished.clone();
    let options = BatchOptions {
        progress: Some(Arc::new(move |progress: BatchProgress| {
            let BatchStage::Finished { outcome } = progress.stage else {
                return;
            };
            if !json {
                print_batch_entry(progress.index, progress.total, &outcome);
            }
            if let Ok(mut outcomes) = sink.lock() {
                outcomes.push(outcome);
            }
        })),
        cancel: None,
    };
    let batch = engine.delete_keys(&keys, kind, &options)?;

    if json {
        let outcomes = finished
            .lock()
            .map(|outcomes| outcomes.clone())
            .unwrap_or_default();
        let payload = json!({ "batch": batch, "outcomes": outcomes });
        let rendered = serde_json::to_string_pretty(&payload).context("serialize batch")?;
        println!("{rendered}");
    } else {
        print_batch_summary(&batch);
    }
    Ok(if batch.all_succeeded() {
        EXIT_OK
    } else {
        EXIT_DELETE_FAILED
    })
}

fn print_errors(outcome: &DeletionOutcome, indent: &str) {
    let lines = outcome.error_lines();
    if lines.is_empty() {
        return;
    }
    println!(
        "{indent}Errors (showing {} of {}):",
        lines.len().min(MAX_PRINTED_ERRORS),
        lines.len()
    );
    for line in lines.iter().take(MAX_PRINTED_ERRORS) {
        println!("{indent}  {line}");
    }
}

fn print_outcome(outcome: &DeletionOutcome) {
    println!("Deep delete of {} {}", outcome.kind(), outcome.key());
    for line in outcome.breakdown() {
        println!("  {line}");
    }
    print_errors(outcome, "");
    println!("Total rows removed: {}", outcome.total_rows_removed());
    println!(
        "Result: {}",
        if outcome.success() { "success" } else { "failed" }
    );
}

fn print_batch_entry(index: usize, total: usize, outcome: &DeletionOutcome) {
    let status = if outcome.success() { "ok" } else { "failed" };
    println!(
        "[{index}/{total}] {}: {} rows ({status})",
        outcome.key(),
        outcome.total_rows_removed()
    );
    for line in outcome.breakdown() {
        println!("    {line}");
    }
    print_errors(outcome, "    ");
}

fn print_batch_summary(batch: &BatchOutcome) {
    println!();
    println!("Run          : {}", batch.run_id());
    println!("Succeeded    : {}", batch.success_count());
    println!("Failed       : {}", batch.failure_count());
    if batch.cancelled() {
        println!("Skipped      : {}", batch.skipped_count());
    }
    println!("Rows removed : {}", batch.total_rows_removed());
}
