//! `convert` and `update` command implementations.
//!
//! Both load every source snapshot into one arena and hand it to the
//! [`Converter`]. `convert` starts a fresh store and inserts everything;
//! `update` runs full change detection against an existing store.

use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::Serialize;
use tracing::info;

use crate::cli::RunArgs;
use crate::config::{load_job_config, resolve_db_path};
use crate::error::{Error, Result};
use crate::hash::{FileHashDump, HashNormalizer};
use crate::model::snapshot::load_arena;
use crate::storage::SyncStore;
use crate::sync::{ConvertStats, Converter, SyncMode};

#[derive(Serialize)]
struct RunOutput<'a> {
    success: bool,
    mode: SyncMode,
    run_id: &'a str,
    database: &'a Path,
    stats: &'a ConvertStats,
}

/// Execute `convert`.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the store exists and `force` is not set,
/// or any load, store or conversion error.
pub fn execute_convert(
    args: &RunArgs,
    force: bool,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let db_path = resolve(db_path, &args.sources)?;
    if db_path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized { path: db_path });
        }
        remove_store(&db_path)?;
    }
    execute(args, SyncMode::Create, &db_path, json)
}

/// Execute `update`.
///
/// # Errors
///
/// Returns `NotInitialized` if the store does not exist, or any load,
/// store or conversion error.
pub fn execute_update(args: &RunArgs, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let db_path = resolve(db_path, &args.sources)?;
    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }
    execute(args, SyncMode::Update, &db_path, json)
}

fn resolve(db_path: Option<&PathBuf>, sources: &[PathBuf]) -> Result<PathBuf> {
    resolve_db_path(db_path.map(PathBuf::as_path), sources)
        .ok_or_else(|| Error::Config("Could not determine a database location".to_string()))
}

/// Delete a store file and its WAL companions.
fn remove_store(db_path: &Path) -> Result<()> {
    info!(path = %db_path.display(), "Removing existing store");
    fs::remove_file(db_path)?;
    for suffix in ["-wal", "-shm"] {
        let mut companion = db_path.as_os_str().to_owned();
        companion.push(suffix);
        let companion = PathBuf::from(companion);
        if companion.exists() {
            fs::remove_file(companion)?;
        }
    }
    Ok(())
}

fn execute(args: &RunArgs, mode: SyncMode, db_path: &Path, json: bool) -> Result<()> {
    let config = load_job_config(args.config.as_deref())?;
    let arena = load_arena(&args.sources)?;

    let mut normalizer = HashNormalizer::new();
    if let Some(dump) = &config.hash_dump {
        info!(path = %dump.display(), "Writing element hashes");
        normalizer = normalizer.with_sink(Box::new(FileHashDump::open(dump)?));
    }

    let mut options = config.to_options(mode);
    options.detect_deleted_files |= args.detect_deleted_files;

    let mut store = SyncStore::open(db_path)?;
    let mut converter = Converter::new(&mut store, options).with_normalizer(normalizer);
    let stats = converter.run(&arena)?;

    if json {
        let output = RunOutput {
            success: true,
            mode,
            run_id: converter.run_id(),
            database: db_path,
            stats: &stats,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let verb = match mode {
        SyncMode::Create => "Converted",
        SyncMode::Update => "Updated",
    };
    println!(
        "{} {} file(s) into {}",
        verb.green().bold(),
        stats.files,
        db_path.display()
    );
    println!();
    println!("  Inserted:  {}", stats.inserted.to_string().green());
    println!("  Updated:   {}", stats.updated.to_string().yellow());
    println!("  Deleted:   {}", stats.deleted.to_string().red());
    println!("  Unchanged: {}", stats.unchanged);
    if stats.discarded > 0 {
        println!("  Discarded: {}", stats.discarded);
    }
    if stats.skipped_files + stats.skipped_models > 0 {
        println!(
            "  Skipped:   {} file(s), {} model(s)",
            stats.skipped_files, stats.skipped_models
        );
    }
    Ok(())
}
