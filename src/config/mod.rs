//! Configuration management.
//!
//! This module resolves where the SyncInfo store lives and loads the
//! optional per-job configuration file.
//!
//! # Architecture
//!
//! Each job gets **one database** holding the SyncInfo tables and the
//! target repository. By default it sits next to the first source file, so
//! re-running a job over the same files finds the same store.

mod job;

pub use job::{load_job_config, JobConfig, HASH_DUMP_ENV};

use std::path::{Path, PathBuf};

/// Environment variable naming the database path.
pub const DB_ENV: &str = "DGNSYNC_DB";

/// Suffix appended to a source file stem to form its default store name.
const STORE_SUFFIX: &str = "syncinfo.db";

/// Get the per-user dgnsync directory.
#[must_use]
pub fn global_dgnsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".dgnsync"))
}

/// Default store location for a job whose first source is `source`.
///
/// `site.dgn.json` becomes `site.syncinfo.db` in the same directory.
#[must_use]
pub fn store_path_for_source(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.split('.').next().filter(|s| !s.is_empty()).unwrap_or("job");
    source.with_file_name(format!("{stem}.{STORE_SUFFIX}"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `DGNSYNC_DB` environment variable
/// 3. Next to the first source: `<dir>/<stem>.syncinfo.db`
/// 4. Per-user location: `~/.dgnsync/syncinfo.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>, sources: &[PathBuf]) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var(DB_ENV) {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    if let Some(first) = sources.first() {
        return Some(store_path_for_source(first));
    }

    global_dgnsync_dir().map(|dir| dir.join(STORE_SUFFIX))
}
