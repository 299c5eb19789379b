//! Status command implementation.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SyncStore;
use crate::sync::{get_status, print_status};
use std::path::PathBuf;

/// Execute status command.
///
/// # Errors
///
/// Returns `NotInitialized` if the store does not exist.
pub fn execute(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let db_path =
        resolve_db_path(db_path.map(PathBuf::as_path), &[]).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let store = SyncStore::open(&db_path)?;
    let report = get_status(&store, &db_path)?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_status(&report);
    }
    Ok(())
}
