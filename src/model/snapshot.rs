//! JSON snapshot loader.
//!
//! A snapshot is one design file serialized as a [`SourceFile`] document.
//! The path, unique name and disk info are filled in from the file system.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::{unique_file_name, SourceArena, SourceFile};
use crate::error::{Error, Result};
use crate::provenance::DiskFileInfo;

/// Load one snapshot from disk.
///
/// # Errors
///
/// Returns `SourceNotFound` if the path does not exist and `InvalidSource`
/// if it is not a valid snapshot document.
pub fn load_snapshot(path: &Path) -> Result<SourceFile> {
    if !path.exists() {
        return Err(Error::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let metadata = fs::metadata(path)?;
    let content = fs::read_to_string(path)?;
    let mut file: SourceFile =
        serde_json::from_str(&content).map_err(|e| Error::InvalidSource {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    file.unique_name = unique_file_name(&canonical);
    file.path = canonical;
    file.disk = DiskFileInfo::from_metadata(&metadata);
    if file.name.is_empty() {
        file.name = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    }

    debug!(
        path = %path.display(),
        models = file.models.len(),
        views = file.views.len(),
        "Loaded source snapshot"
    );

    Ok(file)
}

/// Load every snapshot into a fresh arena, in argument order.
///
/// # Errors
///
/// Fails on the first snapshot that cannot be loaded.
pub fn load_arena(paths: &[impl AsRef<Path>]) -> Result<SourceArena> {
    let mut arena = SourceArena::new();
    for path in paths {
        arena.add_file(load_snapshot(path.as_ref())?);
    }
    Ok(arena)
}
