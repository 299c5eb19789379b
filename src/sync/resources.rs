//! External resource change tracking.
//!
//! Elements may reference files or URIs outside their design file. A
//! resource counts as changed when it has no stored row yet, when any of
//! its recorded attributes differ, or when the job flags it explicitly.

use std::collections::HashSet;

use tracing::debug;

use crate::error::Result;
use crate::model::ResourceInfo;
use crate::storage::{FileSyncId, SyncInfo};

fn differs(stored: &ResourceInfo, current: &ResourceInfo) -> bool {
    stored.last_modified.to_bits() != current.last_modified.to_bits()
        || stored.size != current.size
        || stored.etag != current.etag
}

/// URIs of the file's resources that changed since the last run.
///
/// # Errors
///
/// Returns an error if a store lookup fails.
pub fn changed_resources(
    sync: &SyncInfo<'_>,
    file: FileSyncId,
    current: &[ResourceInfo],
    forced: &HashSet<String>,
) -> Result<HashSet<String>> {
    let mut changed = HashSet::new();
    for resource in current {
        let is_changed = forced.contains(&resource.uri)
            || sync
                .find_resource(file, &resource.uri)?
                .is_none_or(|stored| differs(&stored, resource));
        if is_changed {
            debug!(uri = %resource.uri, file = %file, "External resource changed");
            changed.insert(resource.uri.clone());
        }
    }
    Ok(changed)
}

/// Record current resource state for the next run. Rows for resources the
/// file no longer references are removed.
///
/// # Errors
///
/// Returns an error if a store write fails.
pub fn record_resources(
    sync: &SyncInfo<'_>,
    file: FileSyncId,
    current: &[ResourceInfo],
) -> Result<()> {
    let referenced: HashSet<&str> = current.iter().map(|r| r.uri.as_str()).collect();
    for uri in sync.resources_in_file(file)? {
        if !referenced.contains(uri.as_str()) {
            debug!(uri = %uri, file = %file, "Dropping unreferenced resource");
            sync.remove_resource(file, &uri)?;
        }
    }
    for resource in current {
        sync.upsert_resource(file, resource)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceFile;
    use crate::provenance::{FileProvenance, IdPolicy};
    use crate::storage::SyncStore;

    fn raster(size: u64) -> ResourceInfo {
        ResourceInfo {
            uri: "rasters/site.tif".to_string(),
            last_modified: 10.0,
            size,
            etag: None,
        }
    }

    #[test]
    fn test_new_changed_and_forced() {
        let store = SyncStore::open_memory().unwrap();
        let sync = SyncInfo::new(store.conn());
        let file = sync
            .insert_file(&FileProvenance::from_source(
                &SourceFile::new("/work/site.dgn"),
                IdPolicy::ByStableId,
            ))
            .unwrap();
        let none = HashSet::new();

        // Unknown resource.
        let changed = changed_resources(&sync, file, &[raster(100)], &none).unwrap();
        assert!(changed.contains("rasters/site.tif"));

        record_resources(&sync, file, &[raster(100)]).unwrap();
        assert!(changed_resources(&sync, file, &[raster(100)], &none)
            .unwrap()
            .is_empty());

        // Size differs.
        assert_eq!(
            changed_resources(&sync, file, &[raster(101)], &none)
                .unwrap()
                .len(),
            1
        );

        let forced: HashSet<String> = ["rasters/site.tif".to_string()].into();
        assert_eq!(
            changed_resources(&sync, file, &[raster(100)], &forced)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_unreferenced_resources_are_dropped() {
        let store = SyncStore::open_memory().unwrap();
        let sync = SyncInfo::new(store.conn());
        let file = sync
            .insert_file(&FileProvenance::from_source(
                &SourceFile::new("/work/site.dgn"),
                IdPolicy::ByStableId,
            ))
            .unwrap();
        let logo = ResourceInfo {
            uri: "rasters/logo.png".to_string(),
            ..raster(5)
        };

        record_resources(&sync, file, &[raster(100), logo.clone()]).unwrap();
        assert_eq!(sync.resources_in_file(file).unwrap().len(), 2);

        record_resources(&sync, file, &[logo]).unwrap();
        assert_eq!(
            sync.resources_in_file(file).unwrap(),
            ["rasters/logo.png".to_string()]
        );
        assert!(sync.find_resource(file, "rasters/site.tif").unwrap().is_none());
    }
}
