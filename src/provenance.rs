//! Provenance: what a record looked like when it was last synchronized.
//!
//! Current provenance is computed fresh every time a record is visited and
//! only ever compared against the stored provenance in the SyncInfo store.
//! Comparison is by content hash alone; timestamps are carried for
//! diagnostics because some tools touch them without touching content.

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

use crate::hash::{json_hash, ContentHash, HashNormalizer, RecordHasher};
use crate::model::{SourceElement, SourceFile, SourceModel, SourceView};

/// How a record is identified across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPolicy {
    /// Trust the source's numeric id to survive across runs.
    #[default]
    ByStableId,
    /// Identity follows normalized content.
    ByContentHash,
}

impl IdPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ByStableId => "by_stable_id",
            Self::ByContentHash => "by_content_hash",
        }
    }

    /// Parse the stored form. Unknown values fall back to `ByStableId`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "by_content_hash" => Self::ByContentHash,
            _ => Self::ByStableId,
        }
    }
}

/// Provenance as persisted by a previous run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoredProvenance {
    pub last_modified: f64,
    pub hash: ContentHash,
}

/// Provenance of an element as it exists now.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElementProvenance {
    pub last_modified: f64,
    pub hash: ContentHash,
    pub id_policy: IdPolicy,
}

impl ElementProvenance {
    /// Compute provenance for one element.
    #[must_use]
    pub fn compute(
        element: &SourceElement,
        normalizer: &HashNormalizer,
        id_policy: IdPolicy,
    ) -> Self {
        Self {
            last_modified: element.header.last_modified,
            hash: normalizer.compute_hash(element),
            id_policy,
        }
    }

    /// Hash equality only.
    #[must_use]
    pub fn matches(&self, stored: &StoredProvenance) -> bool {
        self.hash == stored.hash
    }

    #[must_use]
    pub const fn to_stored(&self) -> StoredProvenance {
        StoredProvenance {
            last_modified: self.last_modified,
            hash: self.hash,
        }
    }
}

/// Provenance of a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelProvenance {
    pub hash: ContentHash,
    pub contents_last_modified: Option<f64>,
}

impl ModelProvenance {
    /// Hash of the model's own properties (name, kind, placement).
    #[must_use]
    pub fn compute(model: &SourceModel) -> Self {
        let mut hasher = RecordHasher::new();
        hasher.add_str(&model.name);
        hasher.add_str(model.kind.as_str());
        for value in model.transform.0 {
            hasher.add_f64(value);
        }
        Self {
            hash: hasher.finish(),
            contents_last_modified: model.contents_last_modified,
        }
    }
}

/// Compute provenance for a view.
///
/// # Errors
///
/// Returns an error if the view content cannot be serialized.
pub fn view_provenance(view: &SourceView) -> serde_json::Result<StoredProvenance> {
    Ok(StoredProvenance {
        last_modified: view.last_modified,
        hash: json_hash(&(&view.name, &view.content))?,
    })
}

/// Modification time and size of a file on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskFileInfo {
    /// Unix seconds.
    pub last_modified: i64,
    pub size: u64,
}

impl DiskFileInfo {
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_secs()).ok())
            .unwrap_or(0);
        Self {
            last_modified,
            size: metadata.len(),
        }
    }
}

/// Provenance of a whole design file, used for the unchanged-file fast path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileProvenance {
    pub unique_name: String,
    pub source_name: String,
    pub last_save_time: f64,
    pub disk: DiskFileInfo,
    pub id_policy: IdPolicy,
}

impl FileProvenance {
    #[must_use]
    pub fn from_source(file: &SourceFile, id_policy: IdPolicy) -> Self {
        Self {
            unique_name: file.unique_name.clone(),
            source_name: file.name.clone(),
            last_save_time: file.last_save_time,
            disk: file.disk,
            id_policy,
        }
    }

    /// Provenance recorded when a file is first registered in a run.
    ///
    /// It never matches a real file, so a run that is interrupted before
    /// finishing cannot make the file look unchanged to the next run.
    #[must_use]
    pub fn placeholder(file: &SourceFile, id_policy: IdPolicy) -> Self {
        Self {
            last_save_time: 0.0,
            disk: DiskFileInfo::default(),
            ..Self::from_source(file, id_policy)
        }
    }

    #[must_use]
    pub fn has_disk_file_changed(&self, current: &DiskFileInfo) -> bool {
        self.disk != *current
    }

    /// Whether the file changed since this provenance was recorded.
    ///
    /// The save time stored inside the file is authoritative when the file
    /// has one; otherwise the disk timestamp and size decide.
    #[must_use]
    pub fn has_changed(&self, current: &SourceFile) -> bool {
        if current.last_save_time == 0.0 {
            return self.has_disk_file_changed(&current.disk);
        }
        self.last_save_time.to_bits() != current.last_save_time.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashNormalizer;

    #[test]
    fn test_provenance_match_ignores_timestamp() {
        let normalizer = HashNormalizer::new();
        let a = SourceElement::new(1, b"wall".to_vec()).with_last_modified(100.0);
        let b = SourceElement::new(1, b"wall".to_vec()).with_last_modified(200.0);

        let pa = ElementProvenance::compute(&a, &normalizer, IdPolicy::ByStableId);
        let pb = ElementProvenance::compute(&b, &normalizer, IdPolicy::ByStableId);
        assert!(pb.matches(&pa.to_stored()));
    }

    #[test]
    fn test_provenance_mismatch_on_content() {
        let normalizer = HashNormalizer::new();
        let a = SourceElement::new(1, b"wall".to_vec());
        let b = SourceElement::new(1, b"door".to_vec());

        let pa = ElementProvenance::compute(&a, &normalizer, IdPolicy::ByStableId);
        let pb = ElementProvenance::compute(&b, &normalizer, IdPolicy::ByStableId);
        assert!(!pb.matches(&pa.to_stored()));
    }

    #[test]
    fn test_file_change_prefers_save_time() {
        let mut file = SourceFile::new("/tmp/site.dgn");
        file.last_save_time = 10.0;
        file.disk = DiskFileInfo {
            last_modified: 1,
            size: 100,
        };
        let stored = FileProvenance::from_source(&file, IdPolicy::ByStableId);

        // Disk touched, save time unchanged.
        file.disk.last_modified = 2;
        assert!(!stored.has_changed(&file));

        file.last_save_time = 11.0;
        assert!(stored.has_changed(&file));
    }

    #[test]
    fn test_file_change_falls_back_to_disk() {
        let mut file = SourceFile::new("/tmp/site.dgn");
        file.disk = DiskFileInfo {
            last_modified: 1,
            size: 100,
        };
        let stored = FileProvenance::from_source(&file, IdPolicy::ByStableId);
        assert!(!stored.has_changed(&file));

        file.disk.size = 101;
        assert!(stored.has_changed(&file));
    }

    #[test]
    fn test_placeholder_never_matches() {
        let mut file = SourceFile::new("/tmp/site.dgn");
        file.last_save_time = 10.0;
        let placeholder = FileProvenance::placeholder(&file, IdPolicy::ByStableId);
        assert!(placeholder.has_changed(&file));
    }

    #[test]
    fn test_model_hash_tracks_transform() {
        let mut model = SourceModel::new(0, "Default");
        let before = ModelProvenance::compute(&model);
        model.transform.0[3] = 5.0;
        assert_ne!(before.hash, ModelProvenance::compute(&model).hash);
    }

    #[test]
    fn test_id_policy_roundtrip() {
        assert_eq!(IdPolicy::parse(IdPolicy::ByContentHash.as_str()), IdPolicy::ByContentHash);
        assert_eq!(IdPolicy::parse("garbage"), IdPolicy::ByStableId);
    }
}
