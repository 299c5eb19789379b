//! Per-job configuration file.
//!
//! ```json
//! {
//!   "default_policy": "by_stable_id",
//!   "file_policies": { "refs/survey.dgn.json": "by_content_hash" },
//!   "root_transform": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0],
//!   "detect_deleted_files": true,
//!   "hash_dump": "hashes.jsonl",
//!   "changed_resources": ["rasters/site.tif"]
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{unique_file_name, Transform};
use crate::provenance::IdPolicy;
use crate::sync::{ConvertOptions, SyncMode};

/// Environment variable that enables the hash dump sink.
pub const HASH_DUMP_ENV: &str = "DGNSYNC_HASH_DUMP";

/// Settings for one conversion job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub default_policy: IdPolicy,
    /// Source path to policy. Keys are normalized to unique file names on
    /// load.
    pub file_policies: HashMap<String, IdPolicy>,
    pub root_transform: Option<Transform>,
    pub detect_deleted_files: bool,
    /// Write every computed element hash to this JSON-lines file.
    pub hash_dump: Option<PathBuf>,
    pub changed_resources: Vec<String>,
}

impl JobConfig {
    /// Apply environment overrides.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Ok(path) = std::env::var(HASH_DUMP_ENV) {
            if !path.trim().is_empty() {
                self.hash_dump = Some(PathBuf::from(path));
            }
        }
        self
    }

    #[must_use]
    pub fn to_options(&self, mode: SyncMode) -> ConvertOptions {
        let mut options = ConvertOptions::new(mode);
        options.default_policy = self.default_policy;
        options.file_policies.clone_from(&self.file_policies);
        options.root_transform = self.root_transform.unwrap_or_default();
        options.detect_deleted_files = self.detect_deleted_files;
        options.changed_resources = self.changed_resources.iter().cloned().collect();
        options
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.file_policies = self
            .file_policies
            .drain()
            .map(|(key, policy)| {
                let path = base.join(&key);
                let path = std::fs::canonicalize(&path).unwrap_or(path);
                (unique_file_name(&path), policy)
            })
            .collect();
        if let Some(dump) = &self.hash_dump {
            self.hash_dump = Some(base.join(dump));
        }
    }
}

/// Load a job configuration, or the defaults when no file is given.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be read or parsed.
pub fn load_job_config(path: Option<&Path>) -> Result<JobConfig> {
    let Some(path) = path else {
        return Ok(JobConfig::default().with_env());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    let mut config: JobConfig = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid job config {}: {e}", path.display())))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);
    debug!(path = %path.display(), policies = config.file_policies.len(), "Loaded job config");
    Ok(config.with_env())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_defaults() {
        let config = JobConfig::default();
        let options = config.to_options(SyncMode::Update);
        assert_eq!(options.default_policy, IdPolicy::ByStableId);
        assert!(!options.detect_deleted_files);
        assert!(options.root_transform.same_bits(&Transform::IDENTITY));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("survey.dgn.json");
        std::fs::write(&source, "{}").unwrap();
        let path = temp.path().join("job.json");
        std::fs::write(
            &path,
            r#"{
                "file_policies": {"survey.dgn.json": "by_content_hash"},
                "detect_deleted_files": true,
                "changed_resources": ["rasters/site.tif"]
            }"#,
        )
        .unwrap();

        let config = load_job_config(Some(&path)).unwrap();
        let key = unique_file_name(&std::fs::canonicalize(&source).unwrap());
        assert_eq!(config.file_policies.get(&key), Some(&IdPolicy::ByContentHash));

        let options = config.to_options(SyncMode::Update);
        assert!(options.detect_deleted_files);
        assert!(options.changed_resources.contains("rasters/site.tif"));
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.json");
        std::fs::write(&path, r#"{"policy": "by_stable_id"}"#).unwrap();

        let err = load_job_config(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unreadable_config_is_config_error() {
        let err = load_job_config(Some(Path::new("/nonexistent/job.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
