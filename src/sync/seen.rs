//! Per-run bookkeeping of visited and skipped records.
//!
//! Built fresh at the start of each run, consulted once for deletion
//! inference, then cleared. Nothing here is persisted.

use std::collections::HashSet;

use crate::storage::{FileSyncId, ModelSyncId, TargetId};

/// A record that can be marked seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeenKey {
    File(FileSyncId),
    Model(ModelSyncId),
    Element(TargetId),
    View(TargetId),
    /// Row of a discard entry.
    Discard(i64),
}

/// A sub-scope that can be bypassed wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipKey {
    File(FileSyncId),
    Model(ModelSyncId),
}

/// The seen and skipped sets for one run.
#[derive(Debug, Default)]
pub struct SeenSets {
    files: HashSet<FileSyncId>,
    models: HashSet<ModelSyncId>,
    elements: HashSet<TargetId>,
    views: HashSet<TargetId>,
    discards: HashSet<i64>,
    skipped_files: HashSet<FileSyncId>,
    skipped_models: HashSet<ModelSyncId>,
}

impl SeenSets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn mark_seen(&mut self, key: SeenKey) {
        match key {
            SeenKey::File(id) => self.files.insert(id),
            SeenKey::Model(id) => self.models.insert(id),
            SeenKey::Element(id) => self.elements.insert(id),
            SeenKey::View(id) => self.views.insert(id),
            SeenKey::Discard(row) => self.discards.insert(row),
        };
    }

    /// Record that a whole sub-scope was bypassed. Its contents count as
    /// seen for deletion inference without being visited.
    pub fn mark_skipped(&mut self, key: SkipKey) {
        match key {
            SkipKey::File(id) => {
                self.files.insert(id);
                self.skipped_files.insert(id);
            }
            SkipKey::Model(id) => {
                self.models.insert(id);
                self.skipped_models.insert(id);
            }
        }
    }

    #[must_use]
    pub fn is_seen(&self, key: SeenKey) -> bool {
        match key {
            SeenKey::File(id) => self.files.contains(&id),
            SeenKey::Model(id) => self.models.contains(&id),
            SeenKey::Element(id) => self.elements.contains(&id),
            SeenKey::View(id) => self.views.contains(&id),
            SeenKey::Discard(row) => self.discards.contains(&row),
        }
    }

    #[must_use]
    pub fn is_skipped(&self, key: SkipKey) -> bool {
        match key {
            SkipKey::File(id) => self.skipped_files.contains(&id),
            SkipKey::Model(id) => self.skipped_models.contains(&id),
        }
    }

    /// Discard everything; called at run end.
    pub fn clear(&mut self) {
        self.files.clear();
        self.models.clear();
        self.elements.clear();
        self.views.clear();
        self.discards.clear();
        self.skipped_files.clear();
        self.skipped_models.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.models.is_empty()
            && self.elements.is_empty()
            && self.views.is_empty()
            && self.discards.is_empty()
    }
}
