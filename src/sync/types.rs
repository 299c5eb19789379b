//! Shared sync types.

use serde::Serialize;

use crate::storage::RunCounts;

/// Classification of a source record against the SyncInfo store.
///
/// `Delete` is never assigned to a visited record; it is inferred for
/// previously synchronized records that a run did not encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Insert,
    Update,
    None,
    Delete,
}

impl ChangeType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::None => "none",
            Self::Delete => "delete",
        }
    }
}

/// Whether a run creates a store from scratch or synchronizes into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Everything is new: no lookups, no deletion inference.
    Create,
    /// Full change detection and deletion inference.
    Update,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

/// Outcome tallies for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvertStats {
    pub files: usize,
    pub models: usize,
    pub elements: usize,
    pub views: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub discarded: usize,
    pub skipped_files: usize,
    pub skipped_models: usize,
}

impl ConvertStats {
    /// Count one classification outcome.
    pub fn record(&mut self, change: ChangeType) {
        match change {
            ChangeType::Insert => self.inserted += 1,
            ChangeType::Update => self.updated += 1,
            ChangeType::None => self.unchanged += 1,
            ChangeType::Delete => self.deleted += 1,
        }
    }

    /// Number of target mutations the run performed.
    #[must_use]
    pub const fn mutations(&self) -> usize {
        self.inserted + self.updated + self.deleted + self.discarded
    }

    #[must_use]
    pub const fn run_counts(&self) -> RunCounts {
        RunCounts {
            inserted: self.inserted,
            updated: self.updated,
            unchanged: self.unchanged,
            deleted: self.deleted,
            skipped: self.skipped_files + self.skipped_models,
        }
    }
}
