//! Change detection: classify source records against the SyncInfo store
//! and infer deletions after a pass.
//!
//! Classification of a visited record:
//!
//! 1. Compute current provenance.
//! 2. Look up the stored entry by the record's identity (stable id, content
//!    hash, or free-form identifier; never more than one per record).
//! 3. No entry: `Insert`. Hash differs: `Update`. Otherwise `None`, unless
//!    the root transform changed this run or a resource the record depends
//!    on changed, which force `Update`.
//!
//! Deletion inference runs per file after all of the file's records were
//! visited: anything stored under the file that was neither seen nor inside
//! a skipped sub-scope is reported as deleted.

use tracing::{debug, trace, warn};

use super::seen::{SeenKey, SeenSets, SkipKey};
use super::types::{ChangeType, SyncMode};
use crate::error::Result;
use crate::hash::HashNormalizer;
use crate::model::{SourceElement, SourceFile, SourceModel, SourceView};
use crate::provenance::{
    view_provenance, ElementProvenance, IdPolicy, ModelProvenance, StoredProvenance,
};
use crate::storage::{
    DiscardEntry, ElementEntry, ElementFilter, ElementScope, FileEntry, FileSyncId, ModelEntry, ModelSyncId,
    SourceIdentity, SyncInfo, ViewEntry,
};

/// One element lookup.
pub struct ElementQuery<'a> {
    pub element: &'a SourceElement,
    pub file: FileSyncId,
    pub model: ModelSyncId,
    pub policy: IdPolicy,
    /// A resource this element depends on changed since the last run.
    pub external_resource_changed: bool,
    /// Narrows content-hash matches when a model legitimately repeats
    /// identical content.
    pub filter: Option<ElementFilter<'a>>,
}

impl<'a> ElementQuery<'a> {
    #[must_use]
    pub const fn new(
        element: &'a SourceElement,
        file: FileSyncId,
        model: ModelSyncId,
        policy: IdPolicy,
    ) -> Self {
        Self {
            element,
            file,
            model,
            policy,
            external_resource_changed: false,
            filter: None,
        }
    }

    #[must_use]
    pub const fn with_resource_changed(mut self, changed: bool) -> Self {
        self.external_resource_changed = changed;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: ElementFilter<'a>) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Result of classifying one element.
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub change_type: ChangeType,
    pub current: ElementProvenance,
    pub identity: SourceIdentity,
    pub existing: Option<ElementEntry>,
    /// Set when the entry was found under a different model of the same
    /// file; the update must move it.
    pub moved_from: Option<ModelSyncId>,
}

/// Result of classifying one model.
#[derive(Debug, Clone)]
pub struct ModelSearch {
    pub change_type: ChangeType,
    pub current: ModelProvenance,
    pub existing: Option<ModelEntry>,
}

/// Result of classifying one view.
#[derive(Debug, Clone)]
pub struct ViewSearch {
    pub change_type: ChangeType,
    pub current: StoredProvenance,
    pub existing: Option<ViewEntry>,
}

/// Result of the unchanged-file check.
#[derive(Debug, Clone)]
pub struct FileCheck {
    pub existing: Option<FileEntry>,
    pub skip: bool,
    /// The stored identity policy differs from this run's.
    pub policy_changed: bool,
}

/// Records inferred deleted within one file.
#[derive(Debug, Clone, Default)]
pub struct Deletions {
    pub elements: Vec<ElementEntry>,
    pub models: Vec<ModelEntry>,
    pub views: Vec<ViewEntry>,
    /// Discard entries for elements no longer in the source.
    pub discards: Vec<DiscardEntry>,
}

impl Deletions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
            && self.models.is_empty()
            && self.views.is_empty()
            && self.discards.is_empty()
    }

    /// Target records to delete; discard entries have none.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len() + self.models.len() + self.views.len()
    }
}

/// Outcome of the identity lookup for one element.
#[derive(Debug, Default)]
struct Lookup {
    entry: Option<ElementEntry>,
    moved_from: Option<ModelSyncId>,
    /// More than one unclaimed entry shares the content hash.
    ambiguous: bool,
}

impl Lookup {
    fn found(entry: ElementEntry) -> Self {
        Self {
            entry: Some(entry),
            ..Self::default()
        }
    }
}

/// Classifies records and infers deletions for one run.
#[derive(Debug)]
pub struct ChangeDetector {
    mode: SyncMode,
    seen: SeenSets,
    root_transform_changed: bool,
}

impl ChangeDetector {
    #[must_use]
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            seen: SeenSets::new(),
            root_transform_changed: false,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Applies to every record for the rest of the run.
    pub fn set_root_transform_changed(&mut self, changed: bool) {
        self.root_transform_changed = changed;
    }

    #[must_use]
    pub const fn root_transform_changed(&self) -> bool {
        self.root_transform_changed
    }

    #[must_use]
    pub const fn seen(&self) -> &SeenSets {
        &self.seen
    }

    pub fn mark_seen(&mut self, key: SeenKey) {
        self.seen.mark_seen(key);
    }

    pub fn mark_skipped(&mut self, key: SkipKey) {
        debug!(?key, "Skipping unchanged scope");
        self.seen.mark_skipped(key);
    }

    /// Clear per-run state.
    pub fn end_run(&mut self) {
        self.seen.clear();
        self.root_transform_changed = false;
    }

    // ==================
    // Classification
    // ==================

    /// Decide whether a file can be bypassed without visiting its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup fails.
    pub fn should_skip_file(
        &self,
        sync: &SyncInfo<'_>,
        file: &SourceFile,
        policy: IdPolicy,
    ) -> Result<FileCheck> {
        let Some(entry) = sync.find_file_by_name(&file.unique_name)? else {
            return Ok(FileCheck {
                existing: None,
                skip: false,
                policy_changed: false,
            });
        };

        let policy_changed = entry.provenance.id_policy != policy;
        if policy_changed {
            warn!(
                file = %file.unique_name,
                stored = entry.provenance.id_policy.as_str(),
                current = policy.as_str(),
                "Identity policy changed since the last run; entries under the old policy will be replaced"
            );
        }

        let skip = self.mode == SyncMode::Update
            && !policy_changed
            && !self.root_transform_changed
            && !entry.provenance.has_changed(file);

        Ok(FileCheck {
            existing: Some(entry),
            skip,
            policy_changed,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the store lookup fails.
    pub fn is_model_changed(
        &self,
        sync: &SyncInfo<'_>,
        file: FileSyncId,
        model: &SourceModel,
    ) -> Result<ModelSearch> {
        let current = ModelProvenance::compute(model);
        if self.mode == SyncMode::Create {
            return Ok(ModelSearch {
                change_type: ChangeType::Insert,
                current,
                existing: None,
            });
        }

        let existing = sync.find_model(file, model.id)?;
        let change_type = match &existing {
            None => ChangeType::Insert,
            Some(entry) if entry.provenance.hash != current.hash => ChangeType::Update,
            Some(_) if self.root_transform_changed => ChangeType::Update,
            Some(_) => ChangeType::None,
        };

        trace!(model = %model.id, name = %model.name, change = change_type.as_str(), "Classified model");
        Ok(ModelSearch {
            change_type,
            current,
            existing,
        })
    }

    /// Whether a model's contents are provably unchanged since the last run.
    ///
    /// Requires the source to report a contents timestamp; without one the
    /// elements must be visited.
    #[must_use]
    pub fn are_model_contents_unchanged(&self, existing: &ModelEntry, model: &SourceModel) -> bool {
        if self.mode != SyncMode::Update || self.root_transform_changed {
            return false;
        }
        match (existing.provenance.contents_last_modified, model.contents_last_modified) {
            (Some(stored), Some(current)) => stored.to_bits() == current.to_bits(),
            _ => false,
        }
    }

    /// Classify one element.
    ///
    /// # Errors
    ///
    /// Returns an error if a store lookup fails.
    pub fn is_element_changed(
        &self,
        sync: &SyncInfo<'_>,
        normalizer: &HashNormalizer,
        query: &ElementQuery<'_>,
    ) -> Result<SearchResults> {
        let element = query.element;
        let current = ElementProvenance::compute(element, normalizer, query.policy);
        let identity = match (&element.freeform_id, query.policy) {
            (Some(name), _) => SourceIdentity::Freeform(name.clone()),
            (None, IdPolicy::ByStableId) => SourceIdentity::StableId(element.id),
            (None, IdPolicy::ByContentHash) => SourceIdentity::ContentHash(current.hash),
        };

        if self.mode == SyncMode::Create {
            return Ok(SearchResults {
                change_type: ChangeType::Insert,
                current,
                identity,
                existing: None,
                moved_from: None,
            });
        }

        let Lookup {
            entry: existing,
            moved_from,
            ambiguous,
        } = self.find_existing(sync, query, &identity)?;
        let change_type = match &existing {
            None => ChangeType::Insert,
            Some(entry) if !current.matches(&entry.provenance) => ChangeType::Update,
            Some(_) if moved_from.is_some() || ambiguous => ChangeType::Update,
            Some(_) if self.root_transform_changed || query.external_resource_changed => {
                ChangeType::Update
            }
            Some(_) => ChangeType::None,
        };

        trace!(
            element = %element.id,
            model = %query.model,
            hash = %current.hash,
            change = change_type.as_str(),
            "Classified element"
        );

        Ok(SearchResults {
            change_type,
            current,
            identity,
            existing,
            moved_from,
        })
    }

    fn find_existing(
        &self,
        sync: &SyncInfo<'_>,
        query: &ElementQuery<'_>,
        identity: &SourceIdentity,
    ) -> Result<Lookup> {
        match identity {
            SourceIdentity::StableId(id) => {
                if let Some(entry) = sync.find_element_by_stable_id(query.model, *id)? {
                    return Ok(Lookup::found(entry));
                }

                let Some(entry) = sync.find_element_in_file_by_stable_id(query.file, *id)? else {
                    return Ok(Lookup::default());
                };
                if self.seen.is_seen(SeenKey::Element(entry.target)) {
                    warn!(
                        element = %id,
                        model = %query.model,
                        "Stable id already claimed by another model this run; treating as new"
                    );
                    return Ok(Lookup::default());
                }
                if sync.find_model_by_id(entry.model)?.is_none() {
                    warn!(element = %id, owner = %entry.model, "Entry references a missing model; treating as new");
                    return Ok(Lookup::default());
                }

                debug!(element = %id, from = %entry.model, to = %query.model, "Element moved between models");
                let from = entry.model;
                Ok(Lookup {
                    moved_from: Some(from),
                    ..Lookup::found(entry)
                })
            }
            SourceIdentity::ContentHash(hash) => {
                let candidates = sync.find_elements_by_content_hash(query.model, hash)?;
                let mut unclaimed = candidates
                    .into_iter()
                    .filter(|c| !self.seen.is_seen(SeenKey::Element(c.target)))
                    .filter(|c| query.filter.is_none_or(|f| f(c)));

                let Some(first) = unclaimed.next() else {
                    return Ok(Lookup::default());
                };
                let ambiguous = unclaimed.next().is_some();
                if ambiguous {
                    warn!(
                        element = %query.element.id,
                        model = %query.model,
                        hash = %hash,
                        filtered = query.filter.is_some(),
                        "Ambiguous content-hash match; updating the oldest entry"
                    );
                }
                Ok(Lookup {
                    ambiguous,
                    ..Lookup::found(first)
                })
            }
            SourceIdentity::Freeform(name) => Ok(Lookup {
                entry: sync.find_element_by_freeform(query.model, name)?,
                ..Lookup::default()
            }),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the store lookup fails or the view content
    /// cannot be serialized.
    pub fn is_view_changed(
        &self,
        sync: &SyncInfo<'_>,
        file: FileSyncId,
        view: &SourceView,
    ) -> Result<ViewSearch> {
        let current = view_provenance(view)?;
        if self.mode == SyncMode::Create {
            return Ok(ViewSearch {
                change_type: ChangeType::Insert,
                current,
                existing: None,
            });
        }

        let existing = sync.find_view(file, view.id)?;
        let change_type = match &existing {
            None => ChangeType::Insert,
            Some(entry) if entry.provenance.hash != current.hash => ChangeType::Update,
            Some(_) if self.root_transform_changed => ChangeType::Update,
            Some(_) => ChangeType::None,
        };

        Ok(ViewSearch {
            change_type,
            current,
            existing,
        })
    }

    // ==================
    // Deletion inference
    // ==================

    /// Whether entries under this file may be inferred deleted at all.
    fn file_was_visited(&self, file: FileSyncId) -> bool {
        if self.mode != SyncMode::Update {
            return false;
        }
        if self.seen.is_skipped(SkipKey::File(file)) {
            return false;
        }
        if !self.seen.is_seen(SeenKey::File(file)) {
            debug!(file = %file, "File not part of this run; no deletions inferred");
            return false;
        }
        true
    }

    /// Element entries under the file that were not seen this run.
    ///
    /// Entries in skipped models are excluded. Entries in models that were
    /// themselves deleted are included, so callers can remove elements
    /// before their model.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan fails.
    pub fn detect_deleted_elements_in_file(
        &self,
        sync: &SyncInfo<'_>,
        file: FileSyncId,
    ) -> Result<Vec<ElementEntry>> {
        if !self.file_was_visited(file) {
            return Ok(Vec::new());
        }

        let mut deleted = Vec::new();
        for model in sync.models_in_file(file)? {
            if self.seen.is_skipped(SkipKey::Model(model.id)) {
                continue;
            }
            for entry in sync.iterate_elements(ElementScope::Model(model.id))? {
                if !self.seen.is_seen(SeenKey::Element(entry.target)) {
                    deleted.push(entry);
                }
            }
        }
        Ok(deleted)
    }

    /// # Errors
    ///
    /// Returns an error if the store scan fails.
    pub fn detect_deleted_models_in_file(
        &self,
        sync: &SyncInfo<'_>,
        file: FileSyncId,
    ) -> Result<Vec<ModelEntry>> {
        if !self.file_was_visited(file) {
            return Ok(Vec::new());
        }
        Ok(sync
            .models_in_file(file)?
            .into_iter()
            .filter(|m| !self.seen.is_seen(SeenKey::Model(m.id)))
            .collect())
    }

    /// # Errors
    ///
    /// Returns an error if the store scan fails.
    pub fn detect_deleted_views_in_file(
        &self,
        sync: &SyncInfo<'_>,
        file: FileSyncId,
    ) -> Result<Vec<ViewEntry>> {
        if !self.file_was_visited(file) {
            return Ok(Vec::new());
        }
        Ok(sync
            .views_in_file(file)?
            .into_iter()
            .filter(|v| !self.seen.is_seen(SeenKey::View(v.target)))
            .collect())
    }

    /// Discard entries under the file that were not seen this run, outside
    /// skipped models.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan fails.
    pub fn detect_deleted_discards_in_file(
        &self,
        sync: &SyncInfo<'_>,
        file: FileSyncId,
    ) -> Result<Vec<DiscardEntry>> {
        if !self.file_was_visited(file) {
            return Ok(Vec::new());
        }
        Ok(sync
            .discards_in_file(file)?
            .into_iter()
            .filter(|d| !self.seen.is_skipped(SkipKey::Model(d.model)))
            .filter(|d| !self.seen.is_seen(SeenKey::Discard(d.row)))
            .collect())
    }

    /// Elements, then models, then views, then stale discards.
    ///
    /// # Errors
    ///
    /// Returns an error if a store scan fails.
    pub fn detect_deleted(&self, sync: &SyncInfo<'_>, file: FileSyncId) -> Result<Deletions> {
        Ok(Deletions {
            elements: self.detect_deleted_elements_in_file(sync, file)?,
            models: self.detect_deleted_models_in_file(sync, file)?,
            views: self.detect_deleted_views_in_file(sync, file)?,
            discards: self.detect_deleted_discards_in_file(sync, file)?,
        })
    }

    /// Files in the store that this run never encountered.
    ///
    /// Only meaningful when the run was given every file of the job.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan fails.
    pub fn detect_deleted_files(&self, sync: &SyncInfo<'_>) -> Result<Vec<FileEntry>> {
        if self.mode != SyncMode::Update {
            return Ok(Vec::new());
        }
        Ok(sync
            .files()?
            .into_iter()
            .filter(|f| !self.seen.is_seen(SeenKey::File(f.id)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use crate::model::StableId;
    use crate::provenance::{DiskFileInfo, FileProvenance};
    use crate::storage::{SyncStore, TargetId};

    struct Fixture {
        store: SyncStore,
        file: FileSyncId,
        model: ModelSyncId,
        normalizer: HashNormalizer,
    }

    impl Fixture {
        fn new() -> Self {
            let store = SyncStore::open_memory().unwrap();
            let sync = SyncInfo::new(store.conn());
            let mut source = SourceFile::new("/work/site.dgn");
            source.last_save_time = 10.0;
            let file = sync
                .insert_file(&FileProvenance::from_source(&source, IdPolicy::ByStableId))
                .unwrap();
            let model = sync
                .insert_model(
                    file,
                    StableId(0),
                    "Default",
                    TargetId(1),
                    &ModelProvenance::compute(&SourceModel::new(0, "Default")),
                )
                .unwrap();
            Self {
                store,
                file,
                model,
                normalizer: HashNormalizer::new(),
            }
        }

        fn sync(&self) -> SyncInfo<'_> {
            SyncInfo::new(self.store.conn())
        }

        fn hash(&self, element: &SourceElement) -> ContentHash {
            self.normalizer.compute_hash(element)
        }

        fn store_by_id(&self, element: &SourceElement, target: i64) {
            self.sync()
                .insert_element(
                    self.model,
                    &SourceIdentity::StableId(element.id),
                    Some(element.id),
                    TargetId(target),
                    &StoredProvenance {
                        last_modified: element.header.last_modified,
                        hash: self.hash(element),
                    },
                )
                .unwrap();
        }

        fn store_by_hash(&self, element: &SourceElement, target: i64) {
            let hash = self.hash(element);
            self.sync()
                .insert_element(
                    self.model,
                    &SourceIdentity::ContentHash(hash),
                    Some(element.id),
                    TargetId(target),
                    &StoredProvenance {
                        last_modified: 0.0,
                        hash,
                    },
                )
                .unwrap();
        }

        fn classify(
            &self,
            detector: &ChangeDetector,
            element: &SourceElement,
            policy: IdPolicy,
        ) -> SearchResults {
            let query = ElementQuery::new(element, self.file, self.model, policy);
            detector
                .is_element_changed(&self.sync(), &self.normalizer, &query)
                .unwrap()
        }
    }

    #[test]
    fn test_unknown_element_is_insert() {
        let fx = Fixture::new();
        let detector = ChangeDetector::new(SyncMode::Update);
        let result = fx.classify(&detector, &SourceElement::new(1, b"new".to_vec()), IdPolicy::ByStableId);
        assert_eq!(result.change_type, ChangeType::Insert);
        assert!(result.existing.is_none());
    }

    #[test]
    fn test_identical_content_is_none_even_if_touched() {
        let fx = Fixture::new();
        let original = SourceElement::new(7, b"wall".to_vec()).with_last_modified(1.0);
        fx.store_by_id(&original, 100);

        let touched = SourceElement::new(7, b"wall".to_vec()).with_last_modified(2.0);
        let detector = ChangeDetector::new(SyncMode::Update);
        let result = fx.classify(&detector, &touched, IdPolicy::ByStableId);
        assert_eq!(result.change_type, ChangeType::None);
        assert_eq!(result.existing.unwrap().target, TargetId(100));
    }

    #[test]
    fn test_reused_stable_id_is_update_of_old_entry() {
        let fx = Fixture::new();
        let content_a = SourceElement::new(42, b"content A".to_vec());
        fx.store_by_id(&content_a, 100);

        let content_b = SourceElement::new(42, b"unrelated content B".to_vec());
        let detector = ChangeDetector::new(SyncMode::Update);
        let result = fx.classify(&detector, &content_b, IdPolicy::ByStableId);

        assert_eq!(result.change_type, ChangeType::Update);
        let existing = result.existing.unwrap();
        assert_eq!(existing.target, TargetId(100));
        assert_eq!(existing.provenance.hash, fx.hash(&content_a));
        assert_eq!(result.current.hash, fx.hash(&content_b));
    }

    #[test]
    fn test_content_hash_identity_survives_renumbering() {
        let fx = Fixture::new();
        let original = SourceElement::new(5, b"bolt".to_vec());
        fx.store_by_hash(&original, 200);

        let renumbered = SourceElement::new(9005, b"bolt".to_vec());
        let detector = ChangeDetector::new(SyncMode::Update);
        let result = fx.classify(&detector, &renumbered, IdPolicy::ByContentHash);
        assert_eq!(result.change_type, ChangeType::None);
        assert_eq!(result.existing.unwrap().target, TargetId(200));

        // The same record under the other policy is not found.
        let by_id = fx.classify(&detector, &renumbered, IdPolicy::ByStableId);
        assert_eq!(by_id.change_type, ChangeType::Insert);
    }

    #[test]
    fn test_repeated_content_claims_distinct_entries() {
        let fx = Fixture::new();
        let bolt = SourceElement::new(1, b"bolt".to_vec());
        fx.store_by_hash(&bolt, 200);
        fx.store_by_hash(&SourceElement::new(2, b"bolt".to_vec()), 201);

        let mut detector = ChangeDetector::new(SyncMode::Update);
        // Two live entries share the hash: the oldest is updated.
        let first = fx.classify(&detector, &bolt, IdPolicy::ByContentHash);
        assert_eq!(first.change_type, ChangeType::Update);
        let first_target = first.existing.unwrap().target;
        assert_eq!(first_target, TargetId(200));
        detector.mark_seen(SeenKey::Element(first_target));

        // Only one left, so the match is exact.
        let second = fx.classify(&detector, &bolt, IdPolicy::ByContentHash);
        assert_eq!(second.change_type, ChangeType::None);
        let second_target = second.existing.unwrap().target;
        assert_ne!(first_target, second_target);
        detector.mark_seen(SeenKey::Element(second_target));

        // A third copy has nothing left to claim.
        let third = fx.classify(&detector, &bolt, IdPolicy::ByContentHash);
        assert_eq!(third.change_type, ChangeType::Insert);
    }

    #[test]
    fn test_filter_narrows_hash_match() {
        let fx = Fixture::new();
        fx.store_by_hash(&SourceElement::new(1, b"bolt".to_vec()), 200);
        fx.store_by_hash(&SourceElement::new(2, b"bolt".to_vec()), 201);

        let detector = ChangeDetector::new(SyncMode::Update);
        let element = SourceElement::new(2, b"bolt".to_vec());
        let same_source = |e: &ElementEntry| e.source_id == Some(element.id);
        let query = ElementQuery::new(&element, fx.file, fx.model, IdPolicy::ByContentHash)
            .with_filter(&same_source);
        let result = detector
            .is_element_changed(&fx.sync(), &fx.normalizer, &query)
            .unwrap();
        assert_eq!(result.existing.unwrap().target, TargetId(201));
    }

    #[test]
    fn test_ambiguous_filtered_match_is_update_of_oldest() {
        let fx = Fixture::new();
        let bolt = SourceElement::new(1, b"bolt".to_vec());
        fx.store_by_hash(&bolt, 200);
        fx.store_by_hash(&SourceElement::new(2, b"bolt".to_vec()), 201);

        let detector = ChangeDetector::new(SyncMode::Update);
        let accept_all = |_: &ElementEntry| true;
        let query = ElementQuery::new(&bolt, fx.file, fx.model, IdPolicy::ByContentHash)
            .with_filter(&accept_all);
        let result = detector
            .is_element_changed(&fx.sync(), &fx.normalizer, &query)
            .unwrap();
        assert_eq!(result.change_type, ChangeType::Update);
        assert_eq!(result.existing.unwrap().target, TargetId(200));
    }

    #[test]
    fn test_root_transform_forces_update() {
        let fx = Fixture::new();
        let element = SourceElement::new(1, b"slab".to_vec());
        fx.store_by_id(&element, 100);

        let mut detector = ChangeDetector::new(SyncMode::Update);
        detector.set_root_transform_changed(true);
        assert_eq!(
            fx.classify(&detector, &element, IdPolicy::ByStableId).change_type,
            ChangeType::Update
        );
    }

    #[test]
    fn test_resource_change_forces_update() {
        let fx = Fixture::new();
        let element = SourceElement::new(1, b"raster".to_vec());
        fx.store_by_id(&element, 100);

        let detector = ChangeDetector::new(SyncMode::Update);
        let query = ElementQuery::new(&element, fx.file, fx.model, IdPolicy::ByStableId)
            .with_resource_changed(true);
        let result = detector
            .is_element_changed(&fx.sync(), &fx.normalizer, &query)
            .unwrap();
        assert_eq!(result.change_type, ChangeType::Update);
    }

    #[test]
    fn test_moved_element_updates_old_entry() {
        let fx = Fixture::new();
        let element = SourceElement::new(42, b"column".to_vec());
        fx.store_by_id(&element, 100);
        let other = fx
            .sync()
            .insert_model(
                fx.file,
                StableId(1),
                "Level 2",
                TargetId(2),
                &ModelProvenance::compute(&SourceModel::new(1, "Level 2")),
            )
            .unwrap();

        let detector = ChangeDetector::new(SyncMode::Update);
        let query = ElementQuery::new(&element, fx.file, other, IdPolicy::ByStableId);
        let result = detector
            .is_element_changed(&fx.sync(), &fx.normalizer, &query)
            .unwrap();
        assert_eq!(result.change_type, ChangeType::Update);
        assert_eq!(result.moved_from, Some(fx.model));
        assert_eq!(result.existing.unwrap().target, TargetId(100));
    }

    #[test]
    fn test_create_mode_never_looks_up() {
        let fx = Fixture::new();
        let element = SourceElement::new(1, b"slab".to_vec());
        fx.store_by_id(&element, 100);

        let detector = ChangeDetector::new(SyncMode::Create);
        let result = fx.classify(&detector, &element, IdPolicy::ByStableId);
        assert_eq!(result.change_type, ChangeType::Insert);
        assert!(detector
            .detect_deleted(&fx.sync(), fx.file)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_deletion_flags_exactly_the_unseen() {
        let fx = Fixture::new();
        let elements: Vec<_> = (1..=5)
            .map(|i| SourceElement::new(i, format!("e{i}").into_bytes()))
            .collect();
        for (i, e) in elements.iter().enumerate() {
            fx.store_by_id(e, 100 + i64::try_from(i).unwrap());
        }

        let mut detector = ChangeDetector::new(SyncMode::Update);
        detector.mark_seen(SeenKey::File(fx.file));
        detector.mark_seen(SeenKey::Model(fx.model));
        // Element 3 is gone from the source.
        for e in elements.iter().filter(|e| e.id != StableId(3)) {
            let result = fx.classify(&detector, e, IdPolicy::ByStableId);
            assert_eq!(result.change_type, ChangeType::None);
            detector.mark_seen(SeenKey::Element(result.existing.unwrap().target));
        }

        let deletions = detector.detect_deleted(&fx.sync(), fx.file).unwrap();
        assert_eq!(deletions.len(), 1);
        assert_eq!(deletions.elements[0].source_id, Some(StableId(3)));
        assert_eq!(deletions.elements[0].target, TargetId(102));
    }

    #[test]
    fn test_skipped_model_is_never_deleted() {
        let fx = Fixture::new();
        fx.store_by_id(&SourceElement::new(1, b"a".to_vec()), 100);
        fx.store_by_id(&SourceElement::new(2, b"b".to_vec()), 101);

        let mut detector = ChangeDetector::new(SyncMode::Update);
        detector.mark_seen(SeenKey::File(fx.file));
        detector.mark_skipped(SkipKey::Model(fx.model));

        assert!(detector.detect_deleted(&fx.sync(), fx.file).unwrap().is_empty());
    }

    #[test]
    fn test_skipped_file_is_never_deleted() {
        let fx = Fixture::new();
        fx.store_by_id(&SourceElement::new(1, b"a".to_vec()), 100);

        let mut detector = ChangeDetector::new(SyncMode::Update);
        detector.mark_skipped(SkipKey::File(fx.file));

        assert!(detector.detect_deleted(&fx.sync(), fx.file).unwrap().is_empty());
        assert!(detector.detect_deleted_files(&fx.sync()).unwrap().is_empty());
    }

    #[test]
    fn test_unvisited_file_reported_only_by_file_scan() {
        let fx = Fixture::new();
        fx.store_by_id(&SourceElement::new(1, b"a".to_vec()), 100);

        let detector = ChangeDetector::new(SyncMode::Update);
        assert!(detector.detect_deleted(&fx.sync(), fx.file).unwrap().is_empty());
        let files = detector.detect_deleted_files(&fx.sync()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, fx.file);
    }

    #[test]
    fn test_unseen_model_and_its_elements_are_deleted() {
        let fx = Fixture::new();
        fx.store_by_id(&SourceElement::new(1, b"a".to_vec()), 100);

        let mut detector = ChangeDetector::new(SyncMode::Update);
        detector.mark_seen(SeenKey::File(fx.file));

        let deletions = detector.detect_deleted(&fx.sync(), fx.file).unwrap();
        assert_eq!(deletions.elements.len(), 1);
        assert_eq!(deletions.models.len(), 1);
        assert_eq!(deletions.models[0].id, fx.model);
    }

    #[test]
    fn test_file_skip_uses_save_time() {
        let fx = Fixture::new();
        let detector = ChangeDetector::new(SyncMode::Update);
        let mut source = SourceFile::new("/work/site.dgn");
        source.last_save_time = 10.0;
        source.disk = DiskFileInfo {
            last_modified: 999,
            size: 1,
        };

        let check = detector
            .should_skip_file(&fx.sync(), &source, IdPolicy::ByStableId)
            .unwrap();
        assert!(check.skip);
        assert_eq!(check.existing.unwrap().id, fx.file);

        source.last_save_time = 11.0;
        let check = detector
            .should_skip_file(&fx.sync(), &source, IdPolicy::ByStableId)
            .unwrap();
        assert!(!check.skip);
    }

    #[test]
    fn test_policy_drift_disables_skip() {
        let fx = Fixture::new();
        let detector = ChangeDetector::new(SyncMode::Update);
        let mut source = SourceFile::new("/work/site.dgn");
        source.last_save_time = 10.0;

        let check = detector
            .should_skip_file(&fx.sync(), &source, IdPolicy::ByContentHash)
            .unwrap();
        assert!(check.policy_changed);
        assert!(!check.skip);
    }

    #[test]
    fn test_model_contents_fast_path() {
        let fx = Fixture::new();
        let detector = ChangeDetector::new(SyncMode::Update);
        let mut model = SourceModel::new(0, "Default");

        let existing = fx.sync().find_model(fx.file, model.id).unwrap().unwrap();
        // No timestamp from the source: never skip.
        assert!(!detector.are_model_contents_unchanged(&existing, &model));

        fx.sync()
            .set_model_contents_last_modified(fx.model, Some(50.0))
            .unwrap();
        let existing = fx.sync().find_model(fx.file, model.id).unwrap().unwrap();
        model.contents_last_modified = Some(50.0);
        assert!(detector.are_model_contents_unchanged(&existing, &model));

        model.contents_last_modified = Some(51.0);
        assert!(!detector.are_model_contents_unchanged(&existing, &model));
    }

    #[test]
    fn test_view_classification() {
        let fx = Fixture::new();
        let detector = ChangeDetector::new(SyncMode::Update);
        let mut view = SourceView {
            id: StableId(7),
            name: "Top".to_string(),
            last_modified: 1.0,
            content: serde_json::json!({"origin": [0, 0, 0]}),
        };

        let first = detector.is_view_changed(&fx.sync(), fx.file, &view).unwrap();
        assert_eq!(first.change_type, ChangeType::Insert);
        fx.sync()
            .insert_view(fx.file, view.id, &view.name, TargetId(300), &first.current)
            .unwrap();

        assert_eq!(
            detector.is_view_changed(&fx.sync(), fx.file, &view).unwrap().change_type,
            ChangeType::None
        );

        view.content = serde_json::json!({"origin": [5, 0, 0]});
        assert_eq!(
            detector.is_view_changed(&fx.sync(), fx.file, &view).unwrap().change_type,
            ChangeType::Update
        );
    }

    #[test]
    fn test_end_run_clears_state() {
        let mut detector = ChangeDetector::new(SyncMode::Update);
        detector.set_root_transform_changed(true);
        detector.mark_seen(SeenKey::Element(TargetId(1)));
        detector.end_run();
        assert!(detector.seen().is_empty());
        assert!(!detector.root_transform_changed());
    }
}
