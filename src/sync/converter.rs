//! The conversion driver.
//!
//! One pass over every loaded file: classify each record with the
//! [`ChangeDetector`], transcode what changed, and apply the target
//! mutation together with its SyncInfo write and audit event in a single
//! transaction. After the pass, inferred deletions are applied and file
//! provenance is brought up to date.
//!
//! File provenance is only written once the whole run has succeeded. A
//! newly registered file starts with placeholder provenance, so a run that
//! stops early never makes a file look unchanged to the next one.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::detector::{ChangeDetector, ElementQuery};
use super::resources::{changed_resources, record_resources};
use super::seen::{SeenKey, SkipKey};
use super::transcode::{DefaultTranscoder, Transcoded, Transcoder};
use super::types::{ChangeType, ConvertStats, SyncMode};
use crate::error::{Error, Result};
use crate::hash::HashNormalizer;
use crate::model::{FileHandle, SourceArena, SourceElement, SourceFile, SourceModel, SourceView, Transform};
use crate::provenance::{FileProvenance, IdPolicy, ModelProvenance};
use crate::storage::events::{EntityKind, EventType};
use crate::storage::{
    ElementEntry, ElementScope, FileSyncId, ModelSyncId, SourceIdentity, SyncInfo, SyncStore,
    TargetId, TargetRepo,
};

const ROOT_TRANSFORM_KEY: &str = "root_transform";

/// Cooperative cancellation flag, checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Job-level settings for one run.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub mode: SyncMode,
    /// Used when neither the job nor the file declares a policy.
    pub default_policy: IdPolicy,
    /// Per-file overrides, keyed by unique file name.
    pub file_policies: HashMap<String, IdPolicy>,
    pub root_transform: Transform,
    /// Treat stored files missing from this run as deleted. Only safe when
    /// the run is given every file of the job.
    pub detect_deleted_files: bool,
    /// Resource URIs to treat as changed regardless of their recorded state.
    pub changed_resources: HashSet<String>,
}

impl ConvertOptions {
    #[must_use]
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            default_policy: IdPolicy::default(),
            file_policies: HashMap::new(),
            root_transform: Transform::IDENTITY,
            detect_deleted_files: false,
            changed_resources: HashSet::new(),
        }
    }

    /// Job override, then the file's own declaration, then the default.
    #[must_use]
    pub fn policy_for(&self, file: &SourceFile) -> IdPolicy {
        self.file_policies
            .get(&file.unique_name)
            .copied()
            .or(file.id_policy)
            .unwrap_or(self.default_policy)
    }
}

/// A file the pass reached, skipped or not.
#[derive(Debug, Clone, Copy)]
struct VisitedFile {
    handle: FileHandle,
    id: FileSyncId,
    policy: IdPolicy,
    skipped: bool,
}

/// Drives one conversion run against a store.
pub struct Converter<'s> {
    store: &'s mut SyncStore,
    detector: ChangeDetector,
    normalizer: HashNormalizer,
    transcoder: Box<dyn Transcoder>,
    options: ConvertOptions,
    cancel: CancelToken,
    run_id: String,
    stats: ConvertStats,
}

impl<'s> Converter<'s> {
    #[must_use]
    pub fn new(store: &'s mut SyncStore, options: ConvertOptions) -> Self {
        Self {
            store,
            detector: ChangeDetector::new(options.mode),
            normalizer: HashNormalizer::new(),
            transcoder: Box::new(DefaultTranscoder),
            options,
            cancel: CancelToken::new(),
            run_id: Uuid::new_v4().to_string(),
            stats: ConvertStats::default(),
        }
    }

    #[must_use]
    pub fn with_transcoder(mut self, transcoder: Box<dyn Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    #[must_use]
    pub fn with_normalizer(mut self, normalizer: HashNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the pass over every file in the arena.
    ///
    /// The run is recorded in `sync_runs` whether it completes, fails or is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the token fires, or the first store,
    /// serialization or transcoder failure. Records committed before the
    /// failure stay committed.
    pub fn run(&mut self, arena: &SourceArena) -> Result<ConvertStats> {
        self.store.begin_run(&self.run_id, self.options.mode.as_str())?;
        info!(
            run_id = %self.run_id,
            mode = self.options.mode.as_str(),
            files = arena.len(),
            "Starting conversion"
        );

        let outcome = self.run_pass(arena);
        self.detector.end_run();

        match outcome {
            Ok(()) => {
                self.store
                    .finish_run(&self.run_id, "completed", &self.stats.run_counts())?;
                info!(
                    inserted = self.stats.inserted,
                    updated = self.stats.updated,
                    unchanged = self.stats.unchanged,
                    deleted = self.stats.deleted,
                    skipped_files = self.stats.skipped_files,
                    "Conversion complete"
                );
                Ok(self.stats.clone())
            }
            Err(err) => {
                let status = if matches!(err, Error::Cancelled) {
                    "cancelled"
                } else {
                    "failed"
                };
                if let Err(finish_err) =
                    self.store
                        .finish_run(&self.run_id, status, &self.stats.run_counts())
                {
                    warn!(error = %finish_err, "Failed to record run outcome");
                }
                Err(err)
            }
        }
    }

    fn run_pass(&mut self, arena: &SourceArena) -> Result<()> {
        self.check_root_transform()?;

        let mut visited = Vec::with_capacity(arena.len());
        for handle in arena.files() {
            self.check_cancelled()?;
            visited.push(self.convert_file(arena, handle)?);
        }

        if self.options.mode == SyncMode::Update {
            for file in &visited {
                self.apply_deletions(file.id)?;
            }
            if self.options.detect_deleted_files {
                self.delete_missing_files()?;
            }
        }

        for file in visited.iter().filter(|f| !f.skipped) {
            self.finish_file(arena.file(file.handle), file)?;
        }
        self.store_root_transform()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!(run_id = %self.run_id, "Conversion cancelled");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    // ==================
    // Root transform
    // ==================

    fn check_root_transform(&mut self) -> Result<()> {
        if self.options.mode != SyncMode::Update {
            return Ok(());
        }
        let stored = SyncInfo::new(self.store.conn()).get_meta(ROOT_TRANSFORM_KEY)?;
        let Some(stored) = stored else {
            return Ok(());
        };

        let stored: Transform = serde_json::from_str(&stored)?;
        if !stored.same_bits(&self.options.root_transform) {
            info!("Root transform changed; every record will be updated");
            self.detector.set_root_transform_changed(true);
        }
        Ok(())
    }

    fn store_root_transform(&mut self) -> Result<()> {
        let value = serde_json::to_string(&self.options.root_transform)?;
        self.store.mutate("set_root_transform", &self.run_id, |tx, _| {
            SyncInfo::new(tx).set_meta(ROOT_TRANSFORM_KEY, &value)?;
            Ok(())
        })
    }

    // ==================
    // Files
    // ==================

    fn convert_file(&mut self, arena: &SourceArena, handle: FileHandle) -> Result<VisitedFile> {
        let file = arena.file(handle);
        let policy = self.options.policy_for(file);
        self.stats.files += 1;

        let check = self.detector.should_skip_file(
            &SyncInfo::new(self.store.conn()),
            file,
            policy,
        )?;

        let id = match check.existing {
            Some(entry) => entry.id,
            None => {
                let provenance = FileProvenance::placeholder(file, policy);
                self.store.mutate("register_file", &self.run_id, |tx, ctx| {
                    let id = SyncInfo::new(tx).insert_file(&provenance)?;
                    ctx.record_detail(
                        EntityKind::File,
                        None,
                        EventType::Registered,
                        provenance.unique_name.clone(),
                    );
                    Ok(id)
                })?
            }
        };

        let changed = changed_resources(
            &SyncInfo::new(self.store.conn()),
            id,
            &file.resources,
            &self.options.changed_resources,
        )?;

        if check.skip && changed.is_empty() {
            info!(file = %file.unique_name, "File unchanged; skipping");
            self.detector.mark_skipped(SkipKey::File(id));
            self.stats.skipped_files += 1;
            return Ok(VisitedFile {
                handle,
                id,
                policy,
                skipped: true,
            });
        }

        info!(
            file = %file.unique_name,
            policy = policy.as_str(),
            models = file.models.len(),
            changed_resources = changed.len(),
            "Converting file"
        );
        self.detector.mark_seen(SeenKey::File(id));

        for model in arena.models(handle).map(|mh| arena.model(mh)) {
            self.check_cancelled()?;
            self.convert_model(file, model, id, policy, &changed)?;
        }
        for view in &file.views {
            self.check_cancelled()?;
            self.convert_view(id, view)?;
        }

        Ok(VisitedFile {
            handle,
            id,
            policy,
            skipped: false,
        })
    }

    fn finish_file(&mut self, file: &SourceFile, visited: &VisitedFile) -> Result<()> {
        let provenance = FileProvenance::from_source(file, visited.policy);
        self.store.mutate("update_file_provenance", &self.run_id, |tx, _| {
            let sync = SyncInfo::new(tx);
            sync.update_file(visited.id, &provenance)?;
            record_resources(&sync, visited.id, &file.resources)
        })
    }

    // ==================
    // Models
    // ==================

    fn convert_model(
        &mut self,
        file: &SourceFile,
        model: &SourceModel,
        file_id: FileSyncId,
        policy: IdPolicy,
        changed: &HashSet<String>,
    ) -> Result<()> {
        let search =
            self.detector
                .is_model_changed(&SyncInfo::new(self.store.conn()), file_id, model)?;
        self.stats.models += 1;
        self.stats.record(search.change_type);

        let stored_contents = search
            .existing
            .as_ref()
            .and_then(|e| e.provenance.contents_last_modified);

        let (model_id, model_target) = match (search.change_type, search.existing) {
            (ChangeType::None, Some(existing)) => {
                if changed.is_empty() && self.detector.are_model_contents_unchanged(&existing, model)
                {
                    debug!(model = %model.id, name = %model.name, "Model contents unchanged; skipping");
                    self.detector.mark_skipped(SkipKey::Model(existing.id));
                    self.stats.skipped_models += 1;
                    return Ok(());
                }
                (existing.id, existing.target)
            }
            (ChangeType::Update, Some(existing)) => {
                let target = self.transcoder.transcode_model(file, model)?;
                let provenance = search.current;
                let target_id = self.store.mutate("update_model", &self.run_id, |tx, ctx| {
                    let repo = TargetRepo::new(tx);
                    let target_id = if repo.update_model(existing.target, &target)? {
                        existing.target
                    } else {
                        warn!(model = %model.id, target = %existing.target, "Target model missing; re-inserting");
                        repo.insert_model(&target)?
                    };
                    SyncInfo::new(tx).update_model(existing.id, &model.name, target_id, &provenance)?;
                    ctx.record_event(EntityKind::Model, target_id, EventType::Updated);
                    Ok(target_id)
                })?;
                (existing.id, target_id)
            }
            _ => {
                let target = self.transcoder.transcode_model(file, model)?;
                // The contents timestamp is written once the elements are done.
                let provenance = ModelProvenance {
                    contents_last_modified: None,
                    ..search.current
                };
                self.store.mutate("insert_model", &self.run_id, |tx, ctx| {
                    let target_id = TargetRepo::new(tx).insert_model(&target)?;
                    let id = SyncInfo::new(tx).insert_model(
                        file_id,
                        model.id,
                        &model.name,
                        target_id,
                        &provenance,
                    )?;
                    ctx.record_event(EntityKind::Model, target_id, EventType::Inserted);
                    Ok((id, target_id))
                })?
            }
        };

        self.detector.mark_seen(SeenKey::Model(model_id));

        for element in &model.elements {
            self.check_cancelled()?;
            self.convert_element(model, element, file_id, model_id, model_target, policy, changed)?;
        }

        let current_contents = model.contents_last_modified;
        if stored_contents.map(f64::to_bits) != current_contents.map(f64::to_bits) {
            self.store.mutate("set_model_contents", &self.run_id, |tx, _| {
                SyncInfo::new(tx).set_model_contents_last_modified(model_id, current_contents)?;
                Ok(())
            })?;
        }
        Ok(())
    }

    // ==================
    // Elements
    // ==================

    #[allow(clippy::too_many_arguments)]
    fn convert_element(
        &mut self,
        model: &SourceModel,
        element: &SourceElement,
        file_id: FileSyncId,
        model_id: ModelSyncId,
        model_target: TargetId,
        policy: IdPolicy,
        changed: &HashSet<String>,
    ) -> Result<()> {
        let policy = element.id_policy.unwrap_or(policy);
        let resource_changed = element
            .external_resources
            .iter()
            .any(|uri| changed.contains(uri));
        let query = ElementQuery::new(element, file_id, model_id, policy)
            .with_resource_changed(resource_changed);
        let search = self.detector.is_element_changed(
            &SyncInfo::new(self.store.conn()),
            &self.normalizer,
            &query,
        )?;
        self.stats.elements += 1;

        if let (ChangeType::None, Some(existing)) = (search.change_type, &search.existing) {
            self.detector.mark_seen(SeenKey::Element(existing.target));
            self.stats.record(ChangeType::None);
            return Ok(());
        }

        let target = match self.transcoder.transcode_element(model, element)? {
            Transcoded::Element(target) => target,
            Transcoded::Discard => {
                return self.discard_element(
                    element,
                    model_id,
                    &search.identity,
                    search.existing.as_ref(),
                );
            }
        };

        let stored = search.current.to_stored();
        let source_id = Some(element.id);
        let target_id = match (search.change_type, search.existing) {
            (ChangeType::Update, Some(existing)) => {
                let event = if search.moved_from.is_some() {
                    EventType::Moved
                } else {
                    EventType::Updated
                };
                self.store.mutate("update_element", &self.run_id, |tx, ctx| {
                    let repo = TargetRepo::new(tx);
                    let target_id = if repo.update_element(existing.target, model_target, &target)? {
                        existing.target
                    } else {
                        warn!(element = %element.id, target = %existing.target, "Target element missing; re-inserting");
                        repo.insert_element(model_target, None, &target)?
                    };
                    SyncInfo::new(tx).update_element(existing.row, model_id, source_id, target_id, &stored)?;
                    ctx.record_event(EntityKind::Element, target_id, event);
                    Ok(target_id)
                })?
            }
            _ => {
                let identity = search.identity;
                self.store.mutate("insert_element", &self.run_id, |tx, ctx| {
                    let target_id = TargetRepo::new(tx).insert_element(model_target, None, &target)?;
                    let sync = SyncInfo::new(tx);
                    sync.insert_element(model_id, &identity, source_id, target_id, &stored)?;
                    sync.remove_discard(model_id, &identity)?;
                    ctx.record_event(EntityKind::Element, target_id, EventType::Inserted);
                    Ok(target_id)
                })?
            }
        };

        self.detector.mark_seen(SeenKey::Element(target_id));
        self.stats.record(search.change_type);
        Ok(())
    }

    /// Record that an element does not convert, removing any earlier
    /// conversion of it.
    fn discard_element(
        &mut self,
        element: &SourceElement,
        model_id: ModelSyncId,
        identity: &SourceIdentity,
        existing: Option<&ElementEntry>,
    ) -> Result<()> {
        if existing.is_none() {
            if let Some(row) = SyncInfo::new(self.store.conn()).find_discard(model_id, identity)? {
                self.detector.mark_seen(SeenKey::Discard(row));
                self.stats.record(ChangeType::None);
                return Ok(());
            }
        }

        let row = self.store.mutate("discard_element", &self.run_id, |tx, ctx| {
            let sync = SyncInfo::new(tx);
            if let Some(entry) = existing {
                TargetRepo::new(tx).delete_element(entry.target)?;
                sync.remove_element(entry.row)?;
            }
            let row = sync.insert_discard(model_id, identity)?;
            ctx.record_detail(
                EntityKind::Element,
                existing.map(|e| e.target),
                EventType::Discarded,
                format!("source id {}", element.id),
            );
            Ok(row)
        })?;
        self.detector.mark_seen(SeenKey::Discard(row));
        debug!(element = %element.id, model = %model_id, "Element discarded");
        self.stats.discarded += 1;
        Ok(())
    }

    // ==================
    // Views
    // ==================

    fn convert_view(&mut self, file_id: FileSyncId, view: &SourceView) -> Result<()> {
        let search = self
            .detector
            .is_view_changed(&SyncInfo::new(self.store.conn()), file_id, view)?;
        self.stats.views += 1;
        self.stats.record(search.change_type);

        let target_id = match (search.change_type, search.existing) {
            (ChangeType::None, Some(existing)) => existing.target,
            (ChangeType::Update, Some(existing)) => {
                let target = self.transcoder.transcode_view(view)?;
                let provenance = search.current;
                self.store.mutate("update_view", &self.run_id, |tx, ctx| {
                    let repo = TargetRepo::new(tx);
                    let target_id = if repo.update_view(existing.target, &target)? {
                        existing.target
                    } else {
                        warn!(view = %view.id, target = %existing.target, "Target view missing; re-inserting");
                        repo.insert_view(&target)?
                    };
                    SyncInfo::new(tx).update_view(existing.row, &view.name, target_id, &provenance)?;
                    ctx.record_event(EntityKind::View, target_id, EventType::Updated);
                    Ok(target_id)
                })?
            }
            _ => {
                let target = self.transcoder.transcode_view(view)?;
                let provenance = search.current;
                self.store.mutate("insert_view", &self.run_id, |tx, ctx| {
                    let target_id = TargetRepo::new(tx).insert_view(&target)?;
                    SyncInfo::new(tx).insert_view(file_id, view.id, &view.name, target_id, &provenance)?;
                    ctx.record_event(EntityKind::View, target_id, EventType::Inserted);
                    Ok(target_id)
                })?
            }
        };

        self.detector.mark_seen(SeenKey::View(target_id));
        Ok(())
    }

    // ==================
    // Deletions
    // ==================

    fn apply_deletions(&mut self, file_id: FileSyncId) -> Result<()> {
        let deletions = self
            .detector
            .detect_deleted(&SyncInfo::new(self.store.conn()), file_id)?;
        if deletions.is_empty() {
            return Ok(());
        }
        info!(
            file = %file_id,
            elements = deletions.elements.len(),
            models = deletions.models.len(),
            views = deletions.views.len(),
            discards = deletions.discards.len(),
            "Applying inferred deletions"
        );

        for entry in deletions.elements {
            self.check_cancelled()?;
            self.store.mutate("delete_element", &self.run_id, |tx, ctx| {
                if TargetRepo::new(tx).delete_element(entry.target)? == 0 {
                    debug!(target = %entry.target, "Target element already gone");
                }
                SyncInfo::new(tx).remove_element(entry.row)?;
                ctx.record_event(EntityKind::Element, entry.target, EventType::Deleted);
                Ok(())
            })?;
            self.stats.record(ChangeType::Delete);
        }

        for discard in deletions.discards {
            self.check_cancelled()?;
            self.store.mutate("delete_discard", &self.run_id, |tx, ctx| {
                SyncInfo::new(tx).remove_discard_row(discard.row)?;
                ctx.record_detail(
                    EntityKind::Element,
                    None,
                    EventType::Deleted,
                    format!("discard {} {}", discard.identity_kind, discard.identity_key),
                );
                Ok(())
            })?;
        }

        for entry in deletions.models {
            self.check_cancelled()?;
            self.store.mutate("delete_model", &self.run_id, |tx, ctx| {
                TargetRepo::new(tx).delete_model(entry.target)?;
                SyncInfo::new(tx).remove_model(entry.id)?;
                ctx.record_event(EntityKind::Model, entry.target, EventType::Deleted);
                Ok(())
            })?;
            self.stats.record(ChangeType::Delete);
        }

        for entry in deletions.views {
            self.check_cancelled()?;
            self.store.mutate("delete_view", &self.run_id, |tx, ctx| {
                TargetRepo::new(tx).delete_view(entry.target)?;
                SyncInfo::new(tx).remove_view(entry.row)?;
                ctx.record_event(EntityKind::View, entry.target, EventType::Deleted);
                Ok(())
            })?;
            self.stats.record(ChangeType::Delete);
        }
        Ok(())
    }

    /// Remove every record of stored files this run did not encounter.
    fn delete_missing_files(&mut self) -> Result<()> {
        let missing = self
            .detector
            .detect_deleted_files(&SyncInfo::new(self.store.conn()))?;

        for entry in missing {
            self.check_cancelled()?;
            let (models, views, elements) = {
                let sync = SyncInfo::new(self.store.conn());
                (
                    sync.models_in_file(entry.id)?,
                    sync.views_in_file(entry.id)?,
                    sync.iterate_elements(ElementScope::File(entry.id))?.len(),
                )
            };
            info!(
                file = %entry.provenance.unique_name,
                models = models.len(),
                elements,
                views = views.len(),
                "Source file no longer present; removing its records"
            );

            self.store.mutate("delete_file", &self.run_id, |tx, ctx| {
                let repo = TargetRepo::new(tx);
                for model in &models {
                    repo.delete_model(model.target)?;
                    ctx.record_event(EntityKind::Model, model.target, EventType::Deleted);
                }
                for view in &views {
                    repo.delete_view(view.target)?;
                    ctx.record_event(EntityKind::View, view.target, EventType::Deleted);
                }
                // Cascades to every SyncInfo entry scoped under the file.
                SyncInfo::new(tx).remove_file(entry.id)?;
                ctx.record_detail(
                    EntityKind::File,
                    None,
                    EventType::Deleted,
                    entry.provenance.unique_name.clone(),
                );
                Ok(())
            })?;
            self.stats.deleted += models.len() + views.len() + elements;
        }
        Ok(())
    }
}
