//! The SyncInfo store: durable mapping from source identity to target
//! identity.
//!
//! Entries are scoped: models and views by file, elements by model. Lookup
//! misses are `Ok(None)`, never errors. Any `Err` is a store failure and is
//! fatal to the run.

use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::Serialize;

use super::ids::{FileSyncId, ModelSyncId, TargetId};
use crate::hash::ContentHash;
use crate::model::{ResourceInfo, StableId};
use crate::provenance::{
    DiskFileInfo, FileProvenance, IdPolicy, ModelProvenance, StoredProvenance,
};

/// How an element entry is keyed within its model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceIdentity {
    StableId(StableId),
    ContentHash(ContentHash),
    Freeform(String),
}

impl SourceIdentity {
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::StableId(_) => "stable_id",
            Self::ContentHash(_) => "content_hash",
            Self::Freeform(_) => "freeform",
        }
    }

    /// Text form of the identity value, unique within its kind.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::StableId(id) => id.0.to_string(),
            Self::ContentHash(hash) => hash.to_hex(),
            Self::Freeform(name) => name.clone(),
        }
    }
}

/// A synchronized file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub id: FileSyncId,
    pub provenance: FileProvenance,
}

/// A synchronized model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEntry {
    pub id: ModelSyncId,
    pub file: FileSyncId,
    pub source_id: StableId,
    pub name: String,
    pub target: TargetId,
    pub provenance: ModelProvenance,
}

/// A synchronized element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementEntry {
    /// Row id; increases with insertion order.
    pub row: i64,
    pub model: ModelSyncId,
    pub identity: SourceIdentity,
    /// The source id at the time of the last sync, kept for every identity
    /// kind so callers can disambiguate repeated content.
    pub source_id: Option<StableId>,
    pub target: TargetId,
    pub provenance: StoredProvenance,
}

/// A synchronized view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewEntry {
    pub row: i64,
    pub file: FileSyncId,
    pub source_id: StableId,
    pub name: String,
    pub target: TargetId,
    pub provenance: StoredProvenance,
}

/// An element deliberately not converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscardEntry {
    pub row: i64,
    pub model: ModelSyncId,
    pub identity_kind: String,
    pub identity_key: String,
}

/// Enclosing scope for element iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementScope {
    Model(ModelSyncId),
    File(FileSyncId),
}

/// Caller-supplied predicate that narrows a content-hash lookup.
pub type ElementFilter<'f> = &'f dyn Fn(&ElementEntry) -> bool;

const FILE_COLUMNS: &str =
    "id, unique_name, source_name, last_save_time, last_modified, file_size, id_policy";
const MODEL_COLUMNS: &str =
    "id, file_id, source_id, source_name, target_id, hash, contents_last_modified";
const ELEMENT_COLUMNS: &str =
    "e.id, e.model_id, e.identity_kind, e.source_id, e.freeform_id, e.target_id, e.last_modified, e.hash";
const VIEW_COLUMNS: &str = "id, file_id, source_id, name, target_id, last_modified, hash";

fn map_file(row: &Row<'_>) -> Result<FileEntry> {
    let policy: String = row.get(6)?;
    let size: i64 = row.get(5)?;
    Ok(FileEntry {
        id: row.get(0)?,
        provenance: FileProvenance {
            unique_name: row.get(1)?,
            source_name: row.get(2)?,
            last_save_time: row.get(3)?,
            disk: DiskFileInfo {
                last_modified: row.get(4)?,
                size: u64::try_from(size).unwrap_or(0),
            },
            id_policy: IdPolicy::parse(&policy),
        },
    })
}

fn map_model(row: &Row<'_>) -> Result<ModelEntry> {
    Ok(ModelEntry {
        id: row.get(0)?,
        file: row.get(1)?,
        source_id: row.get(2)?,
        name: row.get(3)?,
        target: row.get(4)?,
        provenance: ModelProvenance {
            hash: row.get(5)?,
            contents_last_modified: row.get(6)?,
        },
    })
}

fn map_element(row: &Row<'_>) -> Result<ElementEntry> {
    let kind: String = row.get(2)?;
    let source_id: Option<StableId> = row.get(3)?;
    let freeform: Option<String> = row.get(4)?;
    let hash: ContentHash = row.get(7)?;
    let identity = match kind.as_str() {
        "content_hash" => SourceIdentity::ContentHash(hash),
        "freeform" => SourceIdentity::Freeform(freeform.unwrap_or_default()),
        _ => SourceIdentity::StableId(source_id.unwrap_or_default()),
    };
    Ok(ElementEntry {
        row: row.get(0)?,
        model: row.get(1)?,
        identity,
        source_id,
        target: row.get(5)?,
        provenance: StoredProvenance {
            last_modified: row.get(6)?,
            hash,
        },
    })
}

fn map_view(row: &Row<'_>) -> Result<ViewEntry> {
    Ok(ViewEntry {
        row: row.get(0)?,
        file: row.get(1)?,
        source_id: row.get(2)?,
        name: row.get(3)?,
        target: row.get(4)?,
        provenance: StoredProvenance {
            last_modified: row.get(5)?,
            hash: row.get(6)?,
        },
    })
}

fn size_to_sql(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

/// Read/write access to the SyncInfo tables.
///
/// Borrow it from a plain connection for lookups, or from a transaction
/// inside [`SyncStore::mutate`](super::SyncStore::mutate) for writes.
pub struct SyncInfo<'c> {
    conn: &'c Connection,
}

impl<'c> SyncInfo<'c> {
    #[must_use]
    pub const fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ==================
    // Files
    // ==================

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_file_by_name(&self, unique_name: &str) -> Result<Option<FileEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM sync_files WHERE unique_name = ?1"),
                [unique_name],
                map_file,
            )
            .optional()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_file(&self, id: FileSyncId) -> Result<Option<FileEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM sync_files WHERE id = ?1"),
                [id],
                map_file,
            )
            .optional()
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails (including a duplicate name).
    pub fn insert_file(&self, provenance: &FileProvenance) -> Result<FileSyncId> {
        self.conn.execute(
            "INSERT INTO sync_files (unique_name, source_name, last_save_time, last_modified, file_size, id_policy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                provenance.unique_name,
                provenance.source_name,
                provenance.last_save_time,
                provenance.disk.last_modified,
                size_to_sql(provenance.disk.size),
                provenance.id_policy.as_str(),
            ],
        )?;
        Ok(FileSyncId(self.conn.last_insert_rowid()))
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_file(&self, id: FileSyncId, provenance: &FileProvenance) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_files
             SET source_name = ?2, last_save_time = ?3, last_modified = ?4, file_size = ?5, id_policy = ?6
             WHERE id = ?1",
            params![
                id,
                provenance.source_name,
                provenance.last_save_time,
                provenance.disk.last_modified,
                size_to_sql(provenance.disk.size),
                provenance.id_policy.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Remove a file entry and, by cascade, every entry scoped under it.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_file(&self, id: FileSyncId) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_files WHERE id = ?1", [id])?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn files(&self) -> Result<Vec<FileEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FILE_COLUMNS} FROM sync_files ORDER BY id"))?;
        let rows = stmt.query_map([], map_file)?;
        rows.collect()
    }

    // ==================
    // Models
    // ==================

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_model(&self, file: FileSyncId, source_id: StableId) -> Result<Option<ModelEntry>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {MODEL_COLUMNS} FROM sync_models WHERE file_id = ?1 AND source_id = ?2"
                ),
                params![file, source_id],
                map_model,
            )
            .optional()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_model_by_id(&self, id: ModelSyncId) -> Result<Option<ModelEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {MODEL_COLUMNS} FROM sync_models WHERE id = ?1"),
                [id],
                map_model,
            )
            .optional()
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_model(
        &self,
        file: FileSyncId,
        source_id: StableId,
        name: &str,
        target: TargetId,
        provenance: &ModelProvenance,
    ) -> Result<ModelSyncId> {
        self.conn.execute(
            "INSERT INTO sync_models (file_id, source_id, source_name, target_id, hash, contents_last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file,
                source_id,
                name,
                target,
                provenance.hash,
                provenance.contents_last_modified,
            ],
        )?;
        Ok(ModelSyncId(self.conn.last_insert_rowid()))
    }

    /// Overwrite a model's name and hash. The contents timestamp is left
    /// alone; see [`Self::set_model_contents_last_modified`].
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_model(
        &self,
        id: ModelSyncId,
        name: &str,
        target: TargetId,
        provenance: &ModelProvenance,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_models SET source_name = ?2, target_id = ?3, hash = ?4 WHERE id = ?1",
            params![id, name, target, provenance.hash],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_model_contents_last_modified(
        &self,
        id: ModelSyncId,
        contents_last_modified: Option<f64>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_models SET contents_last_modified = ?2 WHERE id = ?1",
            params![id, contents_last_modified],
        )?;
        Ok(())
    }

    /// Remove a model entry and, by cascade, its element and discard entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_model(&self, id: ModelSyncId) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_models WHERE id = ?1", [id])?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn models_in_file(&self, file: FileSyncId) -> Result<Vec<ModelEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MODEL_COLUMNS} FROM sync_models WHERE file_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([file], map_model)?;
        rows.collect()
    }

    // ==================
    // Elements
    // ==================

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_element_by_stable_id(
        &self,
        model: ModelSyncId,
        source_id: StableId,
    ) -> Result<Option<ElementEntry>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ELEMENT_COLUMNS} FROM sync_elements e
                     WHERE e.model_id = ?1 AND e.identity_kind = 'stable_id' AND e.source_id = ?2"
                ),
                params![model, source_id],
                map_element,
            )
            .optional()
    }

    /// Find a stable-id entry anywhere in a file, for elements that moved
    /// between models.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_element_in_file_by_stable_id(
        &self,
        file: FileSyncId,
        source_id: StableId,
    ) -> Result<Option<ElementEntry>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ELEMENT_COLUMNS} FROM sync_elements e
                     JOIN sync_models m ON m.id = e.model_id
                     WHERE m.file_id = ?1 AND e.identity_kind = 'stable_id' AND e.source_id = ?2
                     ORDER BY e.id LIMIT 1"
                ),
                params![file, source_id],
                map_element,
            )
            .optional()
    }

    /// All content-hash entries in a model with the given hash, oldest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_elements_by_content_hash(
        &self,
        model: ModelSyncId,
        hash: &ContentHash,
    ) -> Result<Vec<ElementEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ELEMENT_COLUMNS} FROM sync_elements e
             WHERE e.model_id = ?1 AND e.identity_kind = 'content_hash' AND e.hash = ?2
             ORDER BY e.id"
        ))?;
        let rows = stmt.query_map(params![model, hash], map_element)?;
        rows.collect()
    }

    /// First content-hash entry in a model that passes `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_element_by_content_hash(
        &self,
        model: ModelSyncId,
        hash: &ContentHash,
        filter: Option<ElementFilter<'_>>,
    ) -> Result<Option<ElementEntry>> {
        Ok(self
            .find_elements_by_content_hash(model, hash)?
            .into_iter()
            .find(|e| filter.is_none_or(|f| f(e))))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_element_by_freeform(
        &self,
        model: ModelSyncId,
        identifier: &str,
    ) -> Result<Option<ElementEntry>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ELEMENT_COLUMNS} FROM sync_elements e
                     WHERE e.model_id = ?1 AND e.identity_kind = 'freeform' AND e.freeform_id = ?2"
                ),
                params![model, identifier],
                map_element,
            )
            .optional()
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_element(
        &self,
        model: ModelSyncId,
        identity: &SourceIdentity,
        source_id: Option<StableId>,
        target: TargetId,
        provenance: &StoredProvenance,
    ) -> Result<i64> {
        let freeform = match identity {
            SourceIdentity::Freeform(s) => Some(s.as_str()),
            _ => None,
        };
        self.conn.execute(
            "INSERT INTO sync_elements (model_id, identity_kind, source_id, freeform_id, target_id, last_modified, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                model,
                identity.kind_str(),
                source_id,
                freeform,
                target,
                provenance.last_modified,
                provenance.hash,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Overwrite an entry's provenance, correcting its scope and target.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_element(
        &self,
        row: i64,
        model: ModelSyncId,
        source_id: Option<StableId>,
        target: TargetId,
        provenance: &StoredProvenance,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_elements
             SET model_id = ?2, source_id = ?3, target_id = ?4, last_modified = ?5, hash = ?6
             WHERE id = ?1",
            params![
                row,
                model,
                source_id,
                target,
                provenance.last_modified,
                provenance.hash,
            ],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_element(&self, row: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_elements WHERE id = ?1", [row])?;
        Ok(())
    }

    /// Every element entry under a scope, in insertion order.
    ///
    /// The result is a snapshot; callers may mutate the store while walking
    /// it and call again to restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn iterate_elements(&self, scope: ElementScope) -> Result<Vec<ElementEntry>> {
        let (sql, id) = match scope {
            ElementScope::Model(model) => (
                format!(
                    "SELECT {ELEMENT_COLUMNS} FROM sync_elements e WHERE e.model_id = ?1 ORDER BY e.id"
                ),
                model.0,
            ),
            ElementScope::File(file) => (
                format!(
                    "SELECT {ELEMENT_COLUMNS} FROM sync_elements e
                     JOIN sync_models m ON m.id = e.model_id
                     WHERE m.file_id = ?1 ORDER BY e.id"
                ),
                file.0,
            ),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([id], map_element)?;
        rows.collect()
    }

    // ==================
    // Views
    // ==================

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_view(&self, file: FileSyncId, source_id: StableId) -> Result<Option<ViewEntry>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {VIEW_COLUMNS} FROM sync_views WHERE file_id = ?1 AND source_id = ?2"
                ),
                params![file, source_id],
                map_view,
            )
            .optional()
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_view(
        &self,
        file: FileSyncId,
        source_id: StableId,
        name: &str,
        target: TargetId,
        provenance: &StoredProvenance,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sync_views (file_id, source_id, name, target_id, last_modified, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file,
                source_id,
                name,
                target,
                provenance.last_modified,
                provenance.hash,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_view(
        &self,
        row: i64,
        name: &str,
        target: TargetId,
        provenance: &StoredProvenance,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_views SET name = ?2, target_id = ?3, last_modified = ?4, hash = ?5 WHERE id = ?1",
            params![row, name, target, provenance.last_modified, provenance.hash],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_view(&self, row: i64) -> Result<()> {
        self.conn.execute("DELETE FROM sync_views WHERE id = ?1", [row])?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn views_in_file(&self, file: FileSyncId) -> Result<Vec<ViewEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VIEW_COLUMNS} FROM sync_views WHERE file_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([file], map_view)?;
        rows.collect()
    }

    // ==================
    // Discards
    // ==================

    /// Record that an element was deliberately not converted. Idempotent;
    /// returns the row of the (possibly pre-existing) discard entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_discard(&self, model: ModelSyncId, identity: &SourceIdentity) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sync_discards (model_id, identity_kind, identity_key)
             VALUES (?1, ?2, ?3)",
            params![model, identity.kind_str(), identity.key()],
        )?;
        self.conn.query_row(
            "SELECT id FROM sync_discards
             WHERE model_id = ?1 AND identity_kind = ?2 AND identity_key = ?3",
            params![model, identity.kind_str(), identity.key()],
            |row| row.get(0),
        )
    }

    /// Returns whether a discard entry existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_discard(&self, model: ModelSyncId, identity: &SourceIdentity) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM sync_discards
             WHERE model_id = ?1 AND identity_kind = ?2 AND identity_key = ?3",
            params![model, identity.kind_str(), identity.key()],
        )?;
        Ok(removed > 0)
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_discard_row(&self, row: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_discards WHERE id = ?1", [row])?;
        Ok(())
    }

    /// Row of the discard entry for this identity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_discard(&self, model: ModelSyncId, identity: &SourceIdentity) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM sync_discards
                 WHERE model_id = ?1 AND identity_kind = ?2 AND identity_key = ?3",
                params![model, identity.kind_str(), identity.key()],
                |row| row.get(0),
            )
            .optional()
    }

    /// Discard entries of every model in the file, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn discards_in_file(&self, file: FileSyncId) -> Result<Vec<DiscardEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.model_id, d.identity_kind, d.identity_key
             FROM sync_discards d JOIN sync_models m ON m.id = d.model_id
             WHERE m.file_id = ?1 ORDER BY d.id",
        )?;
        let rows = stmt.query_map([file], |row| {
            Ok(DiscardEntry {
                row: row.get(0)?,
                model: row.get(1)?,
                identity_kind: row.get(2)?,
                identity_key: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    // ==================
    // External resources
    // ==================

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_resource(&self, file: FileSyncId, uri: &str) -> Result<Option<ResourceInfo>> {
        self.conn
            .query_row(
                "SELECT uri, last_modified, size, etag FROM sync_resources
                 WHERE file_id = ?1 AND uri = ?2",
                params![file, uri],
                |row| {
                    let size: i64 = row.get(2)?;
                    Ok(ResourceInfo {
                        uri: row.get(0)?,
                        last_modified: row.get(1)?,
                        size: u64::try_from(size).unwrap_or(0),
                        etag: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn upsert_resource(&self, file: FileSyncId, resource: &ResourceInfo) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_resources (file_id, uri, last_modified, size, etag)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(file_id, uri) DO UPDATE SET
                last_modified = excluded.last_modified,
                size = excluded.size,
                etag = excluded.etag",
            params![
                file,
                resource.uri,
                resource.last_modified,
                size_to_sql(resource.size),
                resource.etag,
            ],
        )?;
        Ok(())
    }

    /// URIs recorded for the file, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn resources_in_file(&self, file: FileSyncId) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uri FROM sync_resources WHERE file_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map([file], |row| row.get(0))?;
        rows.collect()
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_resource(&self, file: FileSyncId, uri: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sync_resources WHERE file_id = ?1 AND uri = ?2",
            params![file, uri],
        )?;
        Ok(())
    }

    // ==================
    // Meta
    // ==================

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM sync_meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
    }

    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }
}
