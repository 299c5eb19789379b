//! Job-scoped ownership of loaded source documents.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{ModelKind, RecordKind, SourceElement, StableId, Transform};
use crate::provenance::{DiskFileInfo, IdPolicy};

/// An external resource (referenced file or URI) as it currently exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    #[serde(default)]
    pub last_modified: f64,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// A named, saved view definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceView {
    pub id: StableId,
    pub name: String,
    #[serde(default)]
    pub last_modified: f64,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// A model: a container of elements within one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceModel {
    pub id: StableId,
    pub name: String,
    #[serde(default)]
    pub kind: ModelKind,
    #[serde(default)]
    pub transform: Transform,
    /// Time of the last change to any element in the model, when the
    /// source tracks it. Absent means the contents cannot be proven
    /// unchanged without visiting them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents_last_modified: Option<f64>,
    #[serde(default)]
    pub elements: Vec<SourceElement>,
}

impl SourceModel {
    #[must_use]
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id: StableId(id),
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// One design file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Display name of the file as the source knows it.
    pub name: String,
    /// Save time recorded inside the file; `0.0` when the file has none.
    #[serde(default)]
    pub last_save_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_policy: Option<IdPolicy>,
    #[serde(default)]
    pub models: Vec<SourceModel>,
    #[serde(default)]
    pub views: Vec<SourceView>,
    #[serde(default)]
    pub resources: Vec<ResourceInfo>,

    #[serde(skip)]
    pub path: PathBuf,
    #[serde(skip)]
    pub unique_name: String,
    #[serde(skip)]
    pub disk: DiskFileInfo,
}

impl SourceFile {
    /// Create an empty file rooted at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        let mut file = Self {
            name,
            path,
            ..Self::default()
        };
        file.unique_name = unique_file_name(&file.path);
        file
    }

    /// Stamp every element with its [`RecordKind`].
    pub fn classify_records(&mut self) {
        fn stamp(model: ModelKind, element: &mut SourceElement) {
            element.kind = RecordKind::classify(model, &element.header);
            for child in &mut element.children {
                stamp(model, child);
            }
        }

        for model in &mut self.models {
            let kind = model.kind;
            for element in &mut model.elements {
                stamp(kind, element);
            }
        }
    }
}

/// Derive the name a file is tracked under.
///
/// The same file reached through different spellings of its path (case,
/// separators) maps to a single name.
#[must_use]
pub fn unique_file_name(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

/// Index of a file within a [`SourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

/// Index of a model within a [`SourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle {
    pub file: FileHandle,
    index: usize,
}

/// Owns every source document loaded for one job.
#[derive(Debug, Default)]
pub struct SourceArena {
    files: Vec<SourceFile>,
}

impl SourceArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a file and classify its records.
    pub fn add_file(&mut self, mut file: SourceFile) -> FileHandle {
        if file.unique_name.is_empty() {
            file.unique_name = unique_file_name(&file.path);
        }
        file.classify_records();
        self.files.push(file);
        FileHandle(self.files.len() - 1)
    }

    #[must_use]
    pub fn file(&self, handle: FileHandle) -> &SourceFile {
        &self.files[handle.0]
    }

    #[must_use]
    pub fn model(&self, handle: ModelHandle) -> &SourceModel {
        &self.files[handle.file.0].models[handle.index]
    }

    /// Handles to all files in load order.
    pub fn files(&self) -> impl Iterator<Item = FileHandle> + '_ {
        (0..self.files.len()).map(FileHandle)
    }

    /// Handles to the models of one file, in source order.
    pub fn models(&self, file: FileHandle) -> impl Iterator<Item = ModelHandle> + '_ {
        (0..self.files[file.0].models.len()).map(move |index| ModelHandle { file, index })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FLAG_3D, FLAG_GRAPHIC};

    #[test]
    fn test_unique_name_normalizes_spelling() {
        assert_eq!(
            unique_file_name(std::path::Path::new("C:\\Work\\Site.DGN")),
            unique_file_name(std::path::Path::new("c:/work/site.dgn"))
        );
    }

    #[test]
    fn test_arena_hands_out_stable_handles() {
        let mut arena = SourceArena::new();
        let mut file = SourceFile::new("/tmp/a.dgn");
        let mut model = SourceModel::new(0, "Default");
        model.elements.push(SourceElement::new(1, b"x".to_vec()));
        file.models.push(model);
        let handle = arena.add_file(file);

        let models: Vec<_> = arena.models(handle).collect();
        assert_eq!(models.len(), 1);
        assert_eq!(arena.model(models[0]).name, "Default");
        assert_eq!(arena.file(handle).unique_name, "/tmp/a.dgn");
    }

    #[test]
    fn test_add_file_classifies_children() {
        let mut arena = SourceArena::new();
        let mut file = SourceFile::new("/tmp/b.dgn");
        let mut model = SourceModel::new(0, "Sheet 1");
        model.kind = ModelKind::Sheet;
        let mut child = SourceElement::new(2, b"c".to_vec());
        child.header.flags = FLAG_GRAPHIC | FLAG_3D;
        model
            .elements
            .push(SourceElement::new(1, b"p".to_vec()).with_child(child));
        file.models.push(model);
        let handle = arena.add_file(file);

        let element = &arena.file(handle).models[0].elements[0];
        assert_eq!(element.kind, RecordKind::Sheet);
        assert_eq!(element.children[0].kind, RecordKind::Sheet);
    }
}
