//! Source document model.
//!
//! Source documents are loaded once per job into a [`SourceArena`], which
//! owns every file, model, element and view for the duration of the run.
//! The rest of the engine refers to them through [`FileHandle`] and
//! [`ModelHandle`] indices.
//!
//! Design files arrive as JSON snapshots (see [`snapshot`]); the binary DGN
//! reader is an external collaborator.

mod arena;
mod element;
pub mod snapshot;

pub use arena::{
    unique_file_name, FileHandle, ModelHandle, ResourceInfo, SourceArena, SourceFile, SourceModel,
    SourceView,
};
pub use element::{
    ElementHeader, ExtensionBlock, GraphicsHeader, SourceElement, Symbology, FLAG_3D,
    FLAG_ATTACHMENT, FLAG_GRAPHIC,
};

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier assigned by the source format.
///
/// Only meaningful within its enclosing file (or model, for elements).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StableId(pub u64);

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for StableId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = i64::try_from(self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(value))
    }
}

impl FromSql for StableId {
    #[allow(clippy::cast_sign_loss)]
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(|v| Self(v as u64))
    }
}

/// Kind of a source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Spatial,
    Drawing,
    Sheet,
    Dictionary,
}

impl ModelKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spatial => "spatial",
            Self::Drawing => "drawing",
            Self::Sheet => "sheet",
            Self::Dictionary => "dictionary",
        }
    }
}

/// What an element is, established once when its file is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// 3D graphics in a spatial model.
    Spatial,
    /// 2D graphics in a drawing model.
    Drawing,
    /// Graphics placed on a sheet.
    Sheet,
    /// Reference to another design file.
    Attachment,
    /// Non-graphic data.
    #[default]
    Control,
}

impl RecordKind {
    /// Classify from the owning model and the element's header flags.
    #[must_use]
    pub const fn classify(model: ModelKind, header: &ElementHeader) -> Self {
        if header.is_attachment() {
            return Self::Attachment;
        }
        if !header.is_graphic() {
            return Self::Control;
        }
        match model {
            ModelKind::Sheet => Self::Sheet,
            ModelKind::Drawing => Self::Drawing,
            ModelKind::Spatial | ModelKind::Dictionary => {
                if header.is_3d() {
                    Self::Spatial
                } else {
                    Self::Drawing
                }
            }
        }
    }
}

/// Row-major 3x4 affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform(pub [f64; 12]);

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    ]);

    /// Bitwise equality, so `-0.0` and `0.0` differ and `NaN` equals itself.
    #[must_use]
    pub fn same_bits(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_from_flags() {
        let graphic_3d = ElementHeader {
            flags: FLAG_GRAPHIC | FLAG_3D,
            ..ElementHeader::default()
        };
        let graphic_2d = ElementHeader {
            flags: FLAG_GRAPHIC,
            ..ElementHeader::default()
        };
        let control = ElementHeader::default();
        let attachment = ElementHeader {
            flags: FLAG_ATTACHMENT | FLAG_GRAPHIC,
            ..ElementHeader::default()
        };

        assert_eq!(RecordKind::classify(ModelKind::Spatial, &graphic_3d), RecordKind::Spatial);
        assert_eq!(RecordKind::classify(ModelKind::Spatial, &graphic_2d), RecordKind::Drawing);
        assert_eq!(RecordKind::classify(ModelKind::Sheet, &graphic_3d), RecordKind::Sheet);
        assert_eq!(RecordKind::classify(ModelKind::Drawing, &control), RecordKind::Control);
        assert_eq!(RecordKind::classify(ModelKind::Drawing, &attachment), RecordKind::Attachment);
    }

    #[test]
    fn test_transform_bitwise_compare() {
        let mut moved = Transform::IDENTITY;
        moved.0[3] = 100.0;
        assert!(Transform::IDENTITY.same_bits(&Transform::default()));
        assert!(!Transform::IDENTITY.same_bits(&moved));
    }

    #[test]
    fn test_stable_id_sql_roundtrip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let id: StableId = conn
            .query_row("SELECT ?1", [StableId(42)], |row| row.get(0))
            .unwrap();
        assert_eq!(id, StableId(42));
    }
}
