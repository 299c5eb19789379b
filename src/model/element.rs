//! Source element records.

use serde::{Deserialize, Serialize};

use super::{RecordKind, StableId};
use crate::provenance::IdPolicy;

/// Header flag: the element carries graphics.
pub const FLAG_GRAPHIC: u32 = 0x0001;
/// Header flag: the element is three-dimensional.
pub const FLAG_3D: u32 = 0x0002;
/// Header flag: the element is a reference attachment.
pub const FLAG_ATTACHMENT: u32 = 0x0004;

/// Fixed element header.
///
/// `last_modified` and `reserved` are volatile: they change without the
/// element's content changing and are zeroed before hashing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementHeader {
    pub element_type: u16,
    pub level: u32,
    pub flags: u32,
    pub last_modified: f64,
    pub reserved: u32,
}

impl ElementHeader {
    #[must_use]
    pub const fn is_graphic(&self) -> bool {
        self.flags & FLAG_GRAPHIC != 0
    }

    #[must_use]
    pub const fn is_3d(&self) -> bool {
        self.flags & FLAG_3D != 0
    }

    #[must_use]
    pub const fn is_attachment(&self) -> bool {
        self.flags & FLAG_ATTACHMENT != 0
    }
}

/// Display symbology of a graphic element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Symbology {
    pub color: u32,
    pub weight: u32,
    pub style: i32,
}

/// Graphics-only sub-header.
///
/// `graphic_group` is a renderer grouping index and `padding` is unused
/// space; both are zeroed before hashing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsHeader {
    pub graphic_group: u32,
    pub class: u16,
    pub properties: u32,
    pub padding: u32,
    pub symbology: Symbology,
    /// Low and high corners; 2D elements only use the first four values.
    pub range: [f64; 6],
}

/// Free-form data block attached to an element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionBlock {
    pub kind: u32,
    pub instance: u32,
    #[serde(default)]
    pub data: Vec<u8>,
}

/// One element as it exists in the current generation of its file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceElement {
    /// Numeric id assigned by the source format.
    pub id: StableId,
    #[serde(flatten)]
    pub header: ElementHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphics: Option<GraphicsHeader>,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<ExtensionBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SourceElement>,
    /// URIs of external resources this element's content depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_resources: Vec<String>,
    /// Externally meaningful identifier for records without a stable id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_id: Option<String>,
    /// Per-record override of the file's identity policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_policy: Option<IdPolicy>,
    #[serde(skip)]
    pub kind: RecordKind,
}

impl SourceElement {
    /// Create a graphic 3D element with the given payload.
    #[must_use]
    pub fn new(id: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: StableId(id),
            header: ElementHeader {
                element_type: 3,
                flags: FLAG_GRAPHIC | FLAG_3D,
                ..ElementHeader::default()
            },
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Builder-style timestamp setter.
    #[must_use]
    pub fn with_last_modified(mut self, last_modified: f64) -> Self {
        self.header.last_modified = last_modified;
        self
    }

    /// Builder-style child setter.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Latest timestamp across this element and its children.
    #[must_use]
    pub fn latest_modification(&self) -> f64 {
        self.children
            .iter()
            .map(Self::latest_modification)
            .fold(self.header.last_modified, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_flags_are_flattened_in_json() {
        let json = r#"{"id": 42, "element_type": 4, "flags": 1, "last_modified": 9.5, "payload": [1, 2]}"#;
        let element: SourceElement = serde_json::from_str(json).unwrap();

        assert_eq!(element.id, StableId(42));
        assert_eq!(element.header.element_type, 4);
        assert!(element.header.is_graphic());
        assert!(!element.header.is_3d());
        assert!((element.header.last_modified - 9.5).abs() < f64::EPSILON);
        assert_eq!(element.payload, vec![1, 2]);
    }

    #[test]
    fn test_latest_modification_includes_children() {
        let element = SourceElement::new(1, b"a".to_vec())
            .with_last_modified(10.0)
            .with_child(SourceElement::new(2, b"b".to_vec()).with_last_modified(30.0));
        assert!((element.latest_modification() - 30.0).abs() < f64::EPSILON);
    }
}
