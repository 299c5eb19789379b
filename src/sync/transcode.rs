//! Conversion of source records into target records.
//!
//! The engine only needs to know whether a record converts and what it
//! converts to. Geometry, styles and levels are the transcoder's business.

use serde_json::json;

use crate::model::{RecordKind, SourceElement, SourceFile, SourceModel, SourceView};
use crate::storage::{TargetElement, TargetModel, TargetView};

/// Outcome of transcoding one element.
#[derive(Debug, Clone, PartialEq)]
pub enum Transcoded {
    Element(TargetElement),
    /// Deliberately not converted; remembered so it is not retried as new.
    Discard,
}

/// Converts source records into target records.
pub trait Transcoder {
    /// # Errors
    ///
    /// Returns an error if the model cannot be converted.
    fn transcode_model(&self, file: &SourceFile, model: &SourceModel) -> crate::Result<TargetModel>;

    /// # Errors
    ///
    /// Returns an error if the element cannot be converted. Returning
    /// `Ok(Transcoded::Discard)` is not an error.
    fn transcode_element(
        &self,
        model: &SourceModel,
        element: &SourceElement,
    ) -> crate::Result<Transcoded>;

    /// # Errors
    ///
    /// Returns an error if the view cannot be converted.
    fn transcode_view(&self, view: &SourceView) -> crate::Result<TargetView>;
}

/// Maps records to generic target classes and keeps their identifying
/// properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTranscoder;

impl DefaultTranscoder {
    const fn class_name(kind: RecordKind) -> Option<&'static str> {
        match kind {
            RecordKind::Spatial => Some("SpatialElement"),
            RecordKind::Drawing => Some("DrawingGraphic"),
            RecordKind::Sheet => Some("SheetGraphic"),
            RecordKind::Attachment => Some("Attachment"),
            RecordKind::Control => None,
        }
    }

    fn element(class_name: &str, element: &SourceElement) -> TargetElement {
        let mut properties = json!({
            "source_id": element.id,
            "element_type": element.header.element_type,
            "level": element.header.level,
            "payload_len": element.payload.len(),
        });
        if let Some(graphics) = &element.graphics {
            properties["color"] = json!(graphics.symbology.color);
            properties["weight"] = json!(graphics.symbology.weight);
            properties["range"] = json!(graphics.range);
        }
        if !element.external_resources.is_empty() {
            properties["resources"] = json!(element.external_resources);
        }

        TargetElement {
            class_name: class_name.to_string(),
            properties,
            children: element
                .children
                .iter()
                .map(|child| {
                    let class = Self::class_name(child.kind).unwrap_or(class_name);
                    Self::element(class, child)
                })
                .collect(),
        }
    }
}

impl Transcoder for DefaultTranscoder {
    fn transcode_model(&self, file: &SourceFile, model: &SourceModel) -> crate::Result<TargetModel> {
        Ok(TargetModel {
            name: model.name.clone(),
            kind: model.kind.as_str().to_string(),
            properties: json!({
                "source_file": file.name,
                "source_id": model.id,
                "transform": model.transform.0,
            }),
        })
    }

    fn transcode_element(
        &self,
        _model: &SourceModel,
        element: &SourceElement,
    ) -> crate::Result<Transcoded> {
        Ok(match Self::class_name(element.kind) {
            Some(class_name) => Transcoded::Element(Self::element(class_name, element)),
            None => Transcoded::Discard,
        })
    }

    fn transcode_view(&self, view: &SourceView) -> crate::Result<TargetView> {
        Ok(TargetView {
            name: view.name.clone(),
            properties: json!({
                "source_id": view.id,
                "content": view.content,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementHeader, ModelKind};

    fn spatial(id: u64) -> SourceElement {
        let mut element = SourceElement::new(id, b"payload".to_vec());
        element.kind = RecordKind::Spatial;
        element
    }

    #[test]
    fn test_control_element_is_discarded() {
        let mut element = SourceElement::new(1, b"settings".to_vec());
        element.header = ElementHeader::default();
        element.kind = RecordKind::classify(ModelKind::Spatial, &element.header);

        let result = DefaultTranscoder
            .transcode_element(&SourceModel::new(0, "Default"), &element)
            .unwrap();
        assert_eq!(result, Transcoded::Discard);
    }

    #[test]
    fn test_children_become_child_elements() {
        let element = spatial(1).with_child(spatial(2)).with_child(spatial(3));
        let Transcoded::Element(target) = DefaultTranscoder
            .transcode_element(&SourceModel::new(0, "Default"), &element)
            .unwrap()
        else {
            panic!("expected an element");
        };

        assert_eq!(target.class_name, "SpatialElement");
        assert_eq!(target.children.len(), 2);
        assert_eq!(target.properties["source_id"], 1);
        assert_eq!(target.properties["payload_len"], 7);
    }

    #[test]
    fn test_model_properties() {
        let file = SourceFile::new("/work/site.dgn");
        let mut model = SourceModel::new(4, "Sheet 1");
        model.kind = ModelKind::Sheet;

        let target = DefaultTranscoder.transcode_model(&file, &model).unwrap();
        assert_eq!(target.kind, "sheet");
        assert_eq!(target.properties["source_file"], "site.dgn");
    }
}
