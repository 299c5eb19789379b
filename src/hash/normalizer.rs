//! Volatility-stripping element hasher.

use super::{ContentHash, HashSink, NullSink, RecordHasher};
use crate::model::{ElementHeader, GraphicsHeader, SourceElement};

/// Lets a domain fold extra data into an element's fingerprint.
///
/// Every registered extension is offered every element, so data the core
/// does not understand still participates in change detection.
pub trait DomainExtension {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    fn fold_hash(&self, element: &SourceElement, hasher: &mut RecordHasher);
}

/// Supplies a canonical payload for comparison.
///
/// Used when an element's stored bytes do not reflect its effective
/// content, for example an attachment whose effective transform changed.
pub trait ComparisonTweak {
    /// Return `Some` to hash these bytes instead of the element's payload.
    fn substitute_payload(&self, element: &SourceElement) -> Option<Vec<u8>>;
}

/// Computes normalized content hashes for source elements.
pub struct HashNormalizer {
    extensions: Vec<Box<dyn DomainExtension>>,
    tweak: Option<Box<dyn ComparisonTweak>>,
    sink: Box<dyn HashSink>,
}

impl Default for HashNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl HashNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
            tweak: None,
            sink: Box::new(NullSink),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn HashSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_tweak(mut self, tweak: Box<dyn ComparisonTweak>) -> Self {
        self.tweak = Some(tweak);
        self
    }

    pub fn register_extension(&mut self, extension: Box<dyn DomainExtension>) {
        self.extensions.push(extension);
    }

    /// Hash one element, including its children, and report it to the sink.
    #[must_use]
    pub fn compute_hash(&self, element: &SourceElement) -> ContentHash {
        let mut hasher = RecordHasher::new();
        self.hash_into(element, &mut hasher);
        let hash = hasher.finish();
        self.sink.on_element_hashed(element, &hash);
        hash
    }

    fn hash_into(&self, element: &SourceElement, hasher: &mut RecordHasher) {
        let header = &element.header;
        hash_header(&normalized_header(header), hasher);

        // Presence follows the header flag, not whether a sub-header was read.
        if header.is_graphic() {
            let graphics = element.graphics.clone().unwrap_or_default();
            hash_graphics(&normalized_graphics(graphics), header.is_3d(), hasher);
        }

        match self.tweak.as_ref().and_then(|t| t.substitute_payload(element)) {
            Some(payload) => hasher.add_block(&payload),
            None => hasher.add_block(&element.payload),
        }

        let mut blocks: Vec<_> = element.extensions.iter().collect();
        blocks.sort_by_key(|b| (b.kind, b.instance));
        hasher.add_u64(blocks.len() as u64);
        for block in blocks {
            hasher.add_u32(block.kind);
            hasher.add_u32(block.instance);
            hasher.add_block(&block.data);
        }

        for extension in &self.extensions {
            extension.fold_hash(element, hasher);
        }

        hasher.add_u64(element.children.len() as u64);
        for child in &element.children {
            self.hash_into(child, hasher);
        }
    }
}

fn normalized_header(header: &ElementHeader) -> ElementHeader {
    ElementHeader {
        last_modified: 0.0,
        reserved: 0,
        ..header.clone()
    }
}

fn normalized_graphics(graphics: GraphicsHeader) -> GraphicsHeader {
    GraphicsHeader {
        graphic_group: 0,
        padding: 0,
        ..graphics
    }
}

fn hash_header(header: &ElementHeader, hasher: &mut RecordHasher) {
    // The element id occupies the first slot and is always zeroed.
    hasher.add_u64(0);
    hasher.add_u16(header.element_type);
    hasher.add_u32(header.level);
    hasher.add_u32(header.flags);
    hasher.add_f64(header.last_modified);
    hasher.add_u32(header.reserved);
}

fn hash_graphics(graphics: &GraphicsHeader, is_3d: bool, hasher: &mut RecordHasher) {
    hasher.add_u32(graphics.graphic_group);
    hasher.add_u16(graphics.class);
    hasher.add_u32(graphics.properties);
    hasher.add_u32(graphics.padding);
    hasher.add_u32(graphics.symbology.color);
    hasher.add_u32(graphics.symbology.weight);
    hasher.add_i32(graphics.symbology.style);
    // Range is [xlo, ylo, zlo, xhi, yhi, zhi]; 2D elements carry no z extent.
    let axes: &[usize] = if is_3d { &[0, 1, 2, 3, 4, 5] } else { &[0, 1, 3, 4] };
    for &axis in axes {
        hasher.add_f64(graphics.range[axis]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::RecordingSink;
    use crate::model::{ExtensionBlock, StableId, FLAG_3D, FLAG_GRAPHIC};

    fn graphic(id: u64, payload: &[u8]) -> SourceElement {
        let mut element = SourceElement::new(id, payload.to_vec());
        element.graphics = Some(GraphicsHeader {
            range: [0.0, 0.0, 0.0, 10.0, 10.0, 3.0],
            ..GraphicsHeader::default()
        });
        element
    }

    #[test]
    fn test_volatile_fields_do_not_affect_hash() {
        let normalizer = HashNormalizer::new();
        let a = graphic(1, b"line");
        let mut b = graphic(2, b"line");
        b.header.last_modified = 12345.0;
        b.header.reserved = 9;
        if let Some(g) = b.graphics.as_mut() {
            g.graphic_group = 77;
            g.padding = 3;
        }

        assert_eq!(normalizer.compute_hash(&a), normalizer.compute_hash(&b));
    }

    #[test]
    fn test_single_payload_byte_changes_hash() {
        let normalizer = HashNormalizer::new();
        assert_ne!(
            normalizer.compute_hash(&graphic(1, b"line")),
            normalizer.compute_hash(&graphic(1, b"linf"))
        );
    }

    #[test]
    fn test_2d_ignores_z_range() {
        let normalizer = HashNormalizer::new();
        let mut a = graphic(1, b"arc");
        a.header.flags = FLAG_GRAPHIC;
        let mut b = a.clone();
        if let Some(g) = b.graphics.as_mut() {
            g.range[2] = -50.0;
            g.range[5] = 50.0;
        }
        assert_eq!(normalizer.compute_hash(&a), normalizer.compute_hash(&b));

        a.header.flags = FLAG_GRAPHIC | FLAG_3D;
        b.header.flags = FLAG_GRAPHIC | FLAG_3D;
        assert_ne!(normalizer.compute_hash(&a), normalizer.compute_hash(&b));
    }

    #[test]
    fn test_2d_y_extent_changes_hash() {
        let normalizer = HashNormalizer::new();
        let mut a = graphic(1, b"arc");
        a.header.flags = FLAG_GRAPHIC;
        let mut b = a.clone();
        if let Some(g) = b.graphics.as_mut() {
            g.range[4] = 99.0;
        }
        assert_ne!(normalizer.compute_hash(&a), normalizer.compute_hash(&b));
    }

    #[test]
    fn test_graphics_presence_follows_flag() {
        let normalizer = HashNormalizer::new();
        let mut with_header = graphic(1, b"text");
        let mut without_header = with_header.clone();
        without_header.graphics = None;

        // Non-graphic: sub-header is never hashed, read or not.
        with_header.header.flags = 0;
        without_header.header.flags = 0;
        assert_eq!(
            normalizer.compute_hash(&with_header),
            normalizer.compute_hash(&without_header)
        );
    }

    #[test]
    fn test_extension_blocks_are_order_independent() {
        let normalizer = HashNormalizer::new();
        let block_a = ExtensionBlock {
            kind: 22,
            instance: 0,
            data: vec![1],
        };
        let block_b = ExtensionBlock {
            kind: 5,
            instance: 1,
            data: vec![2],
        };
        let mut a = graphic(1, b"x");
        a.extensions = vec![block_a.clone(), block_b.clone()];
        let mut b = graphic(1, b"x");
        b.extensions = vec![block_b, block_a];

        assert_eq!(normalizer.compute_hash(&a), normalizer.compute_hash(&b));
    }

    #[test]
    fn test_child_order_matters() {
        let normalizer = HashNormalizer::new();
        let first = graphic(2, b"a");
        let second = graphic(3, b"b");
        let a = graphic(1, b"cell")
            .with_child(first.clone())
            .with_child(second.clone());
        let b = graphic(1, b"cell").with_child(second).with_child(first);

        assert_ne!(normalizer.compute_hash(&a), normalizer.compute_hash(&b));
    }

    #[test]
    fn test_domain_extension_participates() {
        struct Tagged;
        impl DomainExtension for Tagged {
            fn name(&self) -> &str {
                "tagged"
            }
            fn fold_hash(&self, element: &SourceElement, hasher: &mut RecordHasher) {
                hasher.add_u64(element.id.0 % 2);
            }
        }

        let plain = HashNormalizer::new();
        let mut extended = HashNormalizer::new();
        extended.register_extension(Box::new(Tagged));

        let element = graphic(1, b"x");
        assert_ne!(plain.compute_hash(&element), extended.compute_hash(&element));
    }

    #[test]
    fn test_comparison_tweak_substitutes_payload() {
        struct Canonical;
        impl ComparisonTweak for Canonical {
            fn substitute_payload(&self, element: &SourceElement) -> Option<Vec<u8>> {
                element.header.is_attachment().then(|| b"canonical".to_vec())
            }
        }

        let normalizer = HashNormalizer::new().with_tweak(Box::new(Canonical));
        let mut a = graphic(1, b"stored-a");
        let mut b = graphic(1, b"stored-b");
        a.header.flags |= crate::model::FLAG_ATTACHMENT;
        b.header.flags |= crate::model::FLAG_ATTACHMENT;
        assert_eq!(normalizer.compute_hash(&a), normalizer.compute_hash(&b));
    }

    #[test]
    fn test_sink_sees_top_level_only() {
        let sink = RecordingSink::default();
        let normalizer = HashNormalizer::new().with_sink(Box::new(sink.clone()));
        let element = graphic(1, b"cell").with_child(graphic(2, b"child"));

        let hash = normalizer.compute_hash(&element);
        assert_eq!(sink.recorded(), vec![(StableId(1), hash)]);
    }
}
