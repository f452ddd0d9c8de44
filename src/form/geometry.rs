//! Field geometry index: normalized field name → every anchor rectangle
//! declared for it across the form's pages.

use std::collections::BTreeMap;

use super::schema::normalize_name;
use super::types::{Page, Rect};

/// Lookup table built once per form.
///
/// Names shared by several widgets (checkbox options) keep all their
/// rectangles in page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryIndex {
    anchors: BTreeMap<String, Vec<Rect>>,
}

impl GeometryIndex {
    pub fn build(pages: &[Page]) -> Self {
        let mut anchors: BTreeMap<String, Vec<Rect>> = BTreeMap::new();

        for annot in pages.iter().flat_map(|p| p.annotations.iter()) {
            let (Some(name), Some(rect)) = (annot.field_name.as_deref(), annot.rect) else {
                continue;
            };
            anchors.entry(normalize_name(name)).or_default().push(rect);
        }

        tracing::debug!(fields = anchors.len(), "Geometry index built");
        Self { anchors }
    }

    /// All rectangles for a normalized name; empty when the field has no geometry.
    pub fn rects(&self, normalized_name: &str) -> &[Rect] {
        self.anchors
            .get(normalized_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, normalized_name: &str) -> Option<Rect> {
        self.rects(normalized_name).first().copied()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
