//! Element snapshots returned by driver queries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Viewport-relative bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Whether two samples describe the same box within a pixel.
    pub fn approx_eq(&self, other: &BoundingBox) -> bool {
        (self.x - other.x).abs() < 1.0
            && (self.y - other.y).abs() < 1.0
            && (self.width - other.width).abs() < 1.0
            && (self.height - other.height).abs() < 1.0
    }

    /// Zero-area boxes are not interactable.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// A point-in-time view of one DOM element.
///
/// Snapshots are what discovery tiers and the actionability gate reason
/// about; they carry no live handle back into the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Lowercased tag name.
    pub tag: String,
    /// Attribute map (`aria-label`, `name`, `placeholder`, `id`, `class`, ...).
    pub attributes: HashMap<String, String>,
    /// Visible text content.
    pub text: String,
    /// Computed ARIA role (explicit attribute or tag-implied).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Whether the element is currently rendered and unoccluded.
    pub visible: bool,
    /// Whether the element accepts interaction.
    pub enabled: bool,
    /// Current bounding box.
    pub bbox: BoundingBox,
}

impl ElementSnapshot {
    /// Attribute accessor.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The `type` attribute, lowercased (inputs).
    pub fn input_type(&self) -> Option<String> {
        self.attr("type").map(|t| t.to_lowercase())
    }

    /// Accessible name approximation: aria-label, else text, else title.
    pub fn accessible_name(&self) -> &str {
        if let Some(label) = self.attr("aria-label") {
            if !label.is_empty() {
                return label;
            }
        }
        if !self.text.is_empty() {
            return &self.text;
        }
        self.attr("title").unwrap_or("")
    }

    /// Whether the element is marked readonly.
    pub fn readonly(&self) -> bool {
        self.attributes.contains_key("readonly")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ElementSnapshot {
        ElementSnapshot {
            tag: "input".to_string(),
            attributes: [("aria-label".to_string(), "Search".to_string())]
                .into_iter()
                .collect(),
            text: String::new(),
            role: Some("textbox".to_string()),
            visible: true,
            enabled: true,
            bbox: BoundingBox::new(10.0, 10.0, 200.0, 32.0),
        }
    }

    #[test]
    fn test_accessible_name_prefers_aria_label() {
        let mut s = snapshot();
        s.text = "placeholder text".to_string();
        assert_eq!(s.accessible_name(), "Search");

        s.attributes.clear();
        assert_eq!(s.accessible_name(), "placeholder text");
    }

    #[test]
    fn test_bbox_approx_eq() {
        let a = BoundingBox::new(10.0, 10.0, 100.0, 30.0);
        let b = BoundingBox::new(10.4, 10.0, 100.0, 30.0);
        let c = BoundingBox::new(42.0, 10.0, 100.0, 30.0);
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&c));
    }
}
