//! Semantic guardrails: reject candidates whose computed kind contradicts
//! the intended action before they ever reach the gate.

use crate::browser::ElementSnapshot;
use crate::plan::{Action, Intent};

/// Input types that can never satisfy a `fill`.
const UNFILLABLE_INPUT_TYPES: &[&str] = &["range", "color", "file"];

/// aria-label fragments that mark layout chrome, never targets.
const CHROME_LABEL_TOKENS: &[&str] = &["column width", "resize", "splitter"];

/// Suffix nouns that disambiguate generic element names.
const SUFFIX_NOUNS: &[&str] = &["field", "input", "button", "search", "box"];

/// Whether a candidate is rejected outright for this intent.
pub fn rejects(intent: &Intent, snapshot: &ElementSnapshot) -> bool {
    // Layout chrome is never a target, regardless of tier or action.
    if let Some(label) = snapshot.attr("aria-label") {
        let label = label.to_lowercase();
        if CHROME_LABEL_TOKENS.iter().any(|t| label.contains(t)) {
            return true;
        }
    }

    if matches!(intent.action, Action::Fill | Action::Type) {
        // The fillable-element filter: selects and buttons cannot be filled.
        if snapshot.tag == "select" || snapshot.tag == "button" {
            return true;
        }
        if snapshot.tag == "input" {
            if let Some(input_type) = snapshot.input_type() {
                if UNFILLABLE_INPUT_TYPES.contains(&input_type.as_str()) {
                    return true;
                }
            }
        }
    }

    false
}

/// Small score bonus when a matched label ends with an allowlisted noun;
/// breaks ties between a generic label and a purpose-built control.
pub fn suffix_noun_bonus(matched_text: &str) -> f64 {
    let last = matched_text
        .to_lowercase()
        .split_whitespace()
        .last()
        .map(str::to_string)
        .unwrap_or_default();
    if SUFFIX_NOUNS.contains(&last.as_str()) {
        0.01
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BoundingBox;
    use std::collections::HashMap;

    fn snapshot(tag: &str, attrs: &[(&str, &str)]) -> ElementSnapshot {
        ElementSnapshot {
            tag: tag.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: String::new(),
            role: None,
            visible: true,
            enabled: true,
            bbox: BoundingBox::default(),
        }
    }

    fn fill_intent() -> Intent {
        Intent::new("Search", Action::Fill)
    }

    #[test]
    fn test_fill_rejects_select_and_button() {
        assert!(rejects(&fill_intent(), &snapshot("select", &[])));
        assert!(rejects(&fill_intent(), &snapshot("button", &[])));
        assert!(!rejects(&fill_intent(), &snapshot("input", &[])));
    }

    #[test]
    fn test_fill_rejects_nonfillable_input_types() {
        for t in ["range", "color", "file"] {
            assert!(rejects(&fill_intent(), &snapshot("input", &[("type", t)])));
        }
        assert!(!rejects(&fill_intent(), &snapshot("input", &[("type", "search")])));
    }

    #[test]
    fn test_chrome_labels_rejected_for_any_action() {
        let click = Intent::new("resize", Action::Click);
        assert!(rejects(
            &click,
            &snapshot("div", &[("aria-label", "Resize column width")])
        ));
    }

    #[test]
    fn test_click_allows_buttons() {
        let click = Intent::new("Save", Action::Click);
        assert!(!rejects(&click, &snapshot("button", &[])));
    }

    #[test]
    fn test_suffix_noun_bonus() {
        assert!(suffix_noun_bonus("Search box") > 0.0);
        assert!(suffix_noun_bonus("Account Name field") > 0.0);
        assert_eq!(suffix_noun_bonus("Navigation menu"), 0.0);
    }
}
