//! Scope resolution: map a scope hint onto a container selector.
//!
//! Resolution order: dialog with a matching accessible name, then a form
//! with a matching label, then a named region/landmark. Tier walks then
//! query inside the resolved container.

use super::fuzzy::fuzzy_match;
use crate::browser::{BrowserDriver, ElementSnapshot};
use crate::error::Result;

/// Build the most specific driver-resolvable selector for a container.
fn selector_for(snapshot: &ElementSnapshot, role: &str, hint: &str) -> String {
    if let Some(id) = snapshot.attr("id") {
        return format!("#{}", id);
    }
    if let Some(label) = snapshot.attr("aria-label") {
        return format!("role={}[name=\"{}\"]", role, label);
    }
    format!("role={}[name=\"{}\"]", role, hint)
}

/// Resolve a scope hint to a container selector, or `None` when no
/// container matches (discovery then runs unscoped).
pub async fn resolve(driver: &dyn BrowserDriver, hint: &str) -> Result<Option<String>> {
    for role in ["dialog", "form", "region"] {
        let containers = driver.query_role(role, None).await?;
        for snapshot in &containers {
            if !snapshot.visible {
                continue;
            }
            let name = snapshot.accessible_name();
            if fuzzy_match(hint, name).is_some() || (name.is_empty() && role == "dialog") {
                return Ok(Some(selector_for(snapshot, role, hint)));
            }
        }
    }
    Ok(None)
}
