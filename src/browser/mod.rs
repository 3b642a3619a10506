//! Browser driver abstraction.
//!
//! PACTS drives a real browser through the [`BrowserDriver`] trait; the
//! concrete vendor is an implementation detail. Two implementations ship
//! here: a scripted in-memory fake for tests, and (behind the `webdriver`
//! feature) a thirtyfour-backed WebDriver session.
//!
//! ## Selector language
//!
//! Discovery emits selectors in a small, driver-portable language:
//!
//! - `#id`, `.class`, `tag`
//! - `[attr]`, `[attr="value"]`, `tag[attr="value"]`
//! - `role=<role>`, `role=<role>[name="<accessible name>"]`
//! - any of the above suffixed with ` >> nth=<N>` for ordinal selection
//!
//! Drivers must resolve exactly this language; nothing richer is required.

mod fake;
mod types;

#[cfg(feature = "webdriver")]
mod webdriver;

pub use fake::{ActionKind, Effect, FakeBrowser, FakeElement, FakePage, Rule};
pub use types::{BoundingBox, ElementSnapshot};

#[cfg(feature = "webdriver")]
pub use webdriver::WebDriverSession;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Session-holding browser handle.
///
/// One driver instance is exclusively owned by one run; implementations
/// must still be `Send + Sync` so the handle can cross await points
/// inside the run.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate the page to a URL and wait for the load event.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Current page URL.
    async fn current_url(&self) -> Result<String>;

    /// Full page HTML (profile detection reads this once).
    async fn page_html(&self) -> Result<String>;

    /// Query elements matching a selector, in document order, optionally
    /// restricted to descendants of a scope container selector.
    async fn query(&self, selector: &str, scope: Option<&str>) -> Result<Vec<ElementSnapshot>>;

    /// Query elements by computed ARIA role, in document order.
    async fn query_role(&self, role: &str, scope: Option<&str>) -> Result<Vec<ElementSnapshot>>;

    /// Click the first match of a selector.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Replace the value of an editable element.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Type into an element key by key (appends).
    async fn type_text(&self, selector: &str, value: &str) -> Result<()>;

    /// Press a key with the element focused.
    async fn press_key(&self, selector: &str, key: &str) -> Result<()>;

    /// Press a key at page level, bypassing any focused suggestion widget.
    async fn press_page_key(&self, key: &str) -> Result<()>;

    /// Select an option by visible label or value.
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    /// Check or uncheck a checkbox-like element.
    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()>;

    /// Hover the element.
    async fn hover(&self, selector: &str) -> Result<()>;

    /// Focus the element.
    async fn focus(&self, selector: &str) -> Result<()>;

    /// Scroll the element into view.
    async fn scroll_into_view(&self, selector: &str) -> Result<()>;

    /// Read back the current value of an editable element.
    async fn read_value(&self, selector: &str) -> Result<String>;

    /// Evaluate a script in page context and return its JSON result.
    async fn eval(&self, script: &str) -> Result<Value>;

    /// Wait until the page has navigated away from `from_url` and settled,
    /// or the timeout elapses. Returns whether a navigation completed.
    async fn wait_for_navigation(&self, from_url: &str, timeout: Duration) -> Result<bool>;

    /// Wait for network idle. Returns false on timeout (soft failure).
    async fn wait_network_idle(&self, timeout: Duration) -> Result<bool>;

    /// Whether the rendered page currently contains the text.
    async fn page_contains_text(&self, text: &str) -> Result<bool>;

    /// Install a script evaluated on every new document (fingerprint
    /// mitigations are installed through this hook).
    async fn install_init_script(&self, script: &str) -> Result<()>;

    /// Restore cookies + local storage from an opaque blob.
    async fn load_storage_state(&self, state: &Value) -> Result<()>;

    /// Capture cookies + local storage as an opaque blob.
    async fn save_storage_state(&self) -> Result<Value>;
}

/// Append an ordinal suffix to a selector.
pub fn with_nth(selector: &str, ordinal: usize) -> String {
    format!("{} >> nth={}", selector, ordinal)
}

/// Build the most specific resolvable selector for a snapshot:
/// id, then name, then aria-label, then the bare tag.
pub fn selector_for_snapshot(snapshot: &ElementSnapshot) -> String {
    if let Some(id) = snapshot.attr("id") {
        if !id.is_empty() {
            return format!("#{}", id);
        }
    }
    if let Some(name) = snapshot.attr("name") {
        if !name.is_empty() {
            return format!("[name=\"{}\"]", name);
        }
    }
    if let Some(label) = snapshot.attr("aria-label") {
        if !label.is_empty() {
            return format!("[aria-label=\"{}\"]", label);
        }
    }
    snapshot.tag.clone()
}

/// Split a selector into its base and optional ordinal.
pub fn split_nth(selector: &str) -> (&str, Option<usize>) {
    match selector.split_once(" >> nth=") {
        Some((base, n)) => (base, n.trim().parse().ok()),
        None => (selector, None),
    }
}

#[cfg(test)]
mod selector_tests {
    use super::*;

    #[test]
    fn test_nth_roundtrip() {
        let s = with_nth("role=link", 2);
        assert_eq!(s, "role=link >> nth=2");
        assert_eq!(split_nth(&s), ("role=link", Some(2)));
        assert_eq!(split_nth("#plain"), ("#plain", None));
    }
}
