//! Dialog sentinel: polls for validation/error dialogs around steps.

use crate::browser::BrowserDriver;
use crate::config::RuntimeConfig;
use crate::error::Result;

/// A recognized error dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelHit {
    /// Visible dialog text.
    pub text: String,
    /// The keyword that classified it as an error dialog.
    pub keyword: String,
}

/// Polls for error-dialog patterns and closes what it recognizes.
pub struct DialogSentinel {
    keywords: Vec<String>,
    close_selectors: Vec<String>,
}

impl DialogSentinel {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            keywords: config
                .sentinel_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            close_selectors: config.dialog_close_selectors.clone(),
        }
    }

    /// Collect the visible text of any open dialog.
    async fn dialog_text(&self, driver: &dyn BrowserDriver) -> Result<Option<String>> {
        let dialogs = driver.query("role=dialog", None).await?;
        let open: Vec<_> = dialogs.into_iter().filter(|d| d.visible).collect();
        if open.is_empty() {
            return Ok(None);
        }

        let mut text = String::new();
        for dialog in &open {
            if !dialog.text.is_empty() {
                text.push_str(&dialog.text);
                text.push(' ');
            }
        }
        // Children carry the message on most frameworks.
        for child in driver.query("div", Some("role=dialog")).await? {
            if child.visible && !child.text.is_empty() {
                text.push_str(&child.text);
                text.push(' ');
            }
        }
        Ok(Some(text.trim().to_string()))
    }

    /// Check for an error dialog; close it when found.
    ///
    /// Returns the hit so the caller can mark the step `timeout` and let
    /// the healer retry (or the verdict node classify `ui_blocked`).
    pub async fn check_and_close(&self, driver: &dyn BrowserDriver) -> Result<Option<SentinelHit>> {
        let text = match self.dialog_text(driver).await? {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(None),
        };

        let lower = text.to_lowercase();
        let keyword = match self.keywords.iter().find(|k| lower.contains(k.as_str())) {
            Some(k) => k.clone(),
            None => return Ok(None),
        };

        tracing::warn!(keyword = %keyword, "dialog sentinel matched an error dialog");

        // Close: recognized buttons first, ESC as the fallback.
        let mut closed = false;
        for selector in &self.close_selectors {
            let hits = driver.query(selector, None).await?;
            if hits.iter().any(|h| h.visible) {
                if driver.click(selector).await.is_ok() {
                    closed = true;
                    break;
                }
            }
        }
        if !closed {
            driver.press_page_key("Escape").await?;
        }

        Ok(Some(SentinelHit { text, keyword }))
    }
}
