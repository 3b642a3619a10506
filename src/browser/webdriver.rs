//! WebDriver-backed browser session (feature `webdriver`).
//!
//! Translates the crate's selector mini-language onto CSS queries plus
//! client-side filtering for role/name selectors. WebDriver has no real
//! network-idle or init-script surface, so those are approximated:
//! network idle degrades to document readyState polling, and init scripts
//! are re-evaluated after every navigation.

use super::types::{BoundingBox, ElementSnapshot};
use super::{split_nth, BrowserDriver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thirtyfour::prelude::*;

// WebDriver-spec key codepoints; avoids coupling to the Key helper type.
const KEY_ENTER: char = '\u{E007}';
const KEY_ESCAPE: char = '\u{E00C}';
const KEY_TAB: char = '\u{E004}';

const SNAPSHOT_ATTRS: &[&str] = &[
    "id", "class", "name", "type", "role", "href", "title", "for", "readonly", "value",
    "aria-label", "aria-placeholder", "placeholder", "data-testid", "data-test", "data-cy",
    "data-qa",
];

/// A live WebDriver session implementing [`BrowserDriver`].
pub struct WebDriverSession {
    driver: WebDriver,
    init_scripts: Mutex<Vec<String>>,
}

impl WebDriverSession {
    /// Connect to a running WebDriver endpoint (e.g. chromedriver).
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let caps = DesiredCapabilities::chrome();
        let driver = WebDriver::new(endpoint, caps)
            .await
            .map_err(|e| Error::driver_with_source("webdriver connect failed", e))?;
        Ok(Self {
            driver,
            init_scripts: Mutex::new(Vec::new()),
        })
    }

    /// Locate a local chromedriver binary, if one is on PATH.
    pub fn locate_chromedriver() -> Option<std::path::PathBuf> {
        which::which("chromedriver").ok()
    }

    /// End the session.
    pub async fn quit(self) -> Result<()> {
        self.driver
            .quit()
            .await
            .map_err(|e| Error::driver_with_source("webdriver quit failed", e))
    }

    fn key_codepoint(key: &str) -> String {
        match key.to_lowercase().as_str() {
            "enter" => KEY_ENTER.to_string(),
            "escape" | "esc" => KEY_ESCAPE.to_string(),
            "tab" => KEY_TAB.to_string(),
            other => other.to_string(),
        }
    }

    /// CSS approximation for a role query, used before name filtering.
    fn role_css(role: &str) -> String {
        match role {
            "link" => "a[href], [role='link']".to_string(),
            "button" => "button, input[type='button'], input[type='submit'], [role='button']"
                .to_string(),
            "textbox" => "input:not([type]), input[type='text'], input[type='search'], textarea, [role='textbox']"
                .to_string(),
            "combobox" => "select, [role='combobox']".to_string(),
            "listitem" => "li, [role='listitem']".to_string(),
            "article" => "article, [role='article']".to_string(),
            "heading" => "h1, h2, h3, h4, h5, h6, [role='heading']".to_string(),
            "dialog" => "dialog, [role='dialog']".to_string(),
            other => format!("[role='{}']", other),
        }
    }

    async fn resolve(&self, selector: &str, scope: Option<&str>) -> Result<Vec<WebElement>> {
        let (base, nth) = split_nth(selector);

        let (css, name_filter) = if let Some(rest) = base.strip_prefix("role=") {
            let (role, name) = match rest.split_once("[name=\"") {
                Some((role, tail)) => (
                    role.trim(),
                    tail.strip_suffix("\"]").map(|n| n.trim().to_lowercase()),
                ),
                None => (rest.trim(), None),
            };
            (Self::role_css(role), name)
        } else {
            (base.to_string(), None)
        };

        let found = match scope {
            Some(scope_sel) => {
                let (scope_base, _) = split_nth(scope_sel);
                let scope_css = if let Some(rest) = scope_base.strip_prefix("role=") {
                    let role = rest.split_once("[name=\"").map(|(r, _)| r).unwrap_or(rest);
                    Self::role_css(role.trim())
                } else {
                    scope_base.to_string()
                };
                let container = self
                    .driver
                    .find(By::Css(scope_css.as_str()))
                    .await
                    .map_err(|e| Error::driver_with_source("scope query failed", e))?;
                container
                    .find_all(By::Css(css.as_str()))
                    .await
                    .map_err(|e| Error::driver_with_source("scoped query failed", e))?
            }
            None => self
                .driver
                .find_all(By::Css(css.as_str()))
                .await
                .map_err(|e| Error::driver_with_source("query failed", e))?,
        };

        let mut kept = Vec::new();
        for element in found {
            if let Some(name) = &name_filter {
                let label = element.attr("aria-label").await.ok().flatten();
                let text = element.text().await.unwrap_or_default();
                let accessible = label.unwrap_or(text).to_lowercase();
                if !accessible.contains(name) {
                    continue;
                }
            }
            kept.push(element);
        }

        if let Some(n) = nth {
            kept = kept.into_iter().skip(n).take(1).collect();
        }
        Ok(kept)
    }

    async fn resolve_one(&self, selector: &str) -> Result<WebElement> {
        self.resolve(selector, None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::driver(format!("no element matches {:?}", selector)))
    }

    async fn snapshot(&self, element: &WebElement) -> Result<ElementSnapshot> {
        let tag = element
            .tag_name()
            .await
            .map_err(|e| Error::driver_with_source("tag_name failed", e))?
            .to_lowercase();

        let mut attributes = HashMap::new();
        for name in SNAPSHOT_ATTRS {
            if let Ok(Some(value)) = element.attr(name).await {
                attributes.insert((*name).to_string(), value);
            }
        }

        let text = element.text().await.unwrap_or_default();
        let visible = element.is_displayed().await.unwrap_or(false);
        let enabled = element.is_enabled().await.unwrap_or(false);
        let bbox = match element.rect().await {
            Ok(rect) => BoundingBox::new(rect.x, rect.y, rect.width, rect.height),
            Err(_) => BoundingBox::default(),
        };
        let role = attributes.get("role").cloned();

        Ok(ElementSnapshot {
            tag,
            attributes,
            text,
            role,
            visible,
            enabled,
            bbox,
        })
    }

    async fn reapply_init_scripts(&self) {
        let scripts: Vec<String> = {
            let guard = self.init_scripts.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        for script in scripts {
            let _ = self.driver.execute(&script, Vec::new()).await;
        }
    }
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.driver
            .goto(url)
            .await
            .map_err(|e| Error::driver_with_source("navigate failed", e))?;
        self.reapply_init_scripts().await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.driver
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| Error::driver_with_source("current_url failed", e))
    }

    async fn page_html(&self) -> Result<String> {
        self.driver
            .source()
            .await
            .map_err(|e| Error::driver_with_source("page source failed", e))
    }

    async fn query(&self, selector: &str, scope: Option<&str>) -> Result<Vec<ElementSnapshot>> {
        let elements = self.resolve(selector, scope).await?;
        let mut snapshots = Vec::with_capacity(elements.len());
        for element in &elements {
            snapshots.push(self.snapshot(element).await?);
        }
        Ok(snapshots)
    }

    async fn query_role(&self, role: &str, scope: Option<&str>) -> Result<Vec<ElementSnapshot>> {
        self.query(&format!("role={}", role), scope).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.resolve_one(selector)
            .await?
            .click()
            .await
            .map_err(|e| Error::driver_with_source("click failed", e))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.resolve_one(selector).await?;
        element
            .clear()
            .await
            .map_err(|e| Error::driver_with_source("clear failed", e))?;
        element
            .send_keys(value)
            .await
            .map_err(|e| Error::driver_with_source("fill failed", e))
    }

    async fn type_text(&self, selector: &str, value: &str) -> Result<()> {
        self.resolve_one(selector)
            .await?
            .send_keys(value)
            .await
            .map_err(|e| Error::driver_with_source("type failed", e))
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        let codepoint = Self::key_codepoint(key);
        self.resolve_one(selector)
            .await?
            .send_keys(codepoint.as_str())
            .await
            .map_err(|e| Error::driver_with_source("press failed", e))
    }

    async fn press_page_key(&self, key: &str) -> Result<()> {
        let codepoint = Self::key_codepoint(key);
        self.driver
            .action_chain()
            .send_keys(codepoint.as_str())
            .perform()
            .await
            .map_err(|e| Error::driver_with_source("page key failed", e))
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        // Options render as visible text; send_keys selects in native selects.
        self.resolve_one(selector)
            .await?
            .send_keys(value)
            .await
            .map_err(|e| Error::driver_with_source("select failed", e))
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()> {
        let element = self.resolve_one(selector).await?;
        let current = element
            .is_selected()
            .await
            .map_err(|e| Error::driver_with_source("checked state failed", e))?;
        if current != checked {
            element
                .click()
                .await
                .map_err(|e| Error::driver_with_source("toggle failed", e))?;
        }
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        let element = self.resolve_one(selector).await?;
        self.driver
            .action_chain()
            .move_to_element_center(&element)
            .perform()
            .await
            .map_err(|e| Error::driver_with_source("hover failed", e))
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        let element = self.resolve_one(selector).await?;
        self.driver
            .execute("arguments[0].focus();", vec![element.to_json().map_err(
                |e| Error::driver_with_source("focus arg failed", e),
            )?])
            .await
            .map_err(|e| Error::driver_with_source("focus failed", e))?;
        Ok(())
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<()> {
        let element = self.resolve_one(selector).await?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| Error::driver_with_source("scroll failed", e))
    }

    async fn read_value(&self, selector: &str) -> Result<String> {
        let element = self.resolve_one(selector).await?;
        Ok(element
            .attr("value")
            .await
            .map_err(|e| Error::driver_with_source("value read failed", e))?
            .unwrap_or_default())
    }

    async fn eval(&self, script: &str) -> Result<Value> {
        let ret = self
            .driver
            .execute(script, Vec::new())
            .await
            .map_err(|e| Error::driver_with_source("eval failed", e))?;
        Ok(ret.json().clone())
    }

    async fn wait_for_navigation(&self, from_url: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let url = self.current_url().await.unwrap_or_default();
            if url != from_url {
                let ready = self
                    .eval("return document.readyState;")
                    .await
                    .ok()
                    .and_then(|v| v.as_str().map(|s| s == "complete"))
                    .unwrap_or(false);
                if ready {
                    self.reapply_init_scripts().await;
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn wait_network_idle(&self, timeout: Duration) -> Result<bool> {
        // WebDriver exposes no network events; readyState is the best proxy.
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let ready = self
                .eval("return document.readyState;")
                .await
                .ok()
                .and_then(|v| v.as_str().map(|s| s == "complete"))
                .unwrap_or(false);
            if ready {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn page_contains_text(&self, text: &str) -> Result<bool> {
        let ret = self
            .driver
            .execute(
                "return (document.body.innerText || '').toLowerCase().includes(arguments[0].toLowerCase());",
                vec![json!(text)],
            )
            .await
            .map_err(|e| Error::driver_with_source("text probe failed", e))?;
        Ok(ret.json().as_bool().unwrap_or(false))
    }

    async fn install_init_script(&self, script: &str) -> Result<()> {
        {
            let mut guard = self.init_scripts.lock().unwrap_or_else(|e| e.into_inner());
            guard.push(script.to_string());
        }
        let _ = self.driver.execute(script, Vec::new()).await;
        Ok(())
    }

    async fn load_storage_state(&self, state: &Value) -> Result<()> {
        if let Some(cookies) = state.get("cookies").and_then(|c| c.as_array()) {
            for cookie in cookies {
                if let Ok(cookie) = serde_json::from_value(cookie.clone()) {
                    let _ = self.driver.add_cookie(cookie).await;
                }
            }
        }
        if let Some(local) = state.get("local_storage").and_then(|l| l.as_object()) {
            for (key, value) in local {
                let _ = self
                    .driver
                    .execute(
                        "window.localStorage.setItem(arguments[0], arguments[1]);",
                        vec![json!(key), value.clone()],
                    )
                    .await;
            }
        }
        Ok(())
    }

    async fn save_storage_state(&self) -> Result<Value> {
        let cookies = self
            .driver
            .get_all_cookies()
            .await
            .map_err(|e| Error::driver_with_source("cookie read failed", e))?;
        let local = self
            .eval(
                "var out = {}; for (var i = 0; i < localStorage.length; i++) { var k = localStorage.key(i); out[k] = localStorage.getItem(k); } return out;",
            )
            .await
            .unwrap_or(Value::Null);
        Ok(json!({
            "cookies": serde_json::to_value(cookies)?,
            "local_storage": local,
        }))
    }
}
