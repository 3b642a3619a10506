//! Scripted in-memory browser for tests.
//!
//! Models just enough of a page (element tree, attributes, visibility,
//! values) to exercise discovery, the gate, the executor patterns, and the
//! healer without a real browser. Pages mutate through [`Rule`]s: an action
//! matching a rule applies its effects (navigation, element injection,
//! removal), which is how autocomplete menus, modals, and validation
//! dialogs are simulated.

use super::types::{BoundingBox, ElementSnapshot};
use super::{split_nth, BrowserDriver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One element in a fake page. Index-linked into a parent chain.
#[derive(Debug, Clone)]
pub struct FakeElement {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub role: Option<String>,
    pub visible: bool,
    pub enabled: bool,
    /// Rendered but outside the viewport until scrolled.
    pub offscreen: bool,
    pub bbox: BoundingBox,
    pub value: String,
    pub parent: Option<usize>,
}

impl FakeElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            attributes: HashMap::new(),
            text: String::new(),
            role: None,
            visible: true,
            enabled: true,
            offscreen: false,
            bbox: BoundingBox::new(0.0, 0.0, 100.0, 30.0),
            value: String::new(),
            parent: None,
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn offscreen(mut self) -> Self {
        self.offscreen = true;
        self
    }

    pub fn bbox(mut self, x: f64, y: f64, w: f64, h: f64) -> Self {
        self.bbox = BoundingBox::new(x, y, w, h);
        self
    }

    /// Computed ARIA role: explicit, or implied by tag/attributes.
    pub fn computed_role(&self) -> Option<String> {
        if let Some(role) = self.attributes.get("role") {
            return Some(role.clone());
        }
        if let Some(role) = &self.role {
            return Some(role.clone());
        }
        let implied = match self.tag.as_str() {
            "a" if self.attributes.contains_key("href") => "link",
            "button" => "button",
            "select" => "combobox",
            "textarea" => "textbox",
            "li" => "listitem",
            "ul" | "ol" => "list",
            "article" => "article",
            "form" => "form",
            "dialog" => "dialog",
            "nav" => "navigation",
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
            "input" => match self
                .attributes
                .get("type")
                .map(|t| t.to_lowercase())
                .as_deref()
            {
                Some("button") | Some("submit") => "button",
                Some("checkbox") => "checkbox",
                Some("radio") => "radio",
                Some("range") => "slider",
                _ => "textbox",
            },
            _ => return None,
        };
        Some(implied.to_string())
    }

    fn effective_visible(&self) -> bool {
        self.visible && !self.offscreen
    }

    fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot {
            tag: self.tag.clone(),
            attributes: self.attributes.clone(),
            text: self.text.clone(),
            role: self.computed_role(),
            visible: self.effective_visible(),
            enabled: self.enabled,
            bbox: self.bbox,
        }
    }

    fn identity(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.attributes.get("id").cloned().unwrap_or_default(),
            self.attributes
                .get("aria-label")
                .cloned()
                .unwrap_or_default(),
            self.attributes.get("name").cloned().unwrap_or_default(),
            self.text
        )
    }
}

/// A fake page: element tree plus page-level text.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub url: String,
    pub html: String,
    pub elements: Vec<FakeElement>,
    pub extra_texts: Vec<String>,
}

impl FakePage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn element(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Append an element as a child of the last-appended element.
    pub fn child(mut self, mut element: FakeElement) -> Self {
        element.parent = self.elements.len().checked_sub(1);
        self.elements.push(element);
        self
    }

    pub fn page_text(mut self, text: impl Into<String>) -> Self {
        self.extra_texts.push(text.into());
        self
    }
}

/// Which driver action a rule fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Click,
    Fill,
    PressKey,
    PageKey,
}

/// State mutation applied when a rule fires.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Switch to another page (registered or blank); counts as navigation.
    NavigateTo(String),
    /// Inject elements, optionally under a parent container.
    AppendElements {
        parent_selector: Option<String>,
        elements: Vec<FakeElement>,
    },
    /// Remove every element matching the selector.
    RemoveElements(String),
    /// Add page-level text (e.g. after an in-place update).
    AddPageText(String),
}

/// A scripted behavior: action + target match + effects.
#[derive(Debug, Clone)]
pub struct Rule {
    pub on: ActionKind,
    /// Matched against the action's selector and the target's identity.
    pub target_contains: String,
    /// For key actions, the key that must be pressed.
    pub key: Option<String>,
    pub effects: Vec<Effect>,
    /// Fire at most once.
    pub once: bool,
}

impl Rule {
    pub fn on_click(target: impl Into<String>) -> Self {
        Self {
            on: ActionKind::Click,
            target_contains: target.into(),
            key: None,
            effects: Vec::new(),
            once: false,
        }
    }

    pub fn on_fill(target: impl Into<String>) -> Self {
        Self {
            on: ActionKind::Fill,
            target_contains: target.into(),
            key: None,
            effects: Vec::new(),
            once: false,
        }
    }

    pub fn on_key(target: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            on: ActionKind::PressKey,
            target_contains: target.into(),
            key: Some(key.into()),
            effects: Vec::new(),
            once: false,
        }
    }

    pub fn on_page_key(key: impl Into<String>) -> Self {
        Self {
            on: ActionKind::PageKey,
            target_contains: String::new(),
            key: Some(key.into()),
            effects: Vec::new(),
            once: false,
        }
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    pages: HashMap<String, FakePage>,
    current: String,
    rules: Vec<Rule>,
    fired: Vec<bool>,
    nav_count: u64,
    storage: Value,
    init_scripts: Vec<String>,
    eval_responses: Vec<(String, Value)>,
}

/// Scripted in-memory browser.
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page.
    pub fn page(self, page: FakePage) -> Self {
        {
            let mut state = self.lock();
            state.pages.insert(page.url.clone(), page);
        }
        self
    }

    /// Register a scripted rule.
    pub fn rule(self, rule: Rule) -> Self {
        {
            let mut state = self.lock();
            state.rules.push(rule);
            state.fired.push(false);
        }
        self
    }

    /// Register a canned eval response, matched by script substring.
    pub fn eval_response(self, script_contains: impl Into<String>, value: Value) -> Self {
        {
            let mut state = self.lock();
            state.eval_responses.push((script_contains.into(), value));
        }
        self
    }

    /// How many navigations have completed.
    pub fn nav_count(&self) -> u64 {
        self.lock().nav_count
    }

    /// Installed init scripts (tests assert fingerprint mitigations).
    pub fn init_scripts(&self) -> Vec<String> {
        self.lock().init_scripts.clone()
    }

    /// Mutate the current page in place (test setup convenience).
    pub fn mutate_current_page(&self, f: impl FnOnce(&mut FakePage)) {
        let mut state = self.lock();
        let current = state.current.clone();
        if let Some(page) = state.pages.get_mut(&current) {
            f(page);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whether an element matches one base selector (no ordinal suffix).
fn matches_base(el: &FakeElement, base: &str) -> bool {
    let base = base.trim();
    if base.is_empty() {
        return false;
    }

    // role=<role> or role=<role>[name="..."]
    if let Some(rest) = base.strip_prefix("role=") {
        let (role, name) = match rest.split_once("[name=\"") {
            Some((role, tail)) => (role.trim(), tail.strip_suffix("\"]").map(str::trim)),
            None => (rest.trim(), None),
        };
        let computed = match el.computed_role() {
            Some(r) => r,
            None => return false,
        };
        if !computed.eq_ignore_ascii_case(role) {
            return false;
        }
        if let Some(name) = name {
            let accessible = if let Some(label) = el.attributes.get("aria-label") {
                label.clone()
            } else {
                el.text.clone()
            };
            return accessible.to_lowercase().contains(&name.to_lowercase());
        }
        return true;
    }

    // CSS-ish: optional tag, then #id / .class / [attr] / [attr="value"] parts
    let mut rest = base;
    let tag_end = rest
        .find(|c| c == '#' || c == '.' || c == '[')
        .unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    if !tag.is_empty() && !el.tag.eq_ignore_ascii_case(tag) {
        return false;
    }
    rest = &rest[tag_end..];

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('#') {
            let end = tail
                .find(|c| c == '#' || c == '.' || c == '[')
                .unwrap_or(tail.len());
            let id = &tail[..end];
            if el.attributes.get("id").map(String::as_str) != Some(id) {
                return false;
            }
            rest = &tail[end..];
        } else if let Some(tail) = rest.strip_prefix('.') {
            let end = tail
                .find(|c| c == '#' || c == '.' || c == '[')
                .unwrap_or(tail.len());
            let class = &tail[..end];
            let has = el
                .attributes
                .get("class")
                .map(|c| c.split_whitespace().any(|t| t == class))
                .unwrap_or(false);
            if !has {
                return false;
            }
            rest = &tail[end..];
        } else if let Some(tail) = rest.strip_prefix('[') {
            let end = match tail.find(']') {
                Some(e) => e,
                None => return false,
            };
            let body = &tail[..end];
            let ok = match body.split_once('=') {
                Some((attr, value)) => {
                    let value = value.trim_matches('"');
                    el.attributes.get(attr.trim()).map(String::as_str) == Some(value)
                }
                None => el.attributes.contains_key(body.trim()),
            };
            if !ok {
                return false;
            }
            rest = &tail[end + 1..];
        } else {
            return false;
        }
    }

    true
}

impl FakeState {
    fn current_page(&self) -> Result<&FakePage> {
        self.pages
            .get(&self.current)
            .ok_or_else(|| Error::driver("no page loaded"))
    }

    fn current_page_mut(&mut self) -> Result<&mut FakePage> {
        let current = self.current.clone();
        self.pages
            .get_mut(&current)
            .ok_or_else(|| Error::driver("no page loaded"))
    }

    fn in_scope(&self, page: &FakePage, idx: usize, scope: Option<&str>) -> bool {
        let scope = match scope {
            Some(s) => s,
            None => return true,
        };
        let (base, _) = split_nth(scope);
        let containers: Vec<usize> = page
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| matches_base(el, base))
            .map(|(i, _)| i)
            .collect();

        let mut cursor = page.elements[idx].parent;
        while let Some(p) = cursor {
            if containers.contains(&p) {
                return true;
            }
            cursor = page.elements[p].parent;
        }
        false
    }

    fn find_indices(&self, selector: &str, scope: Option<&str>) -> Result<Vec<usize>> {
        let page = self.current_page()?;
        let (base, nth) = split_nth(selector);

        let mut indices: Vec<usize> = page
            .elements
            .iter()
            .enumerate()
            .filter(|(i, el)| matches_base(el, base) && self.in_scope(page, *i, scope))
            .map(|(i, _)| i)
            .collect();

        if let Some(n) = nth {
            indices = indices.into_iter().nth(n).map(|i| vec![i]).unwrap_or_default();
        }
        Ok(indices)
    }

    fn first_index(&self, selector: &str) -> Result<usize> {
        self.find_indices(selector, None)?
            .first()
            .copied()
            .ok_or_else(|| Error::driver(format!("no element matches {:?}", selector)))
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::NavigateTo(url) => {
                    self.pages
                        .entry(url.clone())
                        .or_insert_with(|| FakePage::new(url.clone()));
                    self.current = url;
                    self.nav_count += 1;
                }
                Effect::AppendElements {
                    parent_selector,
                    elements,
                } => {
                    let parent_idx = match parent_selector.as_deref() {
                        Some(sel) => self.find_indices(sel, None)?.first().copied(),
                        None => None,
                    };
                    let page = self.current_page_mut()?;
                    for mut el in elements {
                        if el.parent.is_none() {
                            el.parent = parent_idx;
                        }
                        page.elements.push(el);
                    }
                }
                Effect::RemoveElements(selector) => {
                    let doomed = self.find_indices(&selector, None)?;
                    let page = self.current_page_mut()?;
                    // Hide rather than splice so parent indices stay valid.
                    for idx in doomed {
                        page.elements[idx].visible = false;
                        page.elements[idx].attributes.remove("id");
                        page.elements[idx].attributes.remove("role");
                        page.elements[idx].role = Some("removed".to_string());
                    }
                }
                Effect::AddPageText(text) => {
                    self.current_page_mut()?.extra_texts.push(text);
                }
            }
        }
        Ok(())
    }

    fn fire_rules(
        &mut self,
        kind: ActionKind,
        action_target: &str,
        key: Option<&str>,
    ) -> Result<()> {
        let mut to_apply = Vec::new();
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.on != kind || (rule.once && self.fired[i]) {
                continue;
            }
            if let Some(required) = &rule.key {
                if key.map(|k| k.eq_ignore_ascii_case(required)) != Some(true) {
                    continue;
                }
            }
            if !rule.target_contains.is_empty()
                && !action_target
                    .to_lowercase()
                    .contains(&rule.target_contains.to_lowercase())
            {
                continue;
            }
            to_apply.push((i, rule.effects.clone()));
        }
        for (i, effects) in to_apply {
            self.fired[i] = true;
            self.apply_effects(effects)?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        state
            .pages
            .entry(url.to_string())
            .or_insert_with(|| FakePage::new(url));
        state.current = url.to_string();
        state.nav_count += 1;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().current.clone())
    }

    async fn page_html(&self) -> Result<String> {
        let state = self.lock();
        Ok(state.current_page()?.html.clone())
    }

    async fn query(&self, selector: &str, scope: Option<&str>) -> Result<Vec<ElementSnapshot>> {
        let state = self.lock();
        let indices = state.find_indices(selector, scope)?;
        let page = state.current_page()?;
        Ok(indices.iter().map(|&i| page.elements[i].snapshot()).collect())
    }

    async fn query_role(&self, role: &str, scope: Option<&str>) -> Result<Vec<ElementSnapshot>> {
        self.query(&format!("role={}", role), scope).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.lock();
        let idx = state.first_index(selector)?;
        let el = &state.current_page()?.elements[idx];
        if !el.effective_visible() || !el.enabled {
            return Err(Error::driver(format!("{:?} is not interactable", selector)));
        }
        let target = format!("{}|{}", selector, el.identity());
        state.fire_rules(ActionKind::Click, &target, None)
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        let idx = state.first_index(selector)?;
        {
            let page = state.current_page_mut()?;
            let el = &mut page.elements[idx];
            if !el.enabled {
                return Err(Error::driver("element is disabled"));
            }
            el.value = value.to_string();
        }
        let target = {
            let el = &state.current_page()?.elements[idx];
            format!("{}|{}", selector, el.identity())
        };
        state.fire_rules(ActionKind::Fill, &target, None)
    }

    async fn type_text(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        let idx = state.first_index(selector)?;
        let page = state.current_page_mut()?;
        page.elements[idx].value.push_str(value);
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        let mut state = self.lock();
        let idx = state.first_index(selector)?;
        let target = {
            let el = &state.current_page()?.elements[idx];
            format!("{}|{}", selector, el.identity())
        };
        state.fire_rules(ActionKind::PressKey, &target, Some(key))
    }

    async fn press_page_key(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        state.fire_rules(ActionKind::PageKey, "", Some(key))
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        let idx = state.first_index(selector)?;
        let page = state.current_page_mut()?;
        page.elements[idx].value = value.to_string();
        Ok(())
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()> {
        let mut state = self.lock();
        let idx = state.first_index(selector)?;
        let page = state.current_page_mut()?;
        page.elements[idx].value = if checked { "true" } else { "false" }.to_string();
        Ok(())
    }

    async fn hover(&self, _selector: &str) -> Result<()> {
        Ok(())
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        let state = self.lock();
        state.first_index(selector).map(|_| ())
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<()> {
        let mut state = self.lock();
        let indices = state.find_indices(selector, None)?;
        let page = state.current_page_mut()?;
        for idx in indices {
            page.elements[idx].offscreen = false;
        }
        Ok(())
    }

    async fn read_value(&self, selector: &str) -> Result<String> {
        let state = self.lock();
        let idx = state.first_index(selector)?;
        Ok(state.current_page()?.elements[idx].value.clone())
    }

    async fn eval(&self, script: &str) -> Result<Value> {
        let state = self.lock();
        for (needle, value) in &state.eval_responses {
            if script.contains(needle.as_str()) {
                return Ok(value.clone());
            }
        }
        Ok(Value::Null)
    }

    async fn wait_for_navigation(&self, from_url: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let state = self.lock();
                if state.current != from_url {
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn wait_network_idle(&self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn page_contains_text(&self, text: &str) -> Result<bool> {
        let state = self.lock();
        let page = state.current_page()?;
        let needle = text.to_lowercase();
        let found = page
            .extra_texts
            .iter()
            .any(|t| t.to_lowercase().contains(&needle))
            || page
                .elements
                .iter()
                .filter(|el| el.effective_visible())
                .any(|el| el.text.to_lowercase().contains(&needle))
            || page.url.to_lowercase().contains(&needle);
        Ok(found)
    }

    async fn install_init_script(&self, script: &str) -> Result<()> {
        self.lock().init_scripts.push(script.to_string());
        Ok(())
    }

    async fn load_storage_state(&self, state: &Value) -> Result<()> {
        self.lock().storage = state.clone();
        Ok(())
    }

    async fn save_storage_state(&self) -> Result<Value> {
        Ok(self.lock().storage.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_page() -> FakePage {
        FakePage::new("https://example.org")
            .element(
                FakeElement::new("input")
                    .attr("aria-label", "Search Wikipedia")
                    .id("searchInput"),
            )
            .element(FakeElement::new("button").id("searchButton").text("Search"))
    }

    #[tokio::test]
    async fn test_query_by_attribute() {
        let browser = FakeBrowser::new().page(search_page());
        browser.navigate("https://example.org").await.unwrap();

        let hits = browser.query("[aria-label]", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].attr("aria-label"), Some("Search Wikipedia"));

        let hits = browser
            .query("[aria-label=\"Search Wikipedia\"]", None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = browser.query("#searchButton", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tag, "button");
    }

    #[tokio::test]
    async fn test_query_role_and_nth() {
        let page = FakePage::new("u")
            .element(FakeElement::new("a").attr("href", "/1").text("one"))
            .element(FakeElement::new("a").attr("href", "/2").text("two"));
        let browser = FakeBrowser::new().page(page);
        browser.navigate("u").await.unwrap();

        let links = browser.query_role("link", None).await.unwrap();
        assert_eq!(links.len(), 2);

        let second = browser.query("role=link >> nth=1", None).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].text, "two");
    }

    #[tokio::test]
    async fn test_scope_restricts_to_descendants() {
        let page = FakePage::new("u")
            .element(FakeElement::new("div").role("dialog").attr("aria-label", "New Account"))
            .child(FakeElement::new("input").attr("name", "account"))
            .element(FakeElement::new("input").attr("name", "outside"));
        let browser = FakeBrowser::new().page(page);
        browser.navigate("u").await.unwrap();

        let scoped = browser.query("[name]", Some("role=dialog")).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].attr("name"), Some("account"));
    }

    #[tokio::test]
    async fn test_fill_and_read_value() {
        let browser = FakeBrowser::new().page(search_page());
        browser.navigate("https://example.org").await.unwrap();

        browser.fill("#searchInput", "rust").await.unwrap();
        assert_eq!(browser.read_value("#searchInput").await.unwrap(), "rust");
    }

    #[tokio::test]
    async fn test_click_rule_navigates() {
        let results = FakePage::new("https://example.org/results").page_text("Results for rust");
        let browser = FakeBrowser::new()
            .page(search_page())
            .page(results)
            .rule(
                Rule::on_click("searchButton")
                    .effect(Effect::NavigateTo("https://example.org/results".to_string())),
            );
        browser.navigate("https://example.org").await.unwrap();

        browser.click("#searchButton").await.unwrap();
        assert_eq!(
            browser.current_url().await.unwrap(),
            "https://example.org/results"
        );
        assert!(browser.page_contains_text("Results for rust").await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_navigation_sees_rule_nav() {
        let browser = FakeBrowser::new().page(search_page()).rule(
            Rule::on_key("searchInput", "Enter")
                .effect(Effect::NavigateTo("https://example.org/next".to_string())),
        );
        browser.navigate("https://example.org").await.unwrap();

        let from = browser.current_url().await.unwrap();
        browser.press_key("#searchInput", "Enter").await.unwrap();
        let navigated = browser
            .wait_for_navigation(&from, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(navigated);
    }

    #[tokio::test]
    async fn test_scroll_reveals_offscreen_element() {
        let page = FakePage::new("u").element(
            FakeElement::new("button").id("low").text("Load more").offscreen(),
        );
        let browser = FakeBrowser::new().page(page);
        browser.navigate("u").await.unwrap();

        assert!(!browser.query("#low", None).await.unwrap()[0].visible);
        browser.scroll_into_view("#low").await.unwrap();
        assert!(browser.query("#low", None).await.unwrap()[0].visible);
    }

    #[tokio::test]
    async fn test_append_elements_under_parent() {
        let page = FakePage::new("u")
            .element(FakeElement::new("div").role("dialog").attr("aria-label", "Modal"));
        let browser = FakeBrowser::new().page(page).rule(
            Rule::on_click("Modal").effect(Effect::AppendElements {
                parent_selector: Some("role=dialog".to_string()),
                elements: vec![FakeElement::new("input").attr("name", "inner")],
            }),
        );
        browser.navigate("u").await.unwrap();
        browser.click("role=dialog").await.unwrap();

        let scoped = browser.query("[name]", Some("role=dialog")).await.unwrap();
        assert_eq!(scoped.len(), 1);
    }
}
