//! Interaction pattern handlers.
//!
//! The executor dispatches on element kind + action; each handler returns
//! which strategy actually performed the interaction and how long it took.

use crate::browser::{selector_for_snapshot, BrowserDriver};
use crate::config::RuntimeConfig;
use crate::error::Result;
use std::time::{Duration, Instant};

/// What a pattern handler did.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternResult {
    pub success: bool,
    pub strategy_used: String,
    pub ms: u64,
}

impl PatternResult {
    fn done(strategy: &str, started: Instant) -> Self {
        Self {
            success: true,
            strategy_used: strategy.to_string(),
            ms: started.elapsed().as_millis() as u64,
        }
    }

    fn failed(strategy: &str, started: Instant) -> Self {
        Self {
            success: false,
            strategy_used: strategy.to_string(),
            ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Whether an autocomplete suggestion widget is currently open.
pub async fn autocomplete_open(driver: &dyn BrowserDriver) -> Result<bool> {
    let listboxes = driver.query("role=listbox", None).await?;
    Ok(listboxes.iter().any(|l| l.visible))
}

/// Press/Enter with an active autocomplete menu bypassed.
///
/// Strategy ladder: site-hint submit button, ancestor-form submit button,
/// native form submit via evaluation, page-level key press. Without an
/// open suggestion widget this is a plain key press.
pub async fn autocomplete_bypass(
    driver: &dyn BrowserDriver,
    selector: &str,
    key: &str,
    config: &RuntimeConfig,
) -> Result<PatternResult> {
    let started = Instant::now();

    if !autocomplete_open(driver).await? {
        driver.press_key(selector, key).await?;
        return Ok(PatternResult::done("direct_press", started));
    }

    tracing::debug!(selector, "autocomplete listbox open, using bypass ladder");

    // 1. Site-hint submit buttons
    for hint in &config.submit_hint_selectors {
        let hits = driver.query(hint, None).await?;
        if hits.iter().any(|h| h.visible && h.enabled) && driver.click(hint).await.is_ok() {
            return Ok(PatternResult::done("submit_hint", started));
        }
    }

    // 2. Submit button inside the ancestor form
    let scoped = driver.query("[type=\"submit\"]", Some("form")).await?;
    if let Some(button) = scoped.iter().find(|h| h.visible && h.enabled) {
        let button_selector = selector_for_snapshot(button);
        if driver.click(&button_selector).await.is_ok() {
            return Ok(PatternResult::done("form_submit_button", started));
        }
    }

    // 3. Native form submit via evaluation
    let submitted = driver
        .eval("var f = document.querySelector('form'); if (f) { f.submit(); return true; } return false;")
        .await;
    if submitted.map(|v| v.as_bool() == Some(true)).unwrap_or(false) {
        return Ok(PatternResult::done("native_submit", started));
    }

    // 4. Page-level key press bypasses the focused suggestion
    if driver.press_page_key(key).await.is_ok() {
        return Ok(PatternResult::done("page_key", started));
    }

    Ok(PatternResult::failed("page_key", started))
}

/// Fill with activator detection.
///
/// If the discovered element is a button/combobox, treat it as an
/// activator: click it, wait briefly for a descendant input to appear,
/// then fill the input that shows up. Otherwise fill directly.
pub async fn activator_first_fill(
    driver: &dyn BrowserDriver,
    selector: &str,
    value: &str,
    config: &RuntimeConfig,
) -> Result<PatternResult> {
    let started = Instant::now();

    let hits = driver.query(selector, None).await?;
    let snapshot = match hits.first() {
        Some(s) => s,
        None => return Ok(PatternResult::failed("direct_fill", started)),
    };

    let is_activator = snapshot.tag == "button"
        || snapshot.role.as_deref() == Some("button")
        || snapshot.role.as_deref() == Some("combobox");

    if !is_activator {
        driver.fill(selector, value).await?;
        return Ok(PatternResult::done("direct_fill", started));
    }

    tracing::debug!(selector, "fill target is an activator, clicking first");
    let before: usize = driver
        .query("input", None)
        .await?
        .iter()
        .filter(|s| s.visible && s.enabled)
        .count();

    driver.click(selector).await?;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(config.activator_input_wait_ms);
    loop {
        let inputs = driver.query("input", None).await?;
        let visible: Vec<_> = inputs.into_iter().filter(|s| s.visible && s.enabled).collect();
        if visible.len() > before {
            // Fill the input the activation revealed (the last in order).
            if let Some(revealed) = visible.last() {
                let input_selector = selector_for_snapshot(revealed);
                driver.fill(&input_selector, value).await?;
                return Ok(PatternResult::done("activator_fill", started));
            }
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    // No input appeared; fall back to filling the original target.
    driver.fill(selector, value).await?;
    Ok(PatternResult::done("direct_fill", started))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ActionKind, Effect, FakeBrowser, FakeElement, FakePage, Rule};

    fn search_page_with_listbox() -> FakePage {
        FakePage::new("u")
            .element(FakeElement::new("input").id("searchInput").attr("aria-label", "Search"))
            .element(FakeElement::new("ul").role("listbox").text("suggestions"))
            .element(FakeElement::new("button").id("searchButton").text("Go"))
    }

    #[tokio::test]
    async fn test_plain_press_without_listbox() {
        let page = FakePage::new("u")
            .element(FakeElement::new("input").id("searchInput"));
        let b = FakeBrowser::new().page(page);
        b.navigate("u").await.unwrap();

        let result = autocomplete_bypass(&b, "#searchInput", "Enter", &RuntimeConfig::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.strategy_used, "direct_press");
    }

    #[tokio::test]
    async fn test_bypass_prefers_site_hint_button() {
        let b = FakeBrowser::new().page(search_page_with_listbox()).rule(
            Rule::on_click("searchButton")
                .effect(Effect::NavigateTo("u/results".to_string())),
        );
        b.navigate("u").await.unwrap();

        let result = autocomplete_bypass(&b, "#searchInput", "Enter", &RuntimeConfig::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.strategy_used, "submit_hint");
        assert_eq!(b.current_url().await.unwrap(), "u/results");
    }

    #[tokio::test]
    async fn test_bypass_page_key_when_no_buttons() {
        let page = FakePage::new("u")
            .element(FakeElement::new("input").id("searchInput"))
            .element(FakeElement::new("ul").role("listbox"));
        let b = FakeBrowser::new().page(page).rule(
            Rule::on_page_key("Enter").effect(Effect::AddPageText("submitted".to_string())),
        );
        b.navigate("u").await.unwrap();

        let result = autocomplete_bypass(&b, "#searchInput", "Enter", &RuntimeConfig::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.strategy_used, "page_key");
        assert!(b.page_contains_text("submitted").await.unwrap());
    }

    #[tokio::test]
    async fn test_direct_fill_on_plain_input() {
        let page = FakePage::new("u").element(FakeElement::new("input").id("q"));
        let b = FakeBrowser::new().page(page);
        b.navigate("u").await.unwrap();

        let result = activator_first_fill(&b, "#q", "hello", &RuntimeConfig::default())
            .await
            .unwrap();
        assert_eq!(result.strategy_used, "direct_fill");
        assert_eq!(b.read_value("#q").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_activator_click_reveals_input() {
        let page = FakePage::new("u")
            .element(FakeElement::new("button").id("picker").text("Choose date"));
        let b = FakeBrowser::new().page(page).rule(
            Rule {
                on: ActionKind::Click,
                target_contains: "picker".to_string(),
                key: None,
                effects: vec![Effect::AppendElements {
                    parent_selector: None,
                    elements: vec![FakeElement::new("input").id("picker-input")],
                }],
                once: false,
            },
        );
        b.navigate("u").await.unwrap();

        let result = activator_first_fill(&b, "#picker", "2026-01-01", &RuntimeConfig::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.strategy_used, "activator_fill");
        assert_eq!(b.read_value("#picker-input").await.unwrap(), "2026-01-01");
    }
}
