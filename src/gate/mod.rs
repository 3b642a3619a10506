//! Readiness and actionability gating.
//!
//! Three-stage readiness (DOM idle, element ready, app-ready hook)
//! followed by the five-point actionability gate (unique, visible,
//! enabled, bbox-stable, scoped). Gate failures populate
//! [`StepFailure`]; they never raise.

pub mod sentinel;

pub use sentinel::{DialogSentinel, SentinelHit};

use crate::browser::BrowserDriver;
use crate::browser::ElementSnapshot;
use crate::error::Result;
use crate::plan::Action;
use crate::profile::RuntimeProfile;
use crate::state::StepFailure;
use std::time::Duration;

/// Outcome of the actionability gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateResult {
    Pass(ElementSnapshot),
    Fail(StepFailure),
}

impl GateResult {
    pub fn failure(&self) -> Option<StepFailure> {
        match self {
            Self::Pass(_) => None,
            Self::Fail(f) => Some(*f),
        }
    }
}

/// Stage 1 + 3: page-level readiness for the current profile.
///
/// DOM idle is a soft wait; a timeout logs and proceeds. The app-ready
/// hook is a named window predicate, skipped when absent; Dynamic pages
/// additionally settle for the profile's empirical delay.
pub async fn page_ready(
    driver: &dyn BrowserDriver,
    profile: RuntimeProfile,
    app_ready_hook: Option<&str>,
) -> Result<()> {
    let budgets = profile.budgets();

    let idle = driver.wait_network_idle(budgets.dom_idle).await?;
    if !idle {
        tracing::debug!(profile = %profile, "network idle soft-timeout, proceeding");
    }

    if budgets.settle > Duration::ZERO {
        tokio::time::sleep(budgets.settle).await;
    }

    if let Some(hook) = app_ready_hook {
        let script = format!(
            "return (typeof window.{h} === 'function') ? window.{h}() : null;",
            h = hook
        );
        let deadline = tokio::time::Instant::now() + budgets.element_ready;
        loop {
            match driver.eval(&script).await {
                // Null: the page does not install the hook; stage skipped.
                Ok(value) if value.is_null() => break,
                Ok(value) if value.as_bool() == Some(true) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "app-ready hook eval failed, skipping");
                    break;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::debug!(hook = hook, "app-ready hook never turned true");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    Ok(())
}

/// Stage 2: wait for the locator to resolve visible and enabled. Best
/// effort; the five-point gate afterwards produces the diagnostic.
pub async fn element_ready(
    driver: &dyn BrowserDriver,
    selector: &str,
    budget: Duration,
) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        let hits = driver.query(selector, None).await?;
        if hits.iter().any(|s| s.visible && s.enabled) {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// The five-point actionability gate. Checks run in diagnostic order and
/// the first failure wins: unique, visible, enabled, bbox-stable, scoped.
pub async fn actionability(
    driver: &dyn BrowserDriver,
    selector: &str,
    scope: Option<&str>,
    action: Action,
    bbox_interval: Duration,
) -> Result<GateResult> {
    // unique
    let hits = driver.query(selector, None).await?;
    if hits.len() != 1 {
        tracing::debug!(selector, count = hits.len(), "uniqueness check failed");
        return Ok(GateResult::Fail(StepFailure::NotUnique));
    }
    let mut snapshot = match hits.into_iter().next() {
        Some(s) => s,
        None => return Ok(GateResult::Fail(StepFailure::NotUnique)),
    };

    // visible, with one scroll attempt
    if !snapshot.visible {
        driver.scroll_into_view(selector).await?;
        let hits = driver.query(selector, None).await?;
        snapshot = match hits.into_iter().next() {
            Some(s) => s,
            None => return Ok(GateResult::Fail(StepFailure::NotVisible)),
        };
        if !snapshot.visible {
            return Ok(GateResult::Fail(StepFailure::NotVisible));
        }
    }
    if snapshot.bbox.is_empty() {
        return Ok(GateResult::Fail(StepFailure::NotVisible));
    }

    // enabled (readonly counts as disabled for editable actions)
    if !snapshot.enabled {
        return Ok(GateResult::Fail(StepFailure::Disabled));
    }
    if action.is_editable() && snapshot.readonly() {
        return Ok(GateResult::Fail(StepFailure::Disabled));
    }

    // bbox-stable across two samples
    let first_box = snapshot.bbox;
    tokio::time::sleep(bbox_interval).await;
    let hits = driver.query(selector, None).await?;
    let second = match hits.into_iter().next() {
        Some(s) => s,
        None => return Ok(GateResult::Fail(StepFailure::Unstable)),
    };
    if !first_box.approx_eq(&second.bbox) {
        return Ok(GateResult::Fail(StepFailure::Unstable));
    }

    // scoped
    if let Some(scope_selector) = scope {
        let scoped = driver.query(selector, Some(scope_selector)).await?;
        if scoped.is_empty() {
            return Ok(GateResult::Fail(StepFailure::NotScoped));
        }
    }

    Ok(GateResult::Pass(second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{FakeBrowser, FakeElement, FakePage};

    const FAST: Duration = Duration::from_millis(5);

    async fn browser(page: FakePage) -> FakeBrowser {
        let b = FakeBrowser::new().page(page);
        b.navigate("u").await.unwrap();
        b
    }

    #[tokio::test]
    async fn test_gate_passes_clean_element() {
        let b = browser(FakePage::new("u").element(FakeElement::new("button").id("go"))).await;
        let result = actionability(&b, "#go", None, Action::Click, FAST).await.unwrap();
        assert!(matches!(result, GateResult::Pass(_)));
    }

    #[tokio::test]
    async fn test_not_unique_when_zero_or_many() {
        let b = browser(
            FakePage::new("u")
                .element(FakeElement::new("input").attr("name", "q"))
                .element(FakeElement::new("input").attr("name", "q")),
        )
        .await;

        let result = actionability(&b, "[name=\"q\"]", None, Action::Fill, FAST)
            .await
            .unwrap();
        assert_eq!(result.failure(), Some(StepFailure::NotUnique));

        let result = actionability(&b, "#missing", None, Action::Click, FAST)
            .await
            .unwrap();
        assert_eq!(result.failure(), Some(StepFailure::NotUnique));
    }

    #[tokio::test]
    async fn test_hidden_element_fails_visible() {
        let b = browser(FakePage::new("u").element(FakeElement::new("button").id("x").hidden()))
            .await;
        let result = actionability(&b, "#x", None, Action::Click, FAST).await.unwrap();
        assert_eq!(result.failure(), Some(StepFailure::NotVisible));
    }

    #[tokio::test]
    async fn test_offscreen_element_passes_after_scroll() {
        let b = browser(FakePage::new("u").element(FakeElement::new("button").id("x").offscreen()))
            .await;
        let result = actionability(&b, "#x", None, Action::Click, FAST).await.unwrap();
        assert!(matches!(result, GateResult::Pass(_)));
    }

    #[tokio::test]
    async fn test_disabled_and_readonly() {
        let b = browser(
            FakePage::new("u")
                .element(FakeElement::new("button").id("off").disabled())
                .element(FakeElement::new("input").id("ro").attr("readonly", "")),
        )
        .await;

        let result = actionability(&b, "#off", None, Action::Click, FAST).await.unwrap();
        assert_eq!(result.failure(), Some(StepFailure::Disabled));

        // readonly only blocks editable actions
        let result = actionability(&b, "#ro", None, Action::Fill, FAST).await.unwrap();
        assert_eq!(result.failure(), Some(StepFailure::Disabled));
        let result = actionability(&b, "#ro", None, Action::Click, FAST).await.unwrap();
        assert!(matches!(result, GateResult::Pass(_)));
    }

    #[tokio::test]
    async fn test_not_scoped() {
        let b = browser(
            FakePage::new("u")
                .element(FakeElement::new("div").role("dialog").attr("aria-label", "Modal"))
                .element(FakeElement::new("input").id("outside")),
        )
        .await;

        let result = actionability(&b, "#outside", Some("role=dialog"), Action::Fill, FAST)
            .await
            .unwrap();
        assert_eq!(result.failure(), Some(StepFailure::NotScoped));
    }

    #[tokio::test]
    async fn test_element_ready_polls_until_visible() {
        let b = browser(FakePage::new("u").element(FakeElement::new("button").id("go"))).await;
        assert!(element_ready(&b, "#go", Duration::from_millis(100)).await.unwrap());
        assert!(!element_ready(&b, "#never", Duration::from_millis(30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_page_ready_skips_absent_hook() {
        let b = browser(FakePage::new("u")).await;
        // Hook evals to null (absent); page_ready returns without waiting.
        page_ready(&b, RuntimeProfile::Static, Some("pactsReady")).await.unwrap();
    }

    #[tokio::test]
    async fn test_page_ready_waits_for_hook_true() {
        let b = FakeBrowser::new()
            .page(FakePage::new("u"))
            .eval_response("window.pactsReady", serde_json::json!(true));
        b.navigate("u").await.unwrap();
        page_ready(&b, RuntimeProfile::Static, Some("pactsReady")).await.unwrap();
    }
}
