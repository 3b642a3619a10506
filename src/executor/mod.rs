//! The Executor agent: per-step gate, pattern dispatch, outcome checks.

pub mod outcome;
pub mod patterns;

pub use patterns::PatternResult;

use crate::browser::BrowserDriver;
use crate::discovery::{scope, DiscoveryEngine, DiscoveryOptions, SelectorRecord};
use crate::error::Result;
use crate::gate::{self, DialogSentinel, GateResult};
use crate::graph::{Agent, NodeTag, RunCapabilities};
use crate::memory::{drift, CacheKey};
use crate::plan::{Action, Intent, Outcome};
use crate::state::{ExecutedStep, RunState, StepFailure};
use crate::telemetry::{RunEvent, RunEventType};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Dialog text fragments that mark an external refusal, not a bug.
const ANTI_BOT_TOKENS: &[&str] = &["captcha", "not a robot", "unusual traffic", "automated queries"];

/// Walks `plan[step_idx..]`, yielding to the healer on the first failure.
pub struct Executor {
    engine: DiscoveryEngine,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            engine: DiscoveryEngine::new(),
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatch the action through the appropriate interaction pattern.
async fn perform_action(
    driver: &dyn BrowserDriver,
    intent: &Intent,
    selector: &str,
    config: &crate::config::RuntimeConfig,
) -> Result<PatternResult> {
    let value = intent.value.as_deref().unwrap_or("");
    let started = Instant::now();

    let simple = |name: &str, started: Instant| PatternResult {
        success: true,
        strategy_used: name.to_string(),
        ms: started.elapsed().as_millis() as u64,
    };

    match intent.action {
        Action::Click => {
            driver.click(selector).await?;
            Ok(simple("click", started))
        }
        Action::Fill => patterns::activator_first_fill(driver, selector, value, config).await,
        Action::Type => {
            driver.type_text(selector, value).await?;
            Ok(simple("type", started))
        }
        Action::Press => {
            let key = if value.is_empty() { "Enter" } else { value };
            patterns::autocomplete_bypass(driver, selector, key, config).await
        }
        Action::Select => {
            driver.select_option(selector, value).await?;
            Ok(simple("select", started))
        }
        Action::Check => {
            driver.set_checked(selector, true).await?;
            Ok(simple("check", started))
        }
        Action::Uncheck => {
            driver.set_checked(selector, false).await?;
            Ok(simple("uncheck", started))
        }
        Action::Hover => {
            driver.hover(selector).await?;
            Ok(simple("hover", started))
        }
        Action::Focus => {
            driver.focus(selector).await?;
            Ok(simple("focus", started))
        }
        // Assertion-only steps: the outcome check is the work.
        Action::Wait => Ok(simple("wait", started)),
        Action::Navigate => {
            driver.navigate(value).await?;
            Ok(simple("navigate", started))
        }
    }
}

impl Executor {
    /// Run the sentinel around a step; returns true when the run must
    /// yield (failure recorded in state).
    async fn sentinel_yield(
        sentinel: &Option<DialogSentinel>,
        driver: &dyn BrowserDriver,
        state: &mut RunState,
        caps: &RunCapabilities,
        when: &str,
    ) -> bool {
        let Some(sentinel) = sentinel else {
            return false;
        };
        match sentinel.check_and_close(driver).await {
            Ok(Some(hit)) => {
                let lower = hit.text.to_lowercase();
                state.set_context("sentinel_fired", true);
                if ANTI_BOT_TOKENS.iter().any(|t| lower.contains(t)) {
                    state.set_context("blocked", true);
                }
                state.failure = Some(StepFailure::Timeout);
                caps.events.emit(
                    RunEvent::new(
                        RunEventType::Exec,
                        &state.req_id,
                        state.step_idx,
                        format!("sentinel closed error dialog ({} step): {}", when, hit.keyword),
                    )
                    .with_metadata("keyword", hit.keyword.clone()),
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::debug!(error = %e, "sentinel poll failed, ignoring");
                false
            }
        }
    }

    /// Discover a selector at execution time. The POMBuilder cannot see
    /// elements that only exist after earlier steps navigate or open
    /// panels; this closes that gap on the live page.
    async fn jit_discover(
        &self,
        state: &mut RunState,
        caps: &RunCapabilities,
        intent: &Intent,
        idx: usize,
    ) -> Option<SelectorRecord> {
        let driver = &*caps.driver;
        let scope_selector = match &intent.scope_hint {
            Some(hint) => scope::resolve(driver, hint).await.ok().flatten(),
            None => None,
        };

        let mut record = self
            .engine
            .discover(driver, intent, scope_selector.as_deref(), &DiscoveryOptions::standard())
            .await
            .ok()
            .flatten()?;
        record.meta.scope = scope_selector;

        if record.stable && record.meta.ordinal.is_none() {
            if let Some(url) = state.url().map(str::to_string) {
                let key = CacheKey::new(&url, &intent.element_name, intent.action);
                let hits = driver.query(&record.selector, None).await.unwrap_or_default();
                let dom_hash = hits.first().map(drift::fingerprint);
                if let Err(e) = caps.cache.admit(&key, &record, dom_hash.as_deref()).await {
                    tracing::debug!(error = %e, "jit cache admit dropped");
                }
            }
        }

        caps.events.emit(
            RunEvent::new(
                RunEventType::Discovery,
                &state.req_id,
                idx,
                format!(
                    "resolved {:?} -> {} at execution time",
                    intent.element_name, record.selector
                ),
            )
            .with_strategy(record.strategy.as_str()),
        );
        state.discovered[idx] = Some(record.clone());
        Some(record)
    }

    /// Execute one step. Returns false when the executor must yield.
    async fn run_step(&self, state: &mut RunState, caps: &RunCapabilities) -> bool {
        let driver = &*caps.driver;
        let config = &*caps.config;
        let profile = state.profile();
        let budgets = profile.budgets();
        let sentinel = config
            .sentinel_enabled
            .then(|| DialogSentinel::from_config(config));

        let idx = state.step_idx;
        let intent = state.plan[idx].clone();

        if Self::sentinel_yield(&sentinel, driver, state, caps, "before").await {
            return false;
        }

        // Assertion and navigation steps act on the page, not an element.
        let needs_element = !matches!(intent.action, Action::Wait | Action::Navigate);

        let record = match state.current_record().cloned() {
            Some(r) => Some(r),
            None if needs_element => self.jit_discover(state, caps, &intent, idx).await,
            None => None,
        };
        let record = match (needs_element, record) {
            (true, None) => {
                state.failure = Some(StepFailure::DiscoveryMissing);
                caps.events.emit(RunEvent::new(
                    RunEventType::Exec,
                    &state.req_id,
                    idx,
                    format!("no selector discovered for {:?}", intent.element_name),
                ));
                return false;
            }
            (_, record) => record,
        };
        let selector = record
            .as_ref()
            .map(|r| r.selector.clone())
            .unwrap_or_default();
        let scope = record.as_ref().and_then(|r| r.meta.scope.clone());
        let cache_key = state
            .url()
            .map(|url| CacheKey::new(url, &intent.element_name, intent.action));

        let step_started = Instant::now();
        let mut transient_attempts: u32 = 0;

        loop {
            // Readiness stages 1 + 3 (page), then stage 2 (element).
            if let Err(e) = gate::page_ready(driver, profile, config.app_ready_hook.as_deref()).await
            {
                tracing::warn!(error = %e, "page readiness degraded");
            }
            if needs_element {
                match gate::element_ready(driver, &selector, budgets.element_ready).await {
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "element readiness degraded"),
                }
            }

            // Five-point actionability gate (skipped for assertion steps).
            if needs_element {
                let gate_result = match gate::actionability(
                    driver,
                    &selector,
                    scope.as_deref(),
                    intent.action,
                    Duration::from_millis(config.bbox_sample_interval_ms),
                )
                .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        // Driver hiccup: a single retry, then yield as timeout.
                        tracing::warn!(error = %e, "gate driver error");
                        if transient_attempts == 0 {
                            transient_attempts += 1;
                            continue;
                        }
                        GateResult::Fail(StepFailure::Timeout)
                    }
                };

                if let Some(failure) = gate_result.failure() {
                    if failure.is_transient() && transient_attempts < config.transient_retries {
                        transient_attempts += 1;
                        tracing::debug!(
                            step = idx,
                            attempt = transient_attempts,
                            %failure,
                            "transient gate failure, same-selector retry"
                        );
                        continue;
                    }
                    state.failure = Some(failure);
                    if record.as_ref().map(|r| r.meta.from_cache).unwrap_or(false) {
                        if let Some(key) = &cache_key {
                            let invalidated =
                                caps.cache.note_failure(key).await.unwrap_or(false);
                            if invalidated {
                                caps.events.emit(RunEvent::new(
                                    RunEventType::Cache,
                                    &state.req_id,
                                    idx,
                                    "cached selector invalidated after repeated failures",
                                ));
                            }
                        }
                    }
                    caps.events.emit(
                        RunEvent::new(
                            RunEventType::Gate,
                            &state.req_id,
                            idx,
                            format!("gate failed: {}", failure),
                        )
                        .with_strategy(
                            record
                                .as_ref()
                                .map(|r| r.strategy.as_str())
                                .unwrap_or("none"),
                        ),
                    );
                    return false;
                }
            }

            // Act.
            let from_url = match driver.current_url().await {
                Ok(u) => u,
                Err(_) => String::new(),
            };
            let pattern = match perform_action(driver, &intent, &selector, config).await {
                Ok(p) if p.success => p,
                Ok(_) | Err(_) => {
                    if transient_attempts < config.transient_retries {
                        transient_attempts += 1;
                        continue;
                    }
                    state.failure = Some(StepFailure::Timeout);
                    return false;
                }
            };

            if Self::sentinel_yield(&sentinel, driver, state, caps, "after").await {
                return false;
            }

            // Verify the declared outcome.
            let verified = match outcome::verify(
                driver,
                intent.outcome.as_ref(),
                &selector,
                intent.value.as_deref(),
                &from_url,
                &config.nav_token_selectors,
                profile,
            )
            .await
            {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "outcome verification errored");
                    false
                }
            };

            if !verified {
                // A field_populated verification failure heals exactly once,
                // then counts as a terminal step failure.
                if matches!(intent.outcome, Some(Outcome::FieldPopulated)) {
                    let flag = format!("fp_heal_attempted_{}", idx);
                    if state.context_flag(&flag) {
                        state.set_context("assertion_terminal", true);
                    } else {
                        state.set_context(flag, true);
                    }
                }
                state.failure = Some(StepFailure::AssertionFail);
                caps.events.emit(RunEvent::new(
                    RunEventType::Exec,
                    &state.req_id,
                    idx,
                    format!(
                        "outcome {:?} not satisfied",
                        intent.outcome.as_ref().map(|o| o.to_string())
                    ),
                ));
                return false;
            }

            // Success bookkeeping.
            if record.as_ref().map(|r| r.meta.from_cache).unwrap_or(false) {
                if let Some(key) = &cache_key {
                    let hits = driver.query(&selector, None).await.unwrap_or_default();
                    let dom_hash = hits.first().map(drift::fingerprint);
                    if let Err(e) = caps.cache.note_success(key, dom_hash.as_deref()).await {
                        tracing::debug!(error = %e, "cache success note dropped");
                    }
                }
            }

            let total_ms = step_started.elapsed().as_millis() as u64;
            let outcome_label = intent
                .outcome
                .as_ref()
                .map(|o| o.to_string())
                .unwrap_or_else(|| "ok".to_string());
            caps.events.emit(
                RunEvent::new(
                    RunEventType::Exec,
                    &state.req_id,
                    idx,
                    format!("{} {:?} ok", intent.action, intent.element_name),
                )
                .with_strategy(pattern.strategy_used.clone())
                .with_ms(total_ms),
            );
            state.executed_steps.push(ExecutedStep {
                intent,
                selector,
                strategy: record.as_ref().map(|r| r.strategy),
                ms: total_ms,
                outcome: outcome_label,
                pattern: Some(pattern.strategy_used),
            });
            state.step_idx += 1;
            // The healing budget is per step: a completed step hands the
            // full budget to the next one.
            state.heal_round = 0;
            return true;
        }
    }
}

#[async_trait]
impl Agent for Executor {
    fn tag(&self) -> NodeTag {
        NodeTag::Executor
    }

    async fn run(&self, state: &mut RunState, caps: &RunCapabilities) {
        if state.verdict.is_some() {
            return;
        }
        state.failure = None;

        while state.step_idx < state.plan.len() {
            if !self.run_step(state, caps).await {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{FakeBrowser, FakeElement, FakePage};
    use crate::config::RuntimeConfigBuilder;
    use crate::discovery::{SelectorRecord, Strategy};
    use crate::memory::{HealLedger, SelectorCache, SqliteStore};
    use crate::telemetry::EventSink;
    use std::sync::Arc;

    fn caps(browser: FakeBrowser) -> RunCapabilities {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        RunCapabilities {
            driver: Arc::new(browser),
            cache: Arc::new(SelectorCache::new(store.clone(), 60, 7)),
            ledger: Arc::new(HealLedger::new(store.clone())),
            store,
            config: Arc::new(
                RuntimeConfigBuilder::new().bbox_sample_interval_ms(5).build(),
            ),
            events: EventSink::new(),
        }
    }

    fn state_with_step(intent: Intent, record: SelectorRecord) -> RunState {
        let mut state = RunState::new("req-exec");
        state.set_context("url", "https://u");
        state.plan = vec![intent];
        state.discovered = vec![Some(record)];
        state
    }

    #[tokio::test]
    async fn test_executes_fill_step() {
        let browser = FakeBrowser::new()
            .page(FakePage::new("https://u").element(FakeElement::new("input").id("q")));
        browser.navigate("https://u").await.unwrap();
        let caps = caps(browser);

        let mut state = state_with_step(
            Intent::new("query", Action::Fill).with_value("rust"),
            SelectorRecord::new("#q", Strategy::IdClass, 0.7),
        );

        Executor::new().run(&mut state, &caps).await;
        assert_eq!(state.executed_steps.len(), 1);
        assert_eq!(state.step_idx, 1);
        assert!(state.failure.is_none());
        assert_eq!(state.executed_steps[0].pattern.as_deref(), Some("direct_fill"));
    }

    #[tokio::test]
    async fn test_missing_record_yields_discovery_missing() {
        let browser = FakeBrowser::new().page(FakePage::new("https://u"));
        browser.navigate("https://u").await.unwrap();
        let caps = caps(browser);

        let mut state = RunState::new("req");
        state.set_context("url", "https://u");
        state.plan = vec![Intent::new("ghost", Action::Click)];
        state.discovered = vec![None];

        Executor::new().run(&mut state, &caps).await;
        assert_eq!(state.failure, Some(StepFailure::DiscoveryMissing));
        assert!(state.executed_steps.is_empty());
    }

    #[tokio::test]
    async fn test_gate_failure_yields_to_healer() {
        let browser = FakeBrowser::new().page(
            FakePage::new("https://u").element(FakeElement::new("button").id("go").hidden()),
        );
        browser.navigate("https://u").await.unwrap();
        let caps = caps(browser);

        let mut state = state_with_step(
            Intent::new("go", Action::Click),
            SelectorRecord::new("#go", Strategy::IdClass, 0.7),
        );

        Executor::new().run(&mut state, &caps).await;
        assert_eq!(state.failure, Some(StepFailure::NotVisible));
        assert_eq!(state.step_idx, 0);
    }

    #[tokio::test]
    async fn test_field_populated_outcome_checked() {
        let browser = FakeBrowser::new()
            .page(FakePage::new("https://u").element(FakeElement::new("input").id("q")));
        browser.navigate("https://u").await.unwrap();
        let caps = caps(browser);

        let mut intent = Intent::new("query", Action::Fill).with_value("rust");
        intent.outcome = Some(Outcome::FieldPopulated);
        let mut state =
            state_with_step(intent, SelectorRecord::new("#q", Strategy::IdClass, 0.7));

        Executor::new().run(&mut state, &caps).await;
        assert_eq!(state.executed_steps.len(), 1);
        assert_eq!(state.executed_steps[0].outcome, "field_populated");
    }

    #[tokio::test]
    async fn test_wait_step_verifies_page_text() {
        let browser = FakeBrowser::new()
            .page(FakePage::new("https://u").page_text("Artificial intelligence"));
        browser.navigate("https://u").await.unwrap();
        let caps = caps(browser);

        let mut intent = Intent::new("assertion", Action::Wait);
        intent.outcome = Some(Outcome::PageContainsText("Artificial intelligence".to_string()));
        let mut state = state_with_step(
            intent,
            SelectorRecord::new("#anything", Strategy::IdClass, 0.7),
        );

        Executor::new().run(&mut state, &caps).await;
        assert_eq!(state.executed_steps.len(), 1);
        assert!(state.failure.is_none());
    }
}
