//! The PACTS runtime: wires capabilities into runs and drives the graph.
//!
//! One runtime holds one browser driver and one durable store. Runs are
//! strictly sequential within a runtime; concurrent runs each get their
//! own runtime over a shared store.

use crate::browser::BrowserDriver;
use crate::config::RuntimeConfig;
use crate::executor::Executor;
use crate::generator::Generator;
use crate::graph::{AgentGraph, RunCapabilities};
use crate::healer::OracleHealer;
use crate::memory::{HealLedger, RunStepRow, SelectorCache, SqliteStore};
use crate::plan::{expand_suite, Intent, PlannerAgent, Suite};
use crate::pombuilder::PomBuilder;
use crate::redact;
use crate::state::{RunState, Verdict};
use crate::telemetry::EventSink;
use crate::verdict::VerdictRca;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Owns the capability handles and the built agent graph.
pub struct PactsRuntime {
    caps: RunCapabilities,
    graph: AgentGraph,
}

impl PactsRuntime {
    /// Build a runtime over a driver and durable store.
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        store: Arc<SqliteStore>,
        config: RuntimeConfig,
    ) -> Self {
        Self::with_events(driver, store, config, EventSink::new())
    }

    /// Build a runtime that forwards run events into a channel sink.
    pub fn with_events(
        driver: Arc<dyn BrowserDriver>,
        store: Arc<SqliteStore>,
        config: RuntimeConfig,
        events: EventSink,
    ) -> Self {
        let config = Arc::new(config);
        let cache = Arc::new(SelectorCache::new(
            store.clone(),
            config.fast_tier_ttl_minutes,
            config.cache_revalidate_days,
        ));
        let ledger = Arc::new(HealLedger::new(store.clone()));

        let caps = RunCapabilities {
            driver,
            cache,
            ledger,
            store,
            config: config.clone(),
            events,
        };

        let graph = AgentGraph::new(
            vec![
                Box::new(PlannerAgent::new()),
                Box::new(PomBuilder::new()),
                Box::new(Executor::new()),
                Box::new(OracleHealer::new()),
                Box::new(VerdictRca::new()),
                Box::new(Generator::new()),
            ],
            config.max_heal_rounds,
        );

        Self { caps, graph }
    }

    /// The capability bundle (tests and the observability facade read
    /// stores through this).
    pub fn capabilities(&self) -> &RunCapabilities {
        &self.caps
    }

    /// Capture cookies + local storage into the configured storage-state
    /// path. Called after an interactive login, which itself lives
    /// outside this crate.
    pub async fn save_auth_state(&self) -> crate::error::Result<()> {
        let path = self
            .caps
            .config
            .resolved_storage_state_path()
            .ok_or_else(|| crate::error::Error::Config("no storage_state_path configured".to_string()))?;
        let blob = self.caps.driver.save_storage_state().await?;
        std::fs::write(&path, serde_json::to_string_pretty(&blob)?)
            .map_err(|e| crate::error::Error::storage(format!("auth state write failed: {}", e)))?;
        Ok(())
    }

    /// Run one bound plan against a URL.
    pub async fn run_plan(
        &self,
        req_id: impl Into<String>,
        url: &str,
        intents: Vec<Intent>,
        unresolved_tokens: Vec<String>,
    ) -> RunState {
        let req_id = req_id.into();
        let mut state = RunState::new(&req_id);
        state.set_context("url", url);
        state.set_context(
            "bound_steps",
            serde_json::to_value(&intents).unwrap_or(Value::Null),
        );
        if !unresolved_tokens.is_empty() {
            state.set_context("unresolved_tokens", serde_json::json!(unresolved_tokens));
        }
        self.drive(state).await
    }

    /// Run legacy newline-separated `"element | action | value"` steps.
    pub async fn run_legacy(&self, req_id: impl Into<String>, url: &str, raw: &str) -> RunState {
        let mut state = RunState::new(req_id.into());
        state.set_context("url", url);
        state.set_context("raw_steps", raw);
        self.drive(state).await
    }

    /// Expand a suite and run each testcase x data-row plan independently.
    pub async fn run_suite(&self, suite: &Suite, url: &str) -> Vec<RunState> {
        let mut results = Vec::new();
        for (plan, unresolved) in expand_suite(suite, &self.caps.config) {
            let req_id = format!("{}-{}", plan.id, Uuid::new_v4().simple());
            results.push(self.run_plan(req_id, url, plan.intents, unresolved).await);
        }
        results
    }

    async fn drive(&self, mut state: RunState) -> RunState {
        let started_at = Utc::now();
        let started_clock = Instant::now();

        if let Err(e) = self.caps.store.start_run(&state.req_id, started_at, "") {
            tracing::warn!(error = %e, "run record open dropped");
        }

        self.graph.run(&mut state, &self.caps).await;

        self.persist(&state, started_clock);
        state
    }

    /// Persist the run record and step rows. Secrets are masked here,
    /// at the boundary; storage failures degrade to logs.
    fn persist(&self, state: &RunState, started_clock: Instant) {
        for (idx, step) in state.executed_steps.iter().enumerate() {
            let row = RunStepRow {
                run_id: state.req_id.clone(),
                idx,
                intent: redact::persistable_intent(&step.intent).to_string(),
                selector: Some(step.selector.clone()),
                strategy: step.strategy.map(|s| s.as_str().to_string()),
                outcome: Some(step.outcome.clone()),
                ms: Some(step.ms),
            };
            if let Err(e) = self.caps.store.insert_run_step(&row) {
                tracing::warn!(error = %e, idx, "run step row dropped");
            }
        }

        let verdict = state.verdict.unwrap_or(Verdict::Error);
        let rca_class = state.rca.as_ref().map(|r| r.class.to_string());
        // heal_round is a per-step counter; the run record keeps the
        // cumulative cycle count instead.
        if let Err(e) = self.caps.store.finish_run(
            &state.req_id,
            Utc::now(),
            &verdict.to_string(),
            rca_class.as_deref(),
            state.rca.as_ref().map(|r| r.confidence),
            state.heal_events.len() as u32,
            &state.plan_hash,
            started_clock.elapsed().as_millis() as u64,
        ) {
            tracing::warn!(error = %e, "run record close dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{
        ActionKind, Effect, FakeBrowser, FakeElement, FakePage, Rule,
    };
    use crate::config::RuntimeConfigBuilder;
    use crate::discovery::Strategy;
    use crate::memory::CacheKey;
    use crate::plan::{Action, StepSpec, TestCase};
    use crate::profile::RuntimeProfile;
    use crate::state::{RcaClass, StepFailure};
    use pretty_assertions::assert_eq;

    fn runtime(browser: FakeBrowser, config: RuntimeConfig) -> PactsRuntime {
        PactsRuntime::new(
            Arc::new(browser),
            Arc::new(SqliteStore::in_memory().unwrap()),
            config,
        )
    }

    fn fast_config() -> RuntimeConfig {
        RuntimeConfigBuilder::new().bbox_sample_interval_ms(5).build()
    }

    fn suite(steps: Vec<StepSpec>) -> Suite {
        Suite {
            testcases: vec![TestCase {
                id: "tc".to_string(),
                steps,
                outcomes: vec![],
                data: vec![],
            }],
        }
    }

    fn step(target: &str, action: Action, value: Option<&str>, outcome: Option<&str>) -> StepSpec {
        StepSpec {
            target: target.to_string(),
            action,
            value: value.map(str::to_string),
            outcome: outcome.map(str::to_string),
        }
    }

    // ---- Scenario: static search with autocomplete bypass ----

    fn wikipedia() -> FakeBrowser {
        let home = FakePage::new("https://en.wikipedia.org")
            .html("<html><body>plain</body></html>")
            .element(
                FakeElement::new("input")
                    .attr("aria-label", "Search Wikipedia")
                    .id("searchInput"),
            )
            .element(FakeElement::new("ul").role("listbox").text("suggestions"))
            .element(FakeElement::new("button").id("searchButton").text("Search"));
        let results = FakePage::new("https://en.wikipedia.org/wiki/Artificial_intelligence")
            .page_text("Artificial intelligence is the topic of this article");
        FakeBrowser::new().page(home).page(results).rule(
            Rule::on_click("searchButton").effect(Effect::NavigateTo(
                "https://en.wikipedia.org/wiki/Artificial_intelligence".to_string(),
            )),
        )
    }

    #[tokio::test]
    async fn test_static_search_passes_with_bypass() {
        let rt = runtime(wikipedia(), fast_config());
        let results = rt
            .run_suite(
                &suite(vec![
                    step("Search Wikipedia", Action::Fill, Some("Artificial Intelligence"), None),
                    step(
                        "Search Wikipedia",
                        Action::Press,
                        Some("Enter"),
                        Some("page_contains_text:Artificial intelligence"),
                    ),
                ]),
                "https://en.wikipedia.org",
            )
            .await;

        assert_eq!(results.len(), 1);
        let run = &results[0];
        assert_eq!(run.verdict, Some(Verdict::Pass));
        assert_eq!(run.executed_steps.len(), 2);
        assert_eq!(run.profile(), RuntimeProfile::Static);
        // The press went through the autocomplete bypass ladder.
        assert_eq!(run.executed_steps[1].pattern.as_deref(), Some("submit_hint"));
        assert!(run.check_invariants(3).is_ok());

        // Run record persisted with step rows and an artifact.
        let caps = rt.capabilities();
        let runs = caps.store.recent_runs(5).unwrap();
        assert_eq!(runs[0].verdict.as_deref(), Some("pass"));
        assert_eq!(caps.store.run_steps_for(&run.req_id).unwrap().len(), 2);
        assert_eq!(caps.store.artifact_count(&run.req_id).unwrap(), 1);
        assert!(run.context.contains_key("artifact_source"));
    }

    #[tokio::test]
    async fn test_warm_cache_second_run_is_idempotent() {
        let rt = runtime(wikipedia(), fast_config());
        let steps = vec![
            step("Search Wikipedia", Action::Fill, Some("AI"), None),
            step("Search Wikipedia", Action::Press, Some("Enter"), None),
        ];

        let first = rt.run_suite(&suite(steps.clone()), "https://en.wikipedia.org").await;
        let second = rt.run_suite(&suite(steps), "https://en.wikipedia.org").await;

        assert_eq!(first[0].executed_steps.len(), second[0].executed_steps.len());
        // Re-planning is deterministic
        assert_eq!(first[0].plan_hash, second[0].plan_hash);
        // Every selector on the warm run came from the cache
        for record in second[0].discovered.iter().flatten() {
            assert!(record.meta.from_cache);
        }
    }

    // ---- Scenario: ordinal selection on a results page ----

    fn youtube() -> FakeBrowser {
        let home = FakePage::new("https://www.youtube.com")
            .element(FakeElement::new("input").attr("aria-label", "Search").id("search"));
        let results = FakePage::new("https://www.youtube.com/results")
            .element(FakeElement::new("a").attr("href", "/watch?v=1").text("Tutorial one"))
            .element(FakeElement::new("a").attr("href", "/watch?v=2").text("Tutorial two"))
            .element(FakeElement::new("a").attr("href", "/watch?v=3").text("Tutorial three"));
        let watch = FakePage::new("https://www.youtube.com/watch?v=1").page_text("Now playing");
        FakeBrowser::new()
            .page(home)
            .page(results)
            .page(watch)
            .rule(Rule::on_key("search", "Enter").effect(Effect::NavigateTo(
                "https://www.youtube.com/results".to_string(),
            )))
            .rule(Rule::on_click("Tutorial one").effect(Effect::NavigateTo(
                "https://www.youtube.com/watch?v=1".to_string(),
            )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordinal_selection_never_cached() {
        let rt = runtime(youtube(), fast_config());
        let results = rt
            .run_suite(
                &suite(vec![
                    step("Search", Action::Fill, Some("Playwright automation tutorial"), None),
                    step("Search", Action::Press, Some("Enter"), None),
                    step("first video result", Action::Click, None, Some("navigates_to:watch")),
                ]),
                "https://www.youtube.com",
            )
            .await;

        let run = &results[0];
        assert_eq!(run.verdict, Some(Verdict::Pass));
        assert_eq!(run.profile(), RuntimeProfile::Dynamic);
        // navigates_to expanded a synthetic assertion step
        assert_eq!(run.plan.len(), 4);
        assert_eq!(run.executed_steps.len(), 4);

        let ordinal_record = run.discovered[2].as_ref().unwrap();
        assert!(ordinal_record.selector.starts_with("role=link"));
        assert!(ordinal_record.selector.ends_with("nth=0"));
        assert_eq!(ordinal_record.strategy, Strategy::Ordinal);
        assert!(!ordinal_record.stable);

        // Position-dependent selectors are never admitted to the cache.
        let key = CacheKey::new("https://www.youtube.com", "first video result", Action::Click);
        assert!(rt.capabilities().store.get_entry(&key).unwrap().is_none());
    }

    // ---- Scenario: dynamic app, modal scope, cold cache ----

    fn lightning_app() -> FakeBrowser {
        let fields = ["Account Name", "Account Number", "Phone", "Industry"];
        let mut modal_elements: Vec<FakeElement> = fields
            .iter()
            .map(|label| FakeElement::new("input").attr("aria-label", *label))
            .collect();
        modal_elements.push(
            FakeElement::new("button")
                .attr("aria-label", "Save")
                .text("Save"),
        );

        let home = FakePage::new("https://org.lightning.force.com/one")
            .html("<html><body>aura:dependency</body></html>")
            .element(FakeElement::new("button").attr("aria-label", "App Launcher"));
        let detail = FakePage::new("https://org.lightning.force.com/one/AccountDetail")
            .page_text("AccountDetail");

        FakeBrowser::new()
            .page(home)
            .page(detail)
            .rule(
                Rule::on_click("App Launcher")
                    .effect(Effect::AppendElements {
                        parent_selector: None,
                        elements: vec![FakeElement::new("div")
                            .role("dialog")
                            .attr("aria-label", "App Launcher")
                            .id("modal")],
                    })
                    .effect(Effect::AppendElements {
                        parent_selector: Some("#modal".to_string()),
                        elements: modal_elements,
                    })
                    .once(),
            )
            .rule(Rule::on_click("Save").effect(Effect::NavigateTo(
                "https://org.lightning.force.com/one/AccountDetail".to_string(),
            )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_dynamic_modal_cold_run_acquires_cache() {
        let dir = tempfile::tempdir().unwrap();
        let auth_path = dir.path().join("auth.json");
        std::fs::write(&auth_path, r#"{"cookies": [], "local_storage": {"sid": "abc"}}"#)
            .unwrap();

        let config = RuntimeConfigBuilder::new()
            .bbox_sample_interval_ms(5)
            .storage_state_path(auth_path.to_string_lossy())
            .build();
        let rt = runtime(lightning_app(), config);

        let started = tokio::time::Instant::now();
        let results = rt
            .run_suite(
                &suite(vec![
                    step("App Launcher", Action::Click, None, None),
                    step("Account Name", Action::Fill, Some("Acme"), None),
                    step("Account Number", Action::Fill, Some("42"), None),
                    step("Phone", Action::Fill, Some("555-0100"), None),
                    step("Industry", Action::Fill, Some("Technology"), None),
                    step("Save", Action::Click, None, Some("navigates_to:AccountDetail")),
                ]),
                "https://org.lightning.force.com/one",
            )
            .await;

        let run = &results[0];
        assert_eq!(run.verdict, Some(Verdict::Pass));
        assert_eq!(run.profile(), RuntimeProfile::Dynamic);
        assert!(run.context_flag("storage_state_loaded"));
        // Dynamic settle delay observed at least once
        assert!(started.elapsed() >= std::time::Duration::from_millis(1500));

        // Modal fields were discovered inside the dialog scope.
        let account_name = run.discovered[1].as_ref().unwrap();
        assert!(account_name.meta.scope.is_some());

        // Cold run acquired stable entries; admission rejects volatile ones.
        let cached = rt.capabilities().store.cached_entry_count().unwrap();
        assert!(cached >= 4, "expected >= 4 stable entries, got {}", cached);
    }

    // ---- Scenario: healing a renamed selector through the ledger ----

    #[tokio::test]
    async fn test_healing_drift_replaces_cache_entry() {
        let browser = FakeBrowser::new().page(
            FakePage::new("https://site.test/form")
                .element(
                    FakeElement::new("input")
                        .id("input-373")
                        .attr("name", "account-name"),
                ),
        );
        let rt = runtime(browser, fast_config());
        let caps = rt.capabilities();

        // Pre-seed a stale entry: the id was renamed between releases.
        let key = CacheKey::new("https://site.test/form", "account name", Action::Fill);
        let stale = crate::discovery::SelectorRecord::new("#input-339", Strategy::LabelFor, 0.86);
        caps.cache.admit(&key, &stale, Some("deadbeef")).await.unwrap();

        let results = rt
            .run_suite(
                &suite(vec![step("Account Name", Action::Fill, Some("Acme"), None)]),
                "https://site.test/form",
            )
            .await;

        let run = &results[0];
        assert_eq!(run.verdict, Some(Verdict::Healed));
        assert_eq!(run.heal_events.len(), 1);
        assert!(run.heal_events[0].success);
        assert_eq!(run.heal_events[0].strategy, Some(Strategy::NameAttr));
        assert_eq!(run.executed_steps.len(), 1);
        assert!(run.check_invariants(3).is_ok());

        // The cache entry was replaced with the healed selector.
        let entry = caps.store.get_entry(&key).unwrap().unwrap();
        assert_eq!(entry.selector, "[name=\"account-name\"]");
        assert_eq!(entry.strategy, Strategy::NameAttr);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heal_budget_resets_between_steps() {
        let browser = FakeBrowser::new().page(
            FakePage::new("https://site.test/form")
                .element(FakeElement::new("input").attr("name", "first-field"))
                .element(FakeElement::new("input").attr("name", "second-field")),
        );
        // One heal round per step: enough for each stale selector on its
        // own, but only if a completed step hands the budget back.
        let config = RuntimeConfigBuilder::new()
            .bbox_sample_interval_ms(5)
            .max_heal_rounds(1)
            .build();
        let rt = runtime(browser, config);
        let caps = rt.capabilities();

        for (name, selector) in [("first field", "#old-1"), ("second field", "#old-2")] {
            let key = CacheKey::new("https://site.test/form", name, Action::Fill);
            let stale =
                crate::discovery::SelectorRecord::new(selector, Strategy::LabelFor, 0.86);
            caps.cache.admit(&key, &stale, Some("deadbeef")).await.unwrap();
        }

        let results = rt
            .run_suite(
                &suite(vec![
                    step("first field", Action::Fill, Some("a"), None),
                    step("second field", Action::Fill, Some("b"), None),
                ]),
                "https://site.test/form",
            )
            .await;

        let run = &results[0];
        assert_eq!(run.verdict, Some(Verdict::Healed));
        assert_eq!(run.executed_steps.len(), 2);
        assert_eq!(run.heal_events.len(), 2);
        assert!(run.heal_events.iter().all(|e| e.success));
        // Each success handed the full budget to the next step.
        assert_eq!(run.heal_round, 0);

        // The run record keeps the cumulative cycle count.
        let rows = caps.store.recent_runs(1).unwrap();
        assert_eq!(rows[0].heal_rounds, 2);
    }

    // ---- Scenario: dialog sentinel blocks a validation error ----

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_blocked_run_fails_ui_blocked() {
        let browser = FakeBrowser::new()
            .page(
                FakePage::new("https://site.test/form")
                    .element(FakeElement::new("button").attr("aria-label", "Save").text("Save")),
            )
            .rule(
                Rule::on_click("Save")
                    .effect(Effect::AppendElements {
                        parent_selector: None,
                        elements: vec![FakeElement::new("div").role("dialog").id("err")],
                    })
                    .effect(Effect::AppendElements {
                        parent_selector: Some("#err".to_string()),
                        elements: vec![
                            FakeElement::new("div").text("Account Name is required")
                        ],
                    }),
            )
            .rule(
                Rule::on_page_key("Escape").effect(Effect::RemoveElements("#err".to_string())),
            );

        let config = RuntimeConfigBuilder::new()
            .bbox_sample_interval_ms(5)
            .sentinel(true)
            .build();
        let rt = runtime(browser, config);

        let results = rt
            .run_suite(
                &suite(vec![step("Save", Action::Click, None, None)]),
                "https://site.test/form",
            )
            .await;

        let run = &results[0];
        assert_eq!(run.verdict, Some(Verdict::Fail));
        assert_eq!(run.rca.as_ref().unwrap().class, RcaClass::UiBlocked);
        assert_eq!(run.heal_round, rt.capabilities().config.max_heal_rounds);
        assert!(run.context_flag("sentinel_fired"));
        assert!(run.executed_steps.is_empty());
    }

    // ---- Scenario: bounded healing exhaustion ----

    #[tokio::test]
    async fn test_bounded_healing_exhausts_at_budget() {
        let browser = FakeBrowser::new().page(
            FakePage::new("https://site.test/app")
                .element(FakeElement::new("button").attr("aria-label", "alpha"))
                .element(FakeElement::new("button").attr("aria-label", "gamma")),
        );
        let rt = runtime(browser, fast_config());

        let results = rt
            .run_suite(
                &suite(vec![
                    step("alpha", Action::Click, None, None),
                    step("missing thing", Action::Click, None, None),
                    step("gamma", Action::Click, None, None),
                ]),
                "https://site.test/app",
            )
            .await;

        let run = &results[0];
        assert_eq!(run.verdict, Some(Verdict::Fail));
        assert_eq!(run.rca.as_ref().unwrap().class, RcaClass::DiscoveryExhausted);
        assert_eq!(run.heal_round, 3);
        assert_eq!(run.heal_events.len(), 3);
        assert!(run.heal_events.iter().all(|e| !e.success));
        assert_eq!(run.executed_steps.len(), 1);
        assert_eq!(run.failure, Some(StepFailure::DiscoveryMissing));
    }

    // ---- Boundary behaviors ----

    #[tokio::test]
    async fn test_empty_plan_is_error_without_navigation() {
        let browser = wikipedia();
        let probe = browser.clone();
        let rt = runtime(browser, fast_config());

        let run = rt
            .run_plan("req-empty", "https://en.wikipedia.org", vec![], vec![])
            .await;
        assert_eq!(run.verdict, Some(Verdict::Error));
        assert_eq!(probe.nav_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_heal_budget_fails_immediately() {
        let browser = FakeBrowser::new().page(FakePage::new("https://site.test/app"));
        let config = RuntimeConfigBuilder::new()
            .bbox_sample_interval_ms(5)
            .max_heal_rounds(0)
            .build();
        let rt = runtime(browser, config);

        let results = rt
            .run_suite(
                &suite(vec![step("missing", Action::Click, None, None)]),
                "https://site.test/app",
            )
            .await;

        let run = &results[0];
        assert_eq!(run.verdict, Some(Verdict::Fail));
        assert_eq!(run.heal_round, 0);
        assert!(run.heal_events.is_empty());
        assert!(run.executed_steps.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_token_runs_and_classifies_data_issue() {
        let browser = FakeBrowser::new().page(FakePage::new("https://site.test/app"));
        let rt = runtime(browser, fast_config());

        let mut s = suite(vec![step("Search", Action::Fill, Some("{{missing}}"), None)]);
        s.testcases[0].data = vec![std::collections::HashMap::new()];

        let results = rt.run_suite(&s, "https://site.test/app").await;
        let run = &results[0];
        // No element on the page: the run fails and the unresolved token
        // is the attributed cause.
        assert_eq!(run.verdict, Some(Verdict::Fail));
        assert_eq!(run.rca.as_ref().unwrap().class, RcaClass::DataIssue);
    }

    #[tokio::test]
    async fn test_legacy_line_input_runs() {
        let rt = runtime(wikipedia(), fast_config());
        let run = rt
            .run_legacy(
                "req-legacy",
                "https://en.wikipedia.org",
                "Search Wikipedia | fill | Artificial Intelligence\nSearch Wikipedia | press | Enter",
            )
            .await;

        assert_eq!(run.verdict, Some(Verdict::Pass));
        assert_eq!(run.executed_steps.len(), 2);
    }

    #[tokio::test]
    async fn test_save_auth_state_writes_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let auth_path = dir.path().join("auth.json");

        let browser = FakeBrowser::new().page(FakePage::new("u"));
        browser
            .load_storage_state(&serde_json::json!({
                "cookies": [],
                "local_storage": { "sid": "tok" }
            }))
            .await
            .unwrap();

        let config = RuntimeConfigBuilder::new()
            .storage_state_path(auth_path.to_string_lossy())
            .build();
        let rt = runtime(browser, config);

        rt.save_auth_state().await.unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&auth_path).unwrap()).unwrap();
        assert_eq!(saved["local_storage"]["sid"], "tok");
    }

    #[tokio::test]
    async fn test_secret_values_redacted_in_run_steps() {
        let browser = FakeBrowser::new().page(
            FakePage::new("https://site.test/login")
                .element(FakeElement::new("input").attr("aria-label", "Password field")),
        );
        let rt = runtime(browser, fast_config());

        let mut s = suite(vec![step("Password field", Action::Fill, Some("{{password}}"), None)]);
        s.testcases[0].data = vec![[("password".to_string(), "hunter2".to_string())]
            .into_iter()
            .collect()];

        let results = rt.run_suite(&s, "https://site.test/login").await;
        let run = &results[0];
        assert_eq!(run.verdict, Some(Verdict::Pass));

        let rows = rt.capabilities().store.run_steps_for(&run.req_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].intent.contains("hunter2"));
        assert!(rows[0].intent.contains("***"));
    }
}
