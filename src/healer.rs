//! The OracleHealer agent: bounded reveal -> reprobe -> stabilize cycles.

use crate::discovery::{DiscoveryEngine, DiscoveryOptions, Strategy};
use crate::gate::{self, DialogSentinel, GateResult};
use crate::graph::{Agent, NodeTag, RunCapabilities};
use crate::memory::{drift, normalize_url_pattern, CacheKey};
use crate::state::{HealEvent, RunState, StepFailure};
use crate::telemetry::{RunEvent, RunEventType};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

/// Attempts one healing cycle per invocation; the router re-enters while
/// budget remains and the step is still failing.
pub struct OracleHealer {
    engine: DiscoveryEngine,
}

impl OracleHealer {
    pub fn new() -> Self {
        Self {
            engine: DiscoveryEngine::new(),
        }
    }

    /// Strategies already spent on this run, from the heal log plus the
    /// currently failing record.
    fn spent_strategies(state: &RunState) -> HashSet<Strategy> {
        let mut spent: HashSet<Strategy> = state
            .heal_events
            .iter()
            .filter(|e| !e.success)
            .filter_map(|e| e.strategy)
            .collect();
        if let Some(record) = state.current_record() {
            spent.insert(record.strategy);
        }
        spent
    }
}

impl Default for OracleHealer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for OracleHealer {
    fn tag(&self) -> NodeTag {
        NodeTag::OracleHealer
    }

    async fn run(&self, state: &mut RunState, caps: &RunCapabilities) {
        let failure = match state.failure {
            Some(f) => f,
            None => return,
        };
        if state.verdict.is_some() {
            return;
        }
        let config = &*caps.config;
        if state.heal_round >= config.max_heal_rounds {
            return;
        }

        // A repeated field_populated verification failure is terminal.
        if failure == StepFailure::AssertionFail && state.context_flag("assertion_terminal") {
            state.heal_events.push(HealEvent {
                round: state.heal_round + 1,
                selector_before: state.current_record().map(|r| r.selector.clone()),
                selector_after: None,
                strategy: None,
                success: false,
                reason: "verification failure is terminal after one heal".to_string(),
            });
            state.heal_round = config.max_heal_rounds;
            return;
        }

        let driver = &*caps.driver;
        let round = state.heal_round + 1;
        let idx = state.step_idx;
        let intent = match state.plan.get(idx) {
            Some(i) => i.clone(),
            None => return,
        };
        let selector_before = state.current_record().map(|r| r.selector.clone());
        let prior_scope = state
            .current_record()
            .and_then(|r| r.meta.scope.clone());

        caps.events.emit(RunEvent::new(
            RunEventType::Heal,
            &state.req_id,
            idx,
            format!("round {} for {:?} after {}", round, intent.element_name, failure),
        ));

        // 1. Reveal: scroll the last-known locator back in, dismiss
        // overlays, let the network settle.
        if let Some(selector) = &selector_before {
            let _ = driver.scroll_into_view(selector).await;
        }
        let _ = driver.press_page_key("Escape").await;
        if config.sentinel_enabled {
            let sentinel = DialogSentinel::from_config(config);
            if let Ok(Some(_)) = sentinel.check_and_close(driver).await {
                state.set_context("sentinel_fired", true);
            }
        }
        let _ = driver.wait_network_idle(Duration::from_secs(1)).await;

        // 2. Reprobe: walk the tiers in ledger-biased order, skipping
        // strategies already spent; widen only from the second round on.
        let url = state.url().unwrap_or_default().to_string();
        let pattern = normalize_url_pattern(&url);
        let order = caps
            .ledger
            .biased_waterfall(&pattern, &intent.element_name_lower());
        let skip = Self::spent_strategies(state);
        let widen = round >= 2;
        let opts = DiscoveryOptions::healing(order, skip, widen);

        let candidate = match self
            .engine
            .discover(driver, &intent, prior_scope.as_deref(), &opts)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "healer reprobe errored");
                None
            }
        };

        let mut record = match candidate {
            Some(r) => r,
            None => {
                state.heal_round = round;
                state.heal_events.push(HealEvent {
                    round,
                    selector_before,
                    selector_after: None,
                    strategy: None,
                    success: false,
                    reason: "reprobe found no candidate".to_string(),
                });
                caps.events.emit(RunEvent::new(
                    RunEventType::Heal,
                    &state.req_id,
                    idx,
                    format!("round {} found no candidate", round),
                ));
                return;
            }
        };
        record.meta.scope = if widen { None } else { prior_scope.clone() };

        // 3. Stabilize: re-gate with doubled timeouts.
        let profile = state.profile();
        let _ = gate::element_ready(
            driver,
            &record.selector,
            profile.budgets().element_ready * 2,
        )
        .await;
        let stabilized = gate::actionability(
            driver,
            &record.selector,
            record.meta.scope.as_deref(),
            intent.action,
            Duration::from_millis(config.bbox_sample_interval_ms * 2),
        )
        .await;

        let success = matches!(stabilized, Ok(GateResult::Pass(_)));
        if let Err(e) = caps.ledger.record_outcome(
            &pattern,
            &intent.element_name_lower(),
            record.strategy,
            success,
        ) {
            tracing::debug!(error = %e, "ledger outcome dropped");
        }

        state.heal_round = round;
        if success {
            // Replace the cache entry alongside the run-state record.
            if record.stable && record.meta.ordinal.is_none() {
                let key = CacheKey::new(&url, &intent.element_name, intent.action);
                let hits = driver.query(&record.selector, None).await.unwrap_or_default();
                let dom_hash = hits.first().map(drift::fingerprint);
                if let Err(e) = caps.cache.admit(&key, &record, dom_hash.as_deref()).await {
                    tracing::debug!(error = %e, "healed selector not cached");
                }
            }

            state.heal_events.push(HealEvent {
                round,
                selector_before,
                selector_after: Some(record.selector.clone()),
                strategy: Some(record.strategy),
                success: true,
                reason: format!("reprobe via {} stabilized", record.strategy),
            });
            caps.events.emit(
                RunEvent::new(
                    RunEventType::Heal,
                    &state.req_id,
                    idx,
                    format!("round {} committed {}", round, record.selector),
                )
                .with_strategy(record.strategy.as_str()),
            );
            state.replace_current_record(record);
            state.failure = None;
        } else {
            state.heal_events.push(HealEvent {
                round,
                selector_before,
                selector_after: Some(record.selector.clone()),
                strategy: Some(record.strategy),
                success: false,
                reason: "candidate failed stabilization".to_string(),
            });
            caps.events.emit(RunEvent::new(
                RunEventType::Heal,
                &state.req_id,
                idx,
                format!("round {} failed stabilization", round),
            ));
        }
    }
}
