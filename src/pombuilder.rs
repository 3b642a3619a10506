//! The POMBuilder agent: one navigation per run, then cache-first
//! discovery for every intent.

use crate::browser::BrowserDriver;
use crate::discovery::{scope, DiscoveryEngine, DiscoveryOptions, SelectorRecord, Strategy};
use crate::gate::{self, GateResult};
use crate::graph::{Agent, NodeTag, RunCapabilities};
use crate::memory::{drift, CacheKey};
use crate::plan::Intent;
use crate::profile::ProfileDetector;
use crate::state::{Rca, RcaClass, RunState, Verdict};
use crate::telemetry::{RunEvent, RunEventType};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

/// Discovers a selector record for each intent, navigating the browser to
/// the target URL exactly once per run.
pub struct PomBuilder {
    engine: DiscoveryEngine,
    detector: ProfileDetector,
}

impl PomBuilder {
    pub fn new() -> Self {
        Self {
            engine: DiscoveryEngine::new(),
            detector: ProfileDetector::new(),
        }
    }

    /// Navigate and classify the page; false means the run cannot proceed.
    async fn prepare_page(&self, state: &mut RunState, caps: &RunCapabilities) -> bool {
        let driver = &*caps.driver;
        let config = &*caps.config;

        let url = match state.url().map(str::to_string) {
            Some(u) => u,
            None => {
                state.verdict = Some(Verdict::Error);
                state.rca = Some(Rca {
                    class: RcaClass::DataIssue,
                    confidence: 1.0,
                    notes: "no target URL in run context".to_string(),
                });
                return false;
            }
        };

        let already_there = driver
            .current_url()
            .await
            .map(|u| u == url)
            .unwrap_or(false);

        if !already_there {
            for script in &config.fingerprint_scripts {
                if let Err(e) = driver.install_init_script(script).await {
                    tracing::debug!(error = %e, "init script install failed");
                }
            }

            if let Some(path) = config.resolved_storage_state_path() {
                match std::fs::read_to_string(&path) {
                    Ok(raw) => match serde_json::from_str(&raw) {
                        Ok(blob) => {
                            if let Err(e) = driver.load_storage_state(&blob).await {
                                tracing::warn!(error = %e, "storage state load failed");
                            } else {
                                state.set_context("storage_state_loaded", true);
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, path, "storage state unparseable"),
                    },
                    Err(e) => tracing::debug!(error = %e, path, "no storage state on disk"),
                }
            }

            let mut navigated = driver.navigate(&url).await;
            if navigated.is_err() {
                // One retry on a driver hiccup before giving up the run.
                navigated = driver.navigate(&url).await;
            }
            if let Err(e) = navigated {
                state.verdict = Some(Verdict::Error);
                state.rca = Some(Rca {
                    class: RcaClass::EnvFault,
                    confidence: 0.95,
                    notes: format!("browser navigation failed: {}", e),
                });
                return false;
            }
        }

        let html = driver.page_html().await.unwrap_or_default();
        let profile = self
            .detector
            .detect(&url, &html, config.profile_override);
        state.set_profile(profile);
        caps.events.emit(RunEvent::new(
            RunEventType::Profile,
            &state.req_id,
            0,
            format!("classified {} as {}", url, profile),
        ));

        if let Err(e) = gate::page_ready(driver, profile, config.app_ready_hook.as_deref()).await {
            tracing::warn!(error = %e, "initial page readiness degraded");
        }
        caps.events.emit(RunEvent::new(
            RunEventType::Readiness,
            &state.req_id,
            0,
            format!("page ready under {} budgets", profile),
        ));
        true
    }

    /// Cache lookup with drift check. Returns a usable record, or None
    /// after invalidating a stale entry.
    async fn from_cache(
        &self,
        state: &mut RunState,
        caps: &RunCapabilities,
        intent: &Intent,
        key: &CacheKey,
        scope_selector: Option<&str>,
        idx: usize,
    ) -> Option<SelectorRecord> {
        let driver = &*caps.driver;
        let entry = caps.cache.lookup(key).await.ok().flatten()?;
        let profile = state.profile();

        let snapshots = driver.query(&entry.selector, None).await.unwrap_or_default();
        let drifted = match (snapshots.len(), entry.dom_hash_snapshot.as_deref()) {
            (1, Some(stored)) => {
                let current = drift::fingerprint(&snapshots[0]);
                drift::is_drifted(stored, &current, profile)
            }
            (1, None) => caps.cache.needs_revalidation(&entry),
            // A selector that no longer resolves uniquely has no
            // fingerprint to compare; the gate diagnoses it and the
            // healer replaces it.
            _ => false,
        };

        if drifted {
            let _ = caps.cache.invalidate(key).await;
            state.set_context("drift_detected", true);
            caps.events.emit(RunEvent::new(
                RunEventType::Cache,
                &state.req_id,
                idx,
                format!("drift detected for {:?}, entry invalidated", intent.element_name),
            ));
            return None;
        }

        caps.events.emit(
            RunEvent::new(
                RunEventType::Cache,
                &state.req_id,
                idx,
                format!("cache hit for {:?}", intent.element_name),
            )
            .with_strategy(entry.strategy.as_str()),
        );

        let mut record =
            SelectorRecord::new(entry.selector.clone(), entry.strategy, entry.score).from_cache();
        record.meta.dom_hash_prefix = entry
            .dom_hash_snapshot
            .as_deref()
            .map(|h| h.chars().take(12).collect())
            .unwrap_or_default();
        record.meta.scope = scope_selector.map(str::to_string);
        Some(record)
    }

    /// Walk the tiers until a candidate passes the actionability gate.
    async fn discover_gated(
        &self,
        caps: &RunCapabilities,
        intent: &Intent,
        scope_selector: Option<&str>,
    ) -> Option<SelectorRecord> {
        let driver = &*caps.driver;
        let config = &*caps.config;
        let mut skip: HashSet<Strategy> = HashSet::new();
        let mut ordinal_spent = false;

        loop {
            let opts = DiscoveryOptions {
                skip: skip.clone(),
                relax_ordinal: ordinal_spent,
                ..DiscoveryOptions::standard()
            };
            let mut record = match self
                .engine
                .discover(driver, intent, scope_selector, &opts)
                .await
            {
                Ok(Some(r)) => r,
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "discovery errored");
                    return None;
                }
            };
            record.meta.scope = scope_selector.map(str::to_string);

            let gate_result = gate::actionability(
                driver,
                &record.selector,
                scope_selector,
                intent.action,
                Duration::from_millis(config.bbox_sample_interval_ms),
            )
            .await;

            match gate_result {
                Ok(GateResult::Pass(_)) => return Some(record),
                Ok(GateResult::Fail(failure)) => {
                    tracing::debug!(
                        selector = %record.selector,
                        %failure,
                        "candidate failed the gate, walking on"
                    );
                    if record.strategy == Strategy::Ordinal {
                        ordinal_spent = true;
                    } else {
                        skip.insert(record.strategy);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "gate errored during discovery");
                    return Some(record);
                }
            }
        }
    }
}

impl Default for PomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for PomBuilder {
    fn tag(&self) -> NodeTag {
        NodeTag::PomBuilder
    }

    async fn run(&self, state: &mut RunState, caps: &RunCapabilities) {
        if state.verdict.is_some() {
            return;
        }
        if !self.prepare_page(state, caps).await {
            return;
        }

        if state.discovered.len() != state.intents.len() {
            state.discovered = vec![None; state.intents.len()];
        }

        let url = state.url().unwrap_or_default().to_string();
        let intents = state.intents.clone();
        let mut last: Option<(String, SelectorRecord)> = None;

        for (idx, intent) in intents.iter().enumerate() {
            // Consecutive same-name intents reuse the last record.
            if intent.ordinal.is_none() {
                if let Some((name, record)) = &last {
                    if *name == intent.element_name_lower() {
                        state.discovered[idx] = Some(record.clone());
                        continue;
                    }
                }
            }

            let scope_selector = match &intent.scope_hint {
                Some(hint) => scope::resolve(&*caps.driver, hint).await.ok().flatten(),
                None => None,
            };

            let key = CacheKey::new(&url, &intent.element_name, intent.action);
            let mut record = if intent.ordinal.is_none() {
                self.from_cache(state, caps, intent, &key, scope_selector.as_deref(), idx)
                    .await
            } else {
                None
            };

            if record.is_none() {
                record = self
                    .discover_gated(caps, intent, scope_selector.as_deref())
                    .await;

                if let Some(r) = &record {
                    if r.stable && r.meta.ordinal.is_none() {
                        let hits = caps
                            .driver
                            .query(&r.selector, None)
                            .await
                            .unwrap_or_default();
                        let dom_hash = hits.first().map(drift::fingerprint);
                        match caps.cache.admit(&key, r, dom_hash.as_deref()).await {
                            Ok(true) => caps.events.emit(
                                RunEvent::new(
                                    RunEventType::Cache,
                                    &state.req_id,
                                    idx,
                                    format!("admitted selector for {:?}", intent.element_name),
                                )
                                .with_strategy(r.strategy.as_str()),
                            ),
                            Ok(false) => {}
                            Err(e) => tracing::debug!(error = %e, "cache admit dropped"),
                        }
                    }
                }
            }

            match &record {
                Some(r) => {
                    caps.events.emit(
                        RunEvent::new(
                            RunEventType::Discovery,
                            &state.req_id,
                            idx,
                            format!(
                                "resolved {:?} -> {} (score {:.2})",
                                intent.element_name, r.selector, r.score
                            ),
                        )
                        .with_strategy(r.strategy.as_str()),
                    );
                    last = Some((intent.element_name_lower(), r.clone()));
                }
                None => {
                    caps.events.emit(RunEvent::new(
                        RunEventType::Discovery,
                        &state.req_id,
                        idx,
                        format!("no selector found for {:?}", intent.element_name),
                    ));
                    last = None;
                }
            }
            state.discovered[idx] = record;
        }
    }
}
