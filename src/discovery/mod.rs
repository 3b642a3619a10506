//! Selector discovery: the eight-tier waterfall plus the ordinal tier.
//!
//! The engine owns a strategy table and walks it in order (or in a
//! ledger-biased order during healing) until a tier yields a candidate.
//! The caller is responsible for gating the candidate and for cache
//! admission; the engine only finds and scores.

pub mod fuzzy;
pub mod guardrails;
pub mod ordinal;
pub mod scope;
pub mod tiers;
mod types;

pub use fuzzy::{fuzzy_match, fuzzy_match_widened, FuzzyMatch, MatchKind};
pub use tiers::{tier_table, DiscoveryTier, TierCandidate};
pub use types::{SelectorMeta, SelectorRecord, Strategy};

use crate::browser::BrowserDriver;
use crate::error::Result;
use crate::memory::drift;
use crate::plan::Intent;
use std::collections::HashSet;

/// Knobs the healer turns when re-walking the waterfall.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Tier order override (ledger-biased during healing).
    pub order: Option<Vec<Strategy>>,
    /// Strategies already tried unsuccessfully in this run.
    pub skip: HashSet<Strategy>,
    /// Widen fuzzy matching (last-resort reprobe).
    pub widen: bool,
    /// Drop the scope constraint (last-resort reprobe).
    pub relax_scope: bool,
    /// Drop the ordinal constraint (last-resort reprobe).
    pub relax_ordinal: bool,
}

impl DiscoveryOptions {
    /// Standard first-discovery walk.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Healing walk: ledger-biased order, skipping spent strategies.
    pub fn healing(order: Vec<Strategy>, skip: HashSet<Strategy>, widen: bool) -> Self {
        Self {
            order: Some(order),
            skip,
            widen,
            relax_scope: widen,
            relax_ordinal: widen,
        }
    }
}

/// The discovery engine: ordinal tier first when applicable, then the
/// waterfall.
pub struct DiscoveryEngine {
    tiers: Vec<Box<dyn DiscoveryTier>>,
}

impl DiscoveryEngine {
    pub fn new() -> Self {
        Self {
            tiers: tier_table(),
        }
    }

    /// Find a selector for an intent. Returns `None` when every tier
    /// misses; the caller maps that to `discovery_missing`.
    pub async fn discover(
        &self,
        driver: &dyn BrowserDriver,
        intent: &Intent,
        scope: Option<&str>,
        opts: &DiscoveryOptions,
    ) -> Result<Option<SelectorRecord>> {
        let scope = if opts.relax_scope { None } else { scope };

        // Ordinal intents resolve positionally and outrank the waterfall.
        if intent.ordinal.is_some() && !opts.relax_ordinal {
            if let Some(record) = ordinal::probe(driver, intent, scope).await? {
                tracing::debug!(
                    selector = %record.selector,
                    "ordinal tier resolved intent"
                );
                return Ok(Some(record));
            }
            // Ordinal beyond the available count falls through to tiers.
        }

        let order: Vec<Strategy> = opts
            .order
            .clone()
            .unwrap_or_else(|| Strategy::waterfall().to_vec());

        for strategy in order {
            if strategy == Strategy::Ordinal || opts.skip.contains(&strategy) {
                continue;
            }
            let tier = match self.tiers.iter().find(|t| t.strategy() == strategy) {
                Some(t) => t,
                None => continue,
            };
            let candidate = match tier.probe(driver, intent, scope, opts.widen).await? {
                Some(c) => c,
                None => continue,
            };

            let score = strategy.base_score()
                + candidate.matched.kind.score_adjustment()
                + guardrails::suffix_noun_bonus(&candidate.matched.matched);
            let record = SelectorRecord::new(candidate.selector, strategy, score)
                .with_matched_text(candidate.matched.matched.clone())
                .with_dom_hash(drift::fingerprint_prefix(&candidate.snapshot));
            tracing::debug!(
                strategy = %strategy,
                selector = %record.selector,
                score = record.score,
                "tier walk resolved intent"
            );
            return Ok(Some(record));
        }

        Ok(None)
    }
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}
