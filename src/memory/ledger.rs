//! Heal-history learner: strategy ranking over the outcome ledger.

use crate::discovery::Strategy;
use crate::error::Result;
use crate::memory::store::SqliteStore;
use chrono::Utc;
use std::sync::Arc;

/// Recency half-life in days: a success from two weeks ago carries half
/// the boost of one from today. Keeps ancient success rates from
/// dominating after a site redesign.
const RECENCY_HALF_LIFE_DAYS: f64 = 14.0;

/// Capability handle over the append-only strategy-outcome ledger.
pub struct HealLedger {
    store: Arc<SqliteStore>,
}

impl HealLedger {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Record one reprobe outcome.
    pub fn record_outcome(
        &self,
        url_pattern: &str,
        element_name: &str,
        strategy: Strategy,
        success: bool,
    ) -> Result<()> {
        self.store
            .record_outcome(url_pattern, element_name, strategy, success)
    }

    /// Strategies ranked best-first for a given target.
    ///
    /// Score = success / (success + failure + 1), scaled by a recency
    /// boost that decays with the age of the last use.
    pub fn best_strategies(
        &self,
        url_pattern: &str,
        element_name: &str,
    ) -> Result<Vec<(Strategy, f64)>> {
        let now = Utc::now();
        let mut ranked: Vec<(Strategy, f64)> = self
            .store
            .strategy_stats(url_pattern, element_name)?
            .into_iter()
            .map(|row| {
                let base = row.success_count as f64
                    / (row.success_count + row.failure_count + 1) as f64;
                let age_days =
                    (now - row.last_used_at).num_seconds().max(0) as f64 / 86_400.0;
                let boost = 0.5 + 0.5 * (-age_days / RECENCY_HALF_LIFE_DAYS).exp();
                (row.strategy, base * boost)
            })
            .collect();

        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked)
    }

    /// Waterfall order biased by ledger history: known-good strategies
    /// first, the untried remainder in tier order after them.
    pub fn biased_waterfall(&self, url_pattern: &str, element_name: &str) -> Vec<Strategy> {
        let ranked = self
            .best_strategies(url_pattern, element_name)
            .unwrap_or_default();

        let mut order: Vec<Strategy> = ranked
            .iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(s, _)| *s)
            .filter(|s| *s != Strategy::Ordinal)
            .collect();
        for strategy in Strategy::waterfall() {
            if !order.contains(&strategy) {
                order.push(strategy);
            }
        }
        order
    }
}
