//! Dual-tier selector cache.
//!
//! Fast tier: in-process map with a short TTL, for intra-process hits.
//! Durable tier: the SQLite store, authoritative. Reads warm the fast
//! tier; writes land in both, durable first.

use crate::discovery::SelectorRecord;
use crate::error::Result;
use crate::memory::keys::{CacheEntry, CacheKey};
use crate::memory::store::SqliteStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cache observability counters. Not used for correctness.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fast_hits: u64,
    pub admissions: u64,
    pub rejected_admissions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Hit rate across both tiers.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct FastEntry {
    entry: CacheEntry,
    warmed_at: DateTime<Utc>,
}

/// The dual-tier cache facade every component goes through.
pub struct SelectorCache {
    store: Arc<SqliteStore>,
    fast: RwLock<HashMap<String, FastEntry>>,
    stats: RwLock<CacheStats>,
    /// Consecutive executor failures per key; two in a row invalidate.
    failure_streaks: RwLock<HashMap<String, u32>>,
    fast_ttl: Duration,
    revalidate_after: Duration,
}

impl SelectorCache {
    /// Create a cache over a durable store.
    pub fn new(store: Arc<SqliteStore>, fast_ttl_minutes: i64, revalidate_days: i64) -> Self {
        Self {
            store,
            fast: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            failure_streaks: RwLock::new(HashMap::new()),
            fast_ttl: Duration::minutes(fast_ttl_minutes.max(1)),
            revalidate_after: Duration::days(revalidate_days.max(1)),
        }
    }

    /// Look up a selector. Fast tier first; durable on miss, warming the
    /// fast tier. Entries past the soft TTL still return but are flagged
    /// for re-validation by the caller's drift check.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let storage_key = key.storage_key();

        {
            let fast = self.fast.read().await;
            if let Some(fast_entry) = fast.get(&storage_key) {
                if Utc::now() - fast_entry.warmed_at < self.fast_ttl {
                    let mut stats = self.stats.write().await;
                    stats.hits += 1;
                    stats.fast_hits += 1;
                    drop(stats);
                    let _ = self.store.record_cache_hit(key);
                    return Ok(Some(fast_entry.entry.clone()));
                }
            }
        }

        match self.store.get_entry(key)? {
            Some(entry) => {
                {
                    let mut fast = self.fast.write().await;
                    fast.insert(
                        storage_key,
                        FastEntry {
                            entry: entry.clone(),
                            warmed_at: Utc::now(),
                        },
                    );
                }
                self.stats.write().await.hits += 1;
                let _ = self.store.record_cache_hit(key);
                Ok(Some(entry))
            }
            None => {
                self.stats.write().await.misses += 1;
                let _ = self.store.record_cache_miss(key);
                Ok(None)
            }
        }
    }

    /// Whether an entry is old enough to deserve re-validation.
    pub fn needs_revalidation(&self, entry: &CacheEntry) -> bool {
        Utc::now() - entry.created_at > self.revalidate_after
    }

    /// Admit a discovered selector. Only stable records are written; the
    /// durable tier arbitrates overwrites, and the fast tier follows it.
    pub async fn admit(
        &self,
        key: &CacheKey,
        record: &SelectorRecord,
        dom_hash: Option<&str>,
    ) -> Result<bool> {
        if !record.stable || record.meta.ordinal.is_some() {
            self.stats.write().await.rejected_admissions += 1;
            return Ok(false);
        }

        let epoch = self.store.current_epoch()?;
        let mut entry = CacheEntry::new(
            key.clone(),
            record.selector.clone(),
            record.strategy,
            record.score,
            epoch,
        );
        if let Some(hash) = dom_hash {
            entry = entry.with_dom_hash(hash);
        }

        let written = self.store.admit(&entry)?;
        if written {
            let mut fast = self.fast.write().await;
            fast.insert(
                key.storage_key(),
                FastEntry {
                    entry,
                    warmed_at: Utc::now(),
                },
            );
            self.stats.write().await.admissions += 1;
        } else {
            self.stats.write().await.rejected_admissions += 1;
        }
        Ok(written)
    }

    /// Drop an entry from both tiers.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        self.fast.write().await.remove(&key.storage_key());
        self.failure_streaks.write().await.remove(&key.storage_key());
        let existed = self.store.invalidate(key)?;
        if existed {
            self.stats.write().await.invalidations += 1;
        }
        Ok(existed)
    }

    /// Record that a cached selector just worked; refreshes the stored
    /// DOM snapshot and resets the failure streak.
    pub async fn note_success(&self, key: &CacheKey, dom_hash: Option<&str>) -> Result<()> {
        self.failure_streaks.write().await.remove(&key.storage_key());
        self.store.mark_ok(key, dom_hash)
    }

    /// Record an executor failure on a cached selector. Two consecutive
    /// failures invalidate the entry; returns whether that happened.
    pub async fn note_failure(&self, key: &CacheKey) -> Result<bool> {
        let streak = {
            let mut streaks = self.failure_streaks.write().await;
            let streak = streaks.entry(key.storage_key()).or_insert(0);
            *streak += 1;
            *streak
        };
        if streak >= 2 {
            self.invalidate(key).await
        } else {
            Ok(false)
        }
    }

    /// Snapshot the counters.
    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    /// Bump the epoch: operator-commanded wholesale invalidation.
    pub async fn bump_epoch(&self) -> Result<i64> {
        self.fast.write().await.clear();
        self.store.bump_epoch()
    }

    /// Direct access to the durable tier (drift checks, run records).
    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }
}
