//! SQLite-backed durable store: selector cache, heal ledger, run records.

use crate::discovery::Strategy;
use crate::error::{Error, Result};
use crate::memory::keys::{CacheEntry, CacheKey};
use crate::memory::schema::{initialize_schema, is_initialized};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Per-strategy ledger counters for one (url_pattern, element_name).
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyStats {
    pub strategy: Strategy,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_used_at: DateTime<Utc>,
}

/// A persisted run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub req_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub verdict: Option<String>,
    pub rca_class: Option<String>,
    pub rca_confidence: Option<f64>,
    pub heal_rounds: u32,
    pub plan_hash: Option<String>,
    pub duration_ms: Option<u64>,
}

/// A persisted step row.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStepRow {
    pub run_id: String,
    pub idx: usize,
    pub intent: String,
    pub selector: Option<String>,
    pub strategy: Option<String>,
    pub outcome: Option<String>,
    pub ms: Option<u64>,
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn strategy_from_sql(s: String) -> rusqlite::Result<Strategy> {
    Strategy::parse(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown strategy {:?}", s).into(),
        )
    })
}

/// SQLite-backed durable tier. Shared across runs; every mutation commits
/// per-key, so concurrent runs only contend at row granularity.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::storage(e.to_string()))?;

        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::storage(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::storage(e.to_string()))
    }

    // ==================== Epoch ====================

    /// Current cache epoch.
    pub fn current_epoch(&self) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM meta WHERE key = 'cache_epoch'",
                [],
                |row| row.get::<_, String>(0),
            )
            .map(|v| v.parse().unwrap_or(0))
        })
    }

    /// Bump the cache epoch, invalidating every older entry wholesale.
    pub fn bump_epoch(&self) -> Result<i64> {
        let next = self.current_epoch()? + 1;
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE meta SET value = ?1 WHERE key = 'cache_epoch'",
                params![next.to_string()],
            )?;
            Ok(next)
        })
    }

    // ==================== Selector cache ====================

    /// Fetch a cache entry. Entries from an older epoch are purged and
    /// read as misses.
    pub fn get_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let epoch = self.current_epoch()?;
        let storage_key = key.storage_key();
        let key_clone = key.clone();

        let entry = self.with_conn(move |conn| {
            conn.query_row(
                "SELECT selector, strategy, score, stable, epoch, created_at,
                        last_ok_at, hit_count, miss_count, dom_hash_snapshot
                 FROM selector_cache WHERE key = ?1",
                params![storage_key],
                move |row| {
                    let strategy = strategy_from_sql(row.get::<_, String>(1)?)?;
                    Ok(CacheEntry {
                        key: key_clone.clone(),
                        selector: row.get(0)?,
                        strategy,
                        score: row.get(2)?,
                        stable: row.get::<_, i64>(3)? != 0,
                        epoch: row.get(4)?,
                        created_at: parse_ts(&row.get::<_, String>(5)?),
                        last_ok_at: row
                            .get::<_, Option<String>>(6)?
                            .map(|s| parse_ts(&s)),
                        hit_count: row.get::<_, i64>(7)? as u64,
                        miss_count: row.get::<_, i64>(8)? as u64,
                        dom_hash_snapshot: row.get(9)?,
                    })
                },
            )
            .optional()
        })?;

        match entry {
            Some(entry) if entry.epoch < epoch => {
                self.invalidate(key)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Admit a stable entry. Equal-stability overwrites with a different
    /// strategy require a strictly greater score; returns whether the
    /// write happened.
    pub fn admit(&self, entry: &CacheEntry) -> Result<bool> {
        if !entry.stable {
            return Ok(false);
        }
        let epoch = self.current_epoch()?;
        let key = entry.key.storage_key();
        let entry = entry.clone();

        self.with_conn(move |conn| {
            let existing: Option<(String, f64, i64)> = conn
                .query_row(
                    "SELECT strategy, score, stable FROM selector_cache WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            if let Some((strategy, score, stable)) = existing {
                let different_strategy = strategy != entry.strategy.as_str();
                if stable != 0 && different_strategy && entry.score <= score {
                    return Ok(false);
                }
            }

            conn.execute(
                "INSERT OR REPLACE INTO selector_cache (
                    key, url_pattern, element_name, action, selector, strategy,
                    score, stable, epoch, created_at, last_ok_at, hit_count,
                    miss_count, dom_hash_snapshot
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10, 0, 0, ?11)",
                params![
                    key,
                    entry.key.url_pattern,
                    entry.key.element_name,
                    entry.key.action.to_string(),
                    entry.selector,
                    entry.strategy.as_str(),
                    entry.score,
                    epoch,
                    entry.created_at.to_rfc3339(),
                    entry.last_ok_at.map(|t| t.to_rfc3339()),
                    entry.dom_hash_snapshot,
                ],
            )?;
            Ok(true)
        })
    }

    /// Drop an entry; returns whether one existed.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let key = key.storage_key();
        self.with_conn(move |conn| {
            let rows = conn.execute("DELETE FROM selector_cache WHERE key = ?1", params![key])?;
            Ok(rows > 0)
        })
    }

    /// Increment the hit counter.
    pub fn record_cache_hit(&self, key: &CacheKey) -> Result<()> {
        let key = key.storage_key();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE selector_cache SET hit_count = hit_count + 1 WHERE key = ?1",
                params![key],
            )?;
            Ok(())
        })
    }

    /// Increment the miss counter.
    pub fn record_cache_miss(&self, key: &CacheKey) -> Result<()> {
        let key = key.storage_key();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE selector_cache SET miss_count = miss_count + 1 WHERE key = ?1",
                params![key],
            )?;
            Ok(())
        })
    }

    /// Mark a cached selector as having just worked; refreshes the DOM
    /// snapshot when one is supplied.
    pub fn mark_ok(&self, key: &CacheKey, dom_hash: Option<&str>) -> Result<()> {
        let key = key.storage_key();
        let now = Utc::now().to_rfc3339();
        let dom_hash = dom_hash.map(str::to_string);
        self.with_conn(move |conn| {
            match dom_hash {
                Some(hash) => conn.execute(
                    "UPDATE selector_cache SET last_ok_at = ?2, dom_hash_snapshot = ?3 WHERE key = ?1",
                    params![key, now, hash],
                )?,
                None => conn.execute(
                    "UPDATE selector_cache SET last_ok_at = ?2 WHERE key = ?1",
                    params![key, now],
                )?,
            };
            Ok(())
        })
    }

    /// Count stable entries (observability and tests).
    pub fn cached_entry_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM selector_cache", [], |row| {
                row.get::<_, i64>(0).map(|n| n as u64)
            })
        })
    }

    // ==================== Heal ledger ====================

    /// Record a strategy outcome. Counters only grow; no deletion path
    /// exists for ledger rows.
    pub fn record_outcome(
        &self,
        url_pattern: &str,
        element_name: &str,
        strategy: Strategy,
        success: bool,
    ) -> Result<()> {
        let url_pattern = url_pattern.to_string();
        let element_name = element_name.to_lowercase();
        let now = Utc::now().to_rfc3339();
        let (s, f) = if success { (1, 0) } else { (0, 1) };

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO heal_history (
                    url_pattern, element_name, strategy,
                    success_count, failure_count, last_used_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(url_pattern, element_name, strategy)
                 DO UPDATE SET
                    success_count = success_count + ?4,
                    failure_count = failure_count + ?5,
                    last_used_at = ?6",
                params![url_pattern, element_name, strategy.as_str(), s, f, now],
            )?;
            Ok(())
        })
    }

    /// All ledger rows for one (url_pattern, element_name).
    pub fn strategy_stats(
        &self,
        url_pattern: &str,
        element_name: &str,
    ) -> Result<Vec<StrategyStats>> {
        let url_pattern = url_pattern.to_string();
        let element_name = element_name.to_lowercase();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT strategy, success_count, failure_count, last_used_at
                 FROM heal_history
                 WHERE url_pattern = ?1 AND element_name = ?2",
            )?;
            let rows = stmt
                .query_map(params![url_pattern, element_name], |row| {
                    let strategy = strategy_from_sql(row.get::<_, String>(0)?)?;
                    Ok(StrategyStats {
                        strategy,
                        success_count: row.get::<_, i64>(1)? as u64,
                        failure_count: row.get::<_, i64>(2)? as u64,
                        last_used_at: parse_ts(&row.get::<_, String>(3)?),
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }

    // ==================== Run records ====================

    /// Open a run record.
    pub fn start_run(&self, req_id: &str, started_at: DateTime<Utc>, plan_hash: &str) -> Result<()> {
        let req_id = req_id.to_string();
        let plan_hash = plan_hash.to_string();
        let started = started_at.to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO runs (req_id, started_at, plan_hash) VALUES (?1, ?2, ?3)",
                params![req_id, started, plan_hash],
            )?;
            Ok(())
        })
    }

    /// Close a run record.
    #[allow(clippy::too_many_arguments)]
    pub fn finish_run(
        &self,
        req_id: &str,
        finished_at: DateTime<Utc>,
        verdict: &str,
        rca_class: Option<&str>,
        rca_confidence: Option<f64>,
        heal_rounds: u32,
        plan_hash: &str,
        duration_ms: u64,
    ) -> Result<()> {
        let req_id = req_id.to_string();
        let verdict = verdict.to_string();
        let rca_class = rca_class.map(str::to_string);
        let plan_hash = plan_hash.to_string();
        let finished = finished_at.to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE runs SET finished_at = ?2, verdict = ?3, rca_class = ?4,
                        rca_confidence = ?5, heal_rounds = ?6, plan_hash = ?7,
                        duration_ms = ?8
                 WHERE req_id = ?1",
                params![
                    req_id,
                    finished,
                    verdict,
                    rca_class,
                    rca_confidence,
                    heal_rounds,
                    plan_hash,
                    duration_ms as i64
                ],
            )?;
            Ok(())
        })
    }

    /// Persist one executed step.
    pub fn insert_run_step(&self, step: &RunStepRow) -> Result<()> {
        let step = step.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO run_steps (run_id, idx, intent, selector, strategy, outcome, ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    step.run_id,
                    step.idx as i64,
                    step.intent,
                    step.selector,
                    step.strategy,
                    step.outcome,
                    step.ms.map(|m| m as i64)
                ],
            )?;
            Ok(())
        })
    }

    /// Persist an artifact reference.
    pub fn insert_artifact(&self, run_id: &str, kind: &str, path: &str, hash: &str) -> Result<()> {
        let run_id = run_id.to_string();
        let kind = kind.to_string();
        let path = path.to_string();
        let hash = hash.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO artifacts (run_id, kind, path, hash) VALUES (?1, ?2, ?3, ?4)",
                params![run_id, kind, path, hash],
            )?;
            Ok(())
        })
    }

    /// Artifact rows recorded for one run.
    pub fn artifact_count(&self, run_id: &str) -> Result<u64> {
        let run_id = run_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM artifacts WHERE run_id = ?1",
                params![run_id],
                |row| row.get::<_, i64>(0).map(|n| n as u64),
            )
        })
    }

    /// Most recent runs, newest first (read by the observability facade).
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRow>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT req_id, started_at, finished_at, verdict, rca_class,
                        rca_confidence, heal_rounds, plan_hash, duration_ms
                 FROM runs ORDER BY started_at DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(RunRow {
                        req_id: row.get(0)?,
                        started_at: parse_ts(&row.get::<_, String>(1)?),
                        finished_at: row.get::<_, Option<String>>(2)?.map(|s| parse_ts(&s)),
                        verdict: row.get(3)?,
                        rca_class: row.get(4)?,
                        rca_confidence: row.get(5)?,
                        heal_rounds: row.get::<_, i64>(6)? as u32,
                        plan_hash: row.get(7)?,
                        duration_ms: row.get::<_, Option<i64>>(8)?.map(|m| m as u64),
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }

    /// Steps persisted for one run, in plan order.
    pub fn run_steps_for(&self, req_id: &str) -> Result<Vec<RunStepRow>> {
        let req_id = req_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT run_id, idx, intent, selector, strategy, outcome, ms
                 FROM run_steps WHERE run_id = ?1 ORDER BY idx",
            )?;
            let rows = stmt
                .query_map(params![req_id], |row| {
                    Ok(RunStepRow {
                        run_id: row.get(0)?,
                        idx: row.get::<_, i64>(1)? as usize,
                        intent: row.get(2)?,
                        selector: row.get(3)?,
                        strategy: row.get(4)?,
                        outcome: row.get(5)?,
                        ms: row.get::<_, Option<i64>>(6)?.map(|m| m as u64),
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }
}
