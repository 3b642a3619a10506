//! SQLite schema and migrations for the durable stores.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Ordered migration steps; a migration at index `i` produces version
/// `i + 1`. New schema changes append here, never edit earlier entries.
const MIGRATIONS: &[fn(&Connection) -> SqliteResult<()>] = &[migrate_v1];

/// Whether this database has ever been migrated.
pub fn is_initialized(conn: &Connection) -> bool {
    // Preparing a statement against a missing table fails, which is
    // exactly the signal we want.
    conn.prepare("SELECT version FROM schema_version LIMIT 1").is_ok()
}

/// Bring a connection up to [`SCHEMA_VERSION`].
///
/// Safe to call on every open: each migration runs at most once, gated
/// by the versions already recorded.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // WAL keeps concurrent runs from serializing on a single writer;
    // foreign keys guard the run_steps/artifacts -> runs references.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let applied: i32 = conn
        .query_row(
            "SELECT IFNULL(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let version = idx as i32 + 1;
        if version <= applied {
            continue;
        }
        migration(conn)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Version 1: the five spec tables plus store-wide metadata.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    // Store-wide key/value metadata (cache epoch lives here)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Durable selector cache; admission is stability-gated by the writer
    conn.execute(
        "CREATE TABLE IF NOT EXISTS selector_cache (
            key TEXT PRIMARY KEY,
            url_pattern TEXT NOT NULL,
            element_name TEXT NOT NULL,
            action TEXT NOT NULL,
            selector TEXT NOT NULL,
            strategy TEXT NOT NULL,
            score REAL NOT NULL DEFAULT 0.0,
            stable INTEGER NOT NULL DEFAULT 1,
            epoch INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            last_ok_at TEXT,
            hit_count INTEGER NOT NULL DEFAULT 0,
            miss_count INTEGER NOT NULL DEFAULT 0,
            dom_hash_snapshot TEXT
        )",
        [],
    )?;

    // Strategy outcome ledger; append-only counters, no TTL
    conn.execute(
        "CREATE TABLE IF NOT EXISTS heal_history (
            url_pattern TEXT NOT NULL,
            element_name TEXT NOT NULL,
            strategy TEXT NOT NULL,
            success_count INTEGER NOT NULL DEFAULT 0,
            failure_count INTEGER NOT NULL DEFAULT 0,
            last_used_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (url_pattern, element_name, strategy)
        )",
        [],
    )?;

    // Run records
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            req_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            verdict TEXT,
            rca_class TEXT,
            rca_confidence REAL,
            heal_rounds INTEGER NOT NULL DEFAULT 0,
            plan_hash TEXT,
            duration_ms INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS run_steps (
            run_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            intent TEXT NOT NULL,
            selector TEXT,
            strategy TEXT,
            outcome TEXT,
            ms INTEGER,
            PRIMARY KEY (run_id, idx),
            FOREIGN KEY (run_id) REFERENCES runs(req_id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS artifacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            path TEXT NOT NULL,
            hash TEXT NOT NULL,
            FOREIGN KEY (run_id) REFERENCES runs(req_id) ON DELETE CASCADE
        )",
        [],
    )?;

    // Indexes for common queries
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cache_pattern ON selector_cache(url_pattern, element_name)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_heal_pattern ON heal_history(url_pattern, element_name)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at)",
        [],
    )?;

    // Seed the cache epoch
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('cache_epoch', '0')",
        [],
    )?;

    Ok(())
}
