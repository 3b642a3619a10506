//! Cache keys and cache entries.

use crate::discovery::Strategy;
use crate::plan::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalize a URL into a cache pattern: strip scheme, query, and
/// fragment; keep host plus the first path segment.
pub fn normalize_url_pattern(url: &str) -> String {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let without_query = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme);

    let mut parts = without_query.split('/').filter(|p| !p.is_empty());
    let host = parts.next().unwrap_or_default().to_lowercase();
    match parts.next() {
        Some(segment) => format!("{}/{}", host, segment),
        None => host,
    }
}

/// Key addressing a cached selector: normalized URL pattern, lowered
/// element name, and action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub url_pattern: String,
    pub element_name: String,
    pub action: Action,
}

impl CacheKey {
    /// Build a key from a raw URL and intent fields.
    pub fn new(url: &str, element_name: &str, action: Action) -> Self {
        Self {
            url_pattern: normalize_url_pattern(url),
            element_name: element_name.to_lowercase(),
            action,
        }
    }

    /// Flat storage form used as the primary key.
    pub fn storage_key(&self) -> String {
        format!("{}::{}::{}", self.url_pattern, self.element_name, self.action)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// A durable cache row. Only `stable = true` entries are ever admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub selector: String,
    pub strategy: Strategy,
    pub score: f64,
    pub stable: bool,
    /// Operator-bumped generation; older generations read as misses.
    pub epoch: i64,
    pub created_at: DateTime<Utc>,
    pub last_ok_at: Option<DateTime<Utc>>,
    pub hit_count: u64,
    pub miss_count: u64,
    pub dom_hash_snapshot: Option<String>,
}

impl CacheEntry {
    /// Create a fresh entry at the given epoch.
    pub fn new(
        key: CacheKey,
        selector: impl Into<String>,
        strategy: Strategy,
        score: f64,
        epoch: i64,
    ) -> Self {
        Self {
            key,
            selector: selector.into(),
            strategy,
            score,
            stable: strategy.is_stable(),
            epoch,
            created_at: Utc::now(),
            last_ok_at: None,
            hit_count: 0,
            miss_count: 0,
            dom_hash_snapshot: None,
        }
    }

    pub fn with_dom_hash(mut self, hash: impl Into<String>) -> Self {
        self.dom_hash_snapshot = Some(hash.into());
        self
    }
}
