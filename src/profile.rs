//! Runtime profile detection and timeout budgets.
//!
//! Before any step runs, the target URL and initial HTML are classified as
//! `Static` or `Dynamic`. The profile picks the readiness budgets, the
//! post-load settle delay, and the drift threshold used on cache hits.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime profile for a target page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuntimeProfile {
    /// Server-rendered page; fast readiness budgets, no settle delay.
    Static,
    /// Single-page application; long budgets plus an empirical settle delay.
    Dynamic,
}

impl std::fmt::Display for RuntimeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => write!(f, "STATIC"),
            Self::Dynamic => write!(f, "DYNAMIC"),
        }
    }
}

/// Timeout budgets derived from a runtime profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileBudgets {
    /// Stage 1: network-idle wait.
    pub dom_idle: Duration,
    /// Stage 2: element visibility/enablement wait.
    pub element_ready: Duration,
    /// Navigation-vs-token race budget for `navigates_to` outcomes.
    pub nav_race: Duration,
    /// Empirical settle delay applied after load events (Dynamic only).
    pub settle: Duration,
    /// Per-step wall-clock budget; the run-level cap is plan.len() times this.
    pub per_step: Duration,
}

impl RuntimeProfile {
    /// Budget table for this profile.
    pub fn budgets(&self) -> ProfileBudgets {
        match self {
            Self::Static => ProfileBudgets {
                dom_idle: Duration::from_secs(2),
                element_ready: Duration::from_secs(3),
                nav_race: Duration::from_secs(5),
                settle: Duration::ZERO,
                per_step: Duration::from_secs(15),
            },
            Self::Dynamic => ProfileBudgets {
                dom_idle: Duration::from_secs(5),
                element_ready: Duration::from_secs(8),
                nav_race: Duration::from_secs(10),
                settle: Duration::from_millis(1500),
                per_step: Duration::from_secs(30),
            },
        }
    }

    /// Drift threshold (Hamming ratio) above which a cached selector is stale.
    pub fn drift_threshold(&self) -> f64 {
        match self {
            Self::Static => 0.35,
            Self::Dynamic => 0.72,
        }
    }
}

/// Classifies a URL + initial HTML into a runtime profile.
///
/// Detection order: explicit override, URL pattern, SPA signature in the
/// HTML, HTML size. Anything that trips none of these is `Static`.
pub struct ProfileDetector {
    url_patterns: Vec<Regex>,
    spa_signatures: Vec<String>,
    html_size_threshold: usize,
}

impl ProfileDetector {
    /// Create a detector with the default signature set.
    pub fn new() -> Self {
        let url_patterns = [
            r"(?i)lightning\.force\.com",
            r"(?i)\.salesforce\.com",
            r"(?i)\.youtube\.com",
            r"(?i)mail\.google\.com",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

        Self {
            url_patterns,
            spa_signatures: vec![
                "data-reactroot".to_string(),
                "__NEXT_DATA__".to_string(),
                "ng-version".to_string(),
                "data-v-app".to_string(),
                "ember-application".to_string(),
                "aura:dependency".to_string(),
                "window.webpackJsonp".to_string(),
                "ytd-app".to_string(),
            ],
            html_size_threshold: 400_000,
        }
    }

    /// Add a URL pattern that forces `Dynamic`.
    pub fn with_url_pattern(mut self, pattern: &str) -> crate::error::Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| crate::error::Error::Config(format!("bad profile pattern: {}", e)))?;
        self.url_patterns.push(re);
        Ok(self)
    }

    /// Add an HTML substring that marks an SPA.
    pub fn with_spa_signature(mut self, signature: impl Into<String>) -> Self {
        self.spa_signatures.push(signature.into());
        self
    }

    /// Classify a page.
    pub fn detect(
        &self,
        url: &str,
        html: &str,
        explicit: Option<RuntimeProfile>,
    ) -> RuntimeProfile {
        if let Some(profile) = explicit {
            return profile;
        }

        if self.url_patterns.iter().any(|re| re.is_match(url)) {
            return RuntimeProfile::Dynamic;
        }

        if self.spa_signatures.iter().any(|sig| html.contains(sig)) {
            return RuntimeProfile::Dynamic;
        }

        if html.len() >= self.html_size_threshold {
            return RuntimeProfile::Dynamic;
        }

        RuntimeProfile::Static
    }
}

impl Default for ProfileDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_by_default() {
        let detector = ProfileDetector::new();
        let profile = detector.detect(
            "https://en.wikipedia.org/wiki/Rust",
            "<html><body>plain</body></html>",
            None,
        );
        assert_eq!(profile, RuntimeProfile::Static);
    }

    #[test]
    fn test_spa_signature_forces_dynamic() {
        let detector = ProfileDetector::new();
        let profile = detector.detect(
            "https://app.example.com",
            "<html><div data-reactroot></div></html>",
            None,
        );
        assert_eq!(profile, RuntimeProfile::Dynamic);
    }

    #[test]
    fn test_url_pattern_forces_dynamic() {
        let detector = ProfileDetector::new();
        let profile = detector.detect("https://org.lightning.force.com/one", "<html></html>", None);
        assert_eq!(profile, RuntimeProfile::Dynamic);
    }

    #[test]
    fn test_explicit_override_wins() {
        let detector = ProfileDetector::new();
        let profile = detector.detect(
            "https://org.lightning.force.com/one",
            "<html></html>",
            Some(RuntimeProfile::Static),
        );
        assert_eq!(profile, RuntimeProfile::Static);
    }

    #[test]
    fn test_budget_table() {
        let static_budgets = RuntimeProfile::Static.budgets();
        let dynamic_budgets = RuntimeProfile::Dynamic.budgets();

        assert_eq!(static_budgets.dom_idle, Duration::from_secs(2));
        assert_eq!(dynamic_budgets.dom_idle, Duration::from_secs(5));
        assert_eq!(static_budgets.settle, Duration::ZERO);
        assert_eq!(dynamic_budgets.settle, Duration::from_millis(1500));
        assert!(dynamic_budgets.per_step > static_budgets.per_step);
    }

    #[test]
    fn test_drift_thresholds() {
        assert!(
            RuntimeProfile::Static.drift_threshold() < RuntimeProfile::Dynamic.drift_threshold()
        );
    }
}
