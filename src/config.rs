//! Runtime configuration for a PACTS deployment.

use crate::profile::RuntimeProfile;
use serde::{Deserialize, Serialize};

/// Configuration shared by every run the runtime executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum healing cycles per run (clamped to 0..=5).
    pub max_heal_rounds: u32,
    /// Same-selector retries for transient failures; not heal budget.
    pub transient_retries: u32,
    /// Interval between the two bounding-box stability samples, ms.
    pub bbox_sample_interval_ms: u64,
    /// Wait for a descendant input after clicking an activator, ms.
    pub activator_input_wait_ms: u64,
    /// Fast-tier cache entry lifetime, minutes.
    pub fast_tier_ttl_minutes: i64,
    /// Durable cache soft TTL before re-validation, days.
    pub cache_revalidate_days: i64,
    /// Whether the dialog sentinel polls around each step.
    pub sentinel_enabled: bool,
    /// Keywords that mark a dialog as a validation/error dialog.
    pub sentinel_keywords: Vec<String>,
    /// Selectors tried when closing a recognized dialog, before ESC.
    pub dialog_close_selectors: Vec<String>,
    /// Site-hint submit buttons for the autocomplete bypass ladder.
    pub submit_hint_selectors: Vec<String>,
    /// DOM success-token selectors for the SPA navigation race.
    pub nav_token_selectors: Vec<String>,
    /// Named window predicate for readiness stage 3; skipped when None.
    pub app_ready_hook: Option<String>,
    /// Forces the runtime profile instead of detecting it.
    pub profile_override: Option<RuntimeProfile>,
    /// Path to the auth storage-state blob; tilde-expanded on resolve.
    pub storage_state_path: Option<String>,
    /// Init scripts installed at session start (fingerprint mitigations).
    pub fingerprint_scripts: Vec<String>,
    /// Data-row keys whose values are secrets and must be redacted.
    pub secret_keys: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_heal_rounds: 3,
            transient_retries: 2,
            bbox_sample_interval_ms: 120,
            activator_input_wait_ms: 500,
            fast_tier_ttl_minutes: 60,
            cache_revalidate_days: 7,
            sentinel_enabled: false,
            sentinel_keywords: vec![
                "required".to_string(),
                "invalid".to_string(),
                "duplicate".to_string(),
                "must be".to_string(),
                "cannot be blank".to_string(),
            ],
            dialog_close_selectors: vec![
                "button[title=\"Close\"]".to_string(),
                ".modal-close".to_string(),
                "[aria-label=\"Close\"]".to_string(),
            ],
            submit_hint_selectors: vec![
                "#searchButton".to_string(),
                "button[type=\"submit\"]".to_string(),
            ],
            nav_token_selectors: vec!["#firstHeading".to_string(), "h1".to_string()],
            app_ready_hook: None,
            profile_override: None,
            storage_state_path: None,
            fingerprint_scripts: vec![
                "Object.defineProperty(navigator, 'webdriver', {get: () => undefined});"
                    .to_string(),
            ],
            secret_keys: vec![
                "password".to_string(),
                "token".to_string(),
                "secret".to_string(),
                "api_key".to_string(),
            ],
        }
    }
}

impl RuntimeConfig {
    /// Storage-state path with `~` expanded, if configured.
    pub fn resolved_storage_state_path(&self) -> Option<String> {
        self.storage_state_path
            .as_deref()
            .map(|p| shellexpand::tilde(p).into_owned())
    }

    /// Whether the given data-row key names a secret value.
    pub fn is_secret_key(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.secret_keys.iter().any(|s| lower.contains(s))
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the healing budget; values above 5 are clamped.
    pub fn max_heal_rounds(mut self, rounds: u32) -> Self {
        self.config.max_heal_rounds = rounds.min(5);
        self
    }

    /// Enable or disable the dialog sentinel.
    pub fn sentinel(mut self, enabled: bool) -> Self {
        self.config.sentinel_enabled = enabled;
        self
    }

    /// Force a runtime profile instead of detecting one.
    pub fn profile(mut self, profile: RuntimeProfile) -> Self {
        self.config.profile_override = Some(profile);
        self
    }

    /// Set the app-ready hook (a window function name).
    pub fn app_ready_hook(mut self, name: impl Into<String>) -> Self {
        self.config.app_ready_hook = Some(name.into());
        self
    }

    /// Set the auth storage-state path.
    pub fn storage_state_path(mut self, path: impl Into<String>) -> Self {
        self.config.storage_state_path = Some(path.into());
        self
    }

    /// Add a DOM success-token selector for navigation races.
    pub fn nav_token_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.nav_token_selectors.push(selector.into());
        self
    }

    /// Override the bbox sample interval (tests shrink this).
    pub fn bbox_sample_interval_ms(mut self, ms: u64) -> Self {
        self.config.bbox_sample_interval_ms = ms;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_heal_rounds, 3);
        assert_eq!(config.transient_retries, 2);
        assert!(!config.sentinel_enabled);
        assert!(config.app_ready_hook.is_none());
    }

    #[test]
    fn test_builder_clamps_heal_rounds() {
        let config = RuntimeConfigBuilder::new().max_heal_rounds(9).build();
        assert_eq!(config.max_heal_rounds, 5);
    }

    #[test]
    fn test_secret_key_detection() {
        let config = RuntimeConfig::default();
        assert!(config.is_secret_key("password"));
        assert!(config.is_secret_key("ADMIN_PASSWORD"));
        assert!(config.is_secret_key("api_key"));
        assert!(!config.is_secret_key("username"));
    }

    #[test]
    fn test_storage_state_tilde_expansion() {
        let config = RuntimeConfigBuilder::new()
            .storage_state_path("~/.pacts/auth.json")
            .build();
        let resolved = config.resolved_storage_state_path().unwrap();
        assert!(!resolved.starts_with('~'));
        assert!(resolved.ends_with(".pacts/auth.json"));
    }
}
