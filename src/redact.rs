//! Secret redaction at persistence boundaries.
//!
//! Step values flagged `secret` pass through the executor untouched but
//! must never reach the heal ledger, the run record store, or a generated
//! artifact. The writers in `runtime` and `generator` funnel through
//! these helpers.

use crate::plan::Intent;
use serde_json::Value;

/// What a redacted value serializes as.
pub const REDACTED: &str = "***";

/// The step value as it may be persisted.
pub fn persistable_value(intent: &Intent) -> Option<String> {
    match (&intent.value, intent.secret) {
        (Some(_), true) => Some(REDACTED.to_string()),
        (Some(v), false) => Some(v.clone()),
        (None, _) => None,
    }
}

/// Serialize an intent for a run-step row, with secrets masked.
pub fn persistable_intent(intent: &Intent) -> Value {
    let mut masked = intent.clone();
    masked.value = persistable_value(intent);
    serde_json::to_value(&masked).unwrap_or(Value::Null)
}

/// Environment-variable placeholder for a secret value in generated code.
pub fn artifact_placeholder(intent: &Intent) -> String {
    let slug: String = intent
        .element_name
        .to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("std::env::var(\"PACTS_SECRET_{}\").unwrap_or_default()", slug)
}
