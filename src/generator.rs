//! The Generator agent: render a replayable test artifact from a
//! passing or healed run.
//!
//! The artifact replays the plan with the last-known-good selector per
//! step through a WebDriver session. It reads only from `RunState`; the
//! browser is never touched here.

use crate::graph::{Agent, NodeTag, RunCapabilities};
use crate::plan::Action;
use crate::redact;
use crate::state::{RunState, Verdict};
use crate::telemetry::{RunEvent, RunEventType};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Render the artifact source. Deterministic for a given run state.
pub fn render_artifact(state: &RunState) -> String {
    let test_name: String = state
        .req_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();

    let mut out = String::new();
    out.push_str(&format!(
        "// Replay artifact for run {} (plan {})\n",
        state.req_id, state.plan_hash
    ));
    out.push_str("// Selectors are the last-known-good per step.\n\n");
    out.push_str("use thirtyfour::prelude::*;\n\n");
    out.push_str("#[tokio::test]\n");
    out.push_str(&format!("async fn replay_{}() -> WebDriverResult<()> {{\n", test_name));
    out.push_str(
        "    let driver = WebDriver::new(\"http://localhost:4444\", DesiredCapabilities::chrome()).await?;\n",
    );
    if let Some(url) = state.url() {
        out.push_str(&format!("    driver.goto({:?}).await?;\n", url));
    }

    for step in &state.executed_steps {
        let selector = &step.selector;
        let value_expr = if step.intent.secret {
            redact::artifact_placeholder(&step.intent)
        } else {
            format!("{:?}", step.intent.value.clone().unwrap_or_default())
        };
        let line = match step.intent.action {
            Action::Click => format!(
                "    driver.find(By::Css({:?})).await?.click().await?;\n",
                selector
            ),
            Action::Fill | Action::Type => format!(
                "    driver.find(By::Css({:?})).await?.send_keys({}).await?;\n",
                selector, value_expr
            ),
            Action::Press => format!(
                "    driver.action_chain().send_keys(\"\\u{{E007}}\").perform().await?; // {}\n",
                step.intent.value.clone().unwrap_or_else(|| "Enter".to_string())
            ),
            Action::Select => format!(
                "    driver.find(By::Css({:?})).await?.send_keys({}).await?;\n",
                selector, value_expr
            ),
            Action::Check | Action::Uncheck => format!(
                "    driver.find(By::Css({:?})).await?.click().await?;\n",
                selector
            ),
            Action::Hover | Action::Focus => format!(
                "    driver.find(By::Css({:?})).await?.scroll_into_view().await?;\n",
                selector
            ),
            Action::Wait => format!(
                "    // assert outcome: {}\n",
                step.outcome
            ),
            Action::Navigate => format!(
                "    driver.goto({}).await?;\n",
                value_expr
            ),
        };
        out.push_str(&line);
    }

    out.push_str("    driver.quit().await?;\n");
    out.push_str("    Ok(())\n");
    out.push_str("}\n");
    out
}

/// Content hash of an artifact.
pub fn artifact_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Emits the artifact for passing/healed runs and records its reference.
pub struct Generator;

impl Generator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for Generator {
    fn tag(&self) -> NodeTag {
        NodeTag::Generator
    }

    async fn run(&self, state: &mut RunState, caps: &RunCapabilities) {
        if !matches!(state.verdict, Some(Verdict::Pass) | Some(Verdict::Healed)) {
            return;
        }

        let source = render_artifact(state);
        let hash = artifact_hash(&source);
        let path = format!("{}.rs", state.req_id);

        if let Err(e) = caps
            .store
            .insert_artifact(&state.req_id, "test_source", &path, &hash)
        {
            tracing::warn!(error = %e, "artifact record dropped");
        }

        caps.events.emit(
            RunEvent::new(
                RunEventType::Result,
                &state.req_id,
                state.step_idx,
                format!("artifact rendered ({} bytes)", source.len()),
            )
            .with_metadata("hash", hash),
        );
        state.set_context("artifact_source", source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Strategy;
    use crate::plan::Intent;
    use crate::state::ExecutedStep;

    fn passing_state() -> RunState {
        let mut state = RunState::new("req-gen-1");
        state.set_context("url", "https://en.wikipedia.org");
        state.plan_hash = "abc".to_string();
        state.plan = vec![
            Intent::new("Search", Action::Fill).with_value("AI"),
            Intent::new("Search", Action::Press).with_value("Enter"),
        ];
        state.executed_steps = vec![
            ExecutedStep {
                intent: state.plan[0].clone(),
                selector: "[name=\"search\"]".to_string(),
                strategy: Some(Strategy::NameAttr),
                ms: 10,
                outcome: "ok".to_string(),
                pattern: Some("direct_fill".to_string()),
            },
            ExecutedStep {
                intent: state.plan[1].clone(),
                selector: "[name=\"search\"]".to_string(),
                strategy: Some(Strategy::NameAttr),
                ms: 12,
                outcome: "ok".to_string(),
                pattern: Some("submit_hint".to_string()),
            },
        ];
        state.step_idx = 2;
        state.verdict = Some(Verdict::Pass);
        state
    }

    #[test]
    fn test_render_is_deterministic_and_replayable() {
        let state = passing_state();
        let a = render_artifact(&state);
        let b = render_artifact(&state);
        assert_eq!(a, b);
        assert!(a.contains("driver.goto(\"https://en.wikipedia.org\")"));
        assert!(a.contains("[name=\\\"search\\\"]"));
        assert!(a.contains("#[tokio::test]"));
    }

    #[test]
    fn test_secret_values_never_rendered() {
        let mut state = passing_state();
        state.executed_steps[0].intent.secret = true;
        state.executed_steps[0].intent.value = Some("hunter2".to_string());

        let source = render_artifact(&state);
        assert!(!source.contains("hunter2"));
        assert!(source.contains("PACTS_SECRET_"));
    }

    #[test]
    fn test_artifact_hash_tracks_content() {
        let state = passing_state();
        let source = render_artifact(&state);
        assert_eq!(artifact_hash(&source), artifact_hash(&source));
        assert_ne!(artifact_hash(&source), artifact_hash("other"));
    }
}
