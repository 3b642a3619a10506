//! Suite expansion and the Planner agent.

use super::types::{Action, Intent, Outcome, StepSpec, Suite};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::LazyLock;

// Lazy-initialized grammar patterns
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("invalid regex"));

static ORDINAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|(\d+)(?:st|nd|rd|th))\s+(.+)$",
    )
    .expect("invalid regex")
});

static OPENER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(new|add|create|open|launcher|edit)\b").expect("invalid regex"));

static CLOSER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(save|submit|close|cancel|done)\b").expect("invalid regex"));

/// One testcase × data-row expansion, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedPlan {
    /// `<testcase id>#<row index>`.
    pub id: String,
    /// Bound intents, before planner decoration.
    pub intents: Vec<Intent>,
}

/// Substitute `{{name}}` tokens with row values; missing tokens stay literal.
fn bind_template(template: &str, row: &HashMap<String, String>) -> (String, Vec<String>) {
    let mut unresolved = Vec::new();

    let out = TOKEN_PATTERN
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match row.get(name) {
                Some(value) => value.clone(),
                None => {
                    unresolved.push(name.to_string());
                    caps[0].to_string()
                }
            }
        })
        .into_owned();

    (out, unresolved)
}

/// Which row keys a template actually references.
fn referenced_keys(template: &str) -> Vec<String> {
    TOKEN_PATTERN
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Expand a suite into independent plans, one per testcase × data row.
///
/// Template binding happens here; ordinal decoration, synthetic assertion
/// steps, and scope propagation are applied later by [`Planner::plan`].
/// Returns the expanded plans plus, per plan, the tokens left unresolved.
pub fn expand_suite(
    suite: &Suite,
    config: &RuntimeConfig,
) -> Vec<(ExpandedPlan, Vec<String>)> {
    let mut plans = Vec::new();

    for testcase in &suite.testcases {
        let rows: Vec<HashMap<String, String>> = if testcase.data.is_empty() {
            vec![HashMap::new()]
        } else {
            testcase.data.clone()
        };

        for (row_idx, row) in rows.iter().enumerate() {
            let mut intents = Vec::new();
            let mut unresolved_all = Vec::new();

            for step in &testcase.steps {
                let (target, mut unresolved) = bind_template(&step.target, row);
                unresolved_all.append(&mut unresolved);

                let mut intent = Intent::new(target, step.action);

                if let Some(value_template) = &step.value {
                    let (value, mut unresolved) = bind_template(value_template, row);
                    unresolved_all.append(&mut unresolved);
                    intent.secret = referenced_keys(value_template)
                        .iter()
                        .any(|k| row.contains_key(k) && config.is_secret_key(k));
                    intent.value = Some(value);
                }

                if let Some(outcome_token) = &step.outcome {
                    intent.outcome = Outcome::parse(outcome_token);
                }

                intents.push(intent);
            }

            plans.push((
                ExpandedPlan {
                    id: format!("{}#{}", testcase.id, row_idx),
                    intents,
                },
                unresolved_all,
            ));
        }
    }

    plans
}

/// Parse legacy newline-separated `"element | action | value"` descriptors.
pub fn parse_legacy_steps(input: &str) -> Result<Vec<Intent>> {
    let mut intents = Vec::new();

    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 2 {
            return Err(Error::PlanInput(format!(
                "line {}: expected \"element | action | value\", got {:?}",
                line_no + 1,
                line
            )));
        }

        let action: Action = parts[1]
            .parse()
            .map_err(|e| Error::PlanInput(format!("line {}: {}", line_no + 1, e)))?;

        let mut intent = Intent::new(parts[0], action);
        if let Some(value) = parts.get(2).filter(|v| !v.is_empty()) {
            intent.value = Some((*value).to_string());
        }
        if let Some(outcome) = parts.get(3).and_then(|t| Outcome::parse(t)) {
            intent.outcome = Some(outcome);
        }
        intents.push(intent);
    }

    Ok(intents)
}

/// Deterministic content hash of an instantiated plan.
pub fn plan_hash(intents: &[Intent]) -> String {
    let canonical = serde_json::to_string(intents).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The Planner: binds data, decorates ordinals, derives assertion steps.
///
/// It never rewrites step intent; it only adds the decorations the rest of
/// the pipeline keys on.
#[derive(Debug, Clone, Copy)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Apply planner rules to bound intents, producing the frozen plan.
    ///
    /// - ordinal grammar decoration (`first video result` -> ordinal 0,
    ///   type hint `video result`; the literal name is preserved)
    /// - `navigates_to:X` expands a synthetic `wait` assertion step with
    ///   outcome `page_contains_text:X` immediately after the step
    /// - scope hints propagate to steps following a modal-opening click
    ///   until a closing click, for intents without their own hint
    pub fn plan(&self, bound: Vec<Intent>) -> Vec<Intent> {
        let mut plan = Vec::with_capacity(bound.len());
        let mut active_scope: Option<String> = None;

        for mut intent in bound {
            // Ordinal grammar
            let literal_name = intent.element_name.clone();
            if let Some(caps) = ORDINAL_PATTERN.captures(&literal_name) {
                let ordinal = match caps.get(2) {
                    Some(n) => n.as_str().parse::<usize>().ok().map(|n| n.saturating_sub(1)),
                    None => word_ordinal(&caps[1]),
                };
                if let Some(ordinal) = ordinal {
                    intent.ordinal = Some(ordinal);
                    intent.element_type_hint = Some(caps[3].trim().to_string());
                }
            }

            // Scope propagation
            let is_click_like = matches!(intent.action, Action::Click | Action::Press);
            let opens = is_click_like && OPENER_PATTERN.is_match(&intent.element_name);
            let closes = is_click_like && CLOSER_PATTERN.is_match(&intent.element_name);

            if intent.scope_hint.is_none() {
                if let Some(scope) = &active_scope {
                    // The opener itself is found in the page, not the modal.
                    intent.scope_hint = Some(scope.clone());
                }
            }
            if opens {
                active_scope = Some(intent.element_name.clone());
            } else if closes {
                active_scope = None;
            }

            // Synthetic assertion step for navigation outcomes
            let synthetic = match &intent.outcome {
                Some(Outcome::NavigatesTo(token)) => {
                    let mut assertion = Intent::new(intent.element_name.clone(), Action::Wait);
                    assertion.outcome = Some(Outcome::PageContainsText(token.clone()));
                    Some(assertion)
                }
                _ => None,
            };

            plan.push(intent);
            if let Some(assertion) = synthetic {
                plan.push(assertion);
            }
        }

        plan
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

/// The Planner graph node.
///
/// Reads bound intents (structured mode) or raw legacy lines from the run
/// context, applies planner rules, and freezes the plan with its content
/// hash. Emits `verdict = error` when neither input is present.
pub struct PlannerAgent {
    planner: Planner,
}

impl PlannerAgent {
    pub fn new() -> Self {
        Self {
            planner: Planner::new(),
        }
    }
}

impl Default for PlannerAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl crate::graph::Agent for PlannerAgent {
    fn tag(&self) -> crate::graph::NodeTag {
        crate::graph::NodeTag::Planner
    }

    async fn run(&self, state: &mut crate::state::RunState, _caps: &crate::graph::RunCapabilities) {
        use crate::state::{Rca, RcaClass, Verdict};

        let bound: Option<Vec<Intent>> = state
            .context
            .get("bound_steps")
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        let bound = match bound {
            Some(intents) => intents,
            None => match state.context.get("raw_steps").and_then(|v| v.as_str()) {
                Some(raw) => match parse_legacy_steps(raw) {
                    Ok(intents) => intents,
                    Err(e) => {
                        state.verdict = Some(Verdict::Error);
                        state.rca = Some(Rca {
                            class: RcaClass::DataIssue,
                            confidence: 1.0,
                            notes: format!("legacy step input unparseable: {}", e),
                        });
                        return;
                    }
                },
                None => {
                    state.verdict = Some(Verdict::Error);
                    state.rca = Some(Rca {
                        class: RcaClass::DataIssue,
                        confidence: 1.0,
                        notes: "neither a suite nor raw steps were provided".to_string(),
                    });
                    return;
                }
            },
        };

        let plan = self.planner.plan(bound);
        if plan.is_empty() {
            state.verdict = Some(Verdict::Error);
            state.rca = Some(Rca {
                class: RcaClass::DataIssue,
                confidence: 1.0,
                notes: "plan expanded to zero steps".to_string(),
            });
            return;
        }

        state.plan_hash = plan_hash(&plan);
        state.plan = plan.clone();
        state.intents = plan;
        state.discovered = vec![None; state.plan.len()];

        tracing::info!(
            req_id = %state.req_id,
            steps = state.plan.len(),
            plan_hash = %&state.plan_hash[..12.min(state.plan_hash.len())],
            "plan frozen"
        );
    }
}

fn word_ordinal(word: &str) -> Option<usize> {
    let idx = match word.to_lowercase().as_str() {
        "first" => 0,
        "second" => 1,
        "third" => 2,
        "fourth" => 3,
        "fifth" => 4,
        "sixth" => 5,
        "seventh" => 6,
        "eighth" => 7,
        "ninth" => 8,
        "tenth" => 9,
        _ => return None,
    };
    Some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn suite_with_row(value_template: &str, row: &[(&str, &str)]) -> Suite {
        Suite {
            testcases: vec![crate::plan::TestCase {
                id: "tc".to_string(),
                steps: vec![StepSpec {
                    target: "Username".to_string(),
                    action: Action::Fill,
                    value: Some(value_template.to_string()),
                    outcome: None,
                }],
                outcomes: vec![],
                data: vec![row
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()],
            }],
        }
    }

    #[test]
    fn test_template_binding() {
        let suite = suite_with_row("{{user}}", &[("user", "alice")]);
        let plans = expand_suite(&suite, &RuntimeConfig::default());
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].0.intents[0].value.as_deref(), Some("alice"));
        assert!(plans[0].1.is_empty());
    }

    #[test]
    fn test_missing_token_stays_literal() {
        let suite = suite_with_row("{{missing}}", &[("user", "alice")]);
        let plans = expand_suite(&suite, &RuntimeConfig::default());
        assert_eq!(plans[0].0.intents[0].value.as_deref(), Some("{{missing}}"));
        assert_eq!(plans[0].1, vec!["missing".to_string()]);
    }

    #[test]
    fn test_secret_flag_from_row_key() {
        let suite = suite_with_row("{{password}}", &[("password", "hunter2")]);
        let plans = expand_suite(&suite, &RuntimeConfig::default());
        assert!(plans[0].0.intents[0].secret);

        let suite = suite_with_row("{{user}}", &[("user", "alice")]);
        let plans = expand_suite(&suite, &RuntimeConfig::default());
        assert!(!plans[0].0.intents[0].secret);
    }

    #[test]
    fn test_multiple_rows_multiple_plans() {
        let mut suite = suite_with_row("{{user}}", &[("user", "alice")]);
        suite.testcases[0]
            .data
            .push([("user".to_string(), "bob".to_string())].into_iter().collect());

        let plans = expand_suite(&suite, &RuntimeConfig::default());
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].0.id, "tc#0");
        assert_eq!(plans[1].0.id, "tc#1");
    }

    #[test]
    fn test_legacy_parsing() {
        let intents =
            parse_legacy_steps("Search Wikipedia | fill | Artificial Intelligence\nSearch Wikipedia | press | Enter")
                .unwrap();
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].action, Action::Fill);
        assert_eq!(intents[1].value.as_deref(), Some("Enter"));
    }

    #[test]
    fn test_legacy_rejects_malformed_line() {
        assert!(parse_legacy_steps("just some words").is_err());
    }

    #[test]
    fn test_plan_hash_deterministic() {
        let intents = vec![
            Intent::new("Search", Action::Fill).with_value("rust"),
            Intent::new("Search", Action::Press).with_value("Enter"),
        ];
        assert_eq!(plan_hash(&intents), plan_hash(&intents.clone()));
    }

    #[test]
    fn test_ordinal_decoration() {
        let planner = Planner::new();
        let plan = planner.plan(vec![Intent::new("first video result", Action::Click)]);
        assert_eq!(plan[0].ordinal, Some(0));
        assert_eq!(plan[0].element_type_hint.as_deref(), Some("video result"));
        // Literal name preserved for logging
        assert_eq!(plan[0].element_name, "first video result");

        let plan = planner.plan(vec![Intent::new("3rd item", Action::Click)]);
        assert_eq!(plan[0].ordinal, Some(2));
    }

    #[test]
    fn test_navigates_to_expands_assertion_step() {
        let planner = Planner::new();
        let plan = planner.plan(vec![Intent::new("Go", Action::Click)
            .with_outcome(Outcome::NavigatesTo("watch".to_string()))]);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].action, Action::Wait);
        assert_eq!(
            plan[1].outcome,
            Some(Outcome::PageContainsText("watch".to_string()))
        );
    }

    #[test]
    fn test_scope_propagation_after_opener() {
        let planner = Planner::new();
        let plan = planner.plan(vec![
            Intent::new("App Launcher", Action::Click),
            Intent::new("Account Name", Action::Fill).with_value("Acme"),
            Intent::new("Save", Action::Click),
            Intent::new("Search", Action::Fill).with_value("after modal"),
        ]);

        assert_eq!(plan[0].scope_hint, None);
        assert_eq!(plan[1].scope_hint.as_deref(), Some("App Launcher"));
        assert_eq!(plan[2].scope_hint.as_deref(), Some("App Launcher"));
        // Scope cleared after the closing click
        assert_eq!(plan[3].scope_hint, None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn plan_hash_is_stable_across_reserialization(
                name in "[a-zA-Z ]{1,24}",
                value in "[a-zA-Z0-9 ]{0,24}",
            ) {
                let intents = vec![Intent::new(name, Action::Fill).with_value(value)];
                let first = plan_hash(&intents);
                let rehydrated: Vec<Intent> = serde_json::from_str(
                    &serde_json::to_string(&intents).unwrap()
                ).unwrap();
                prop_assert_eq!(first, plan_hash(&rehydrated));
            }
        }
    }
}
