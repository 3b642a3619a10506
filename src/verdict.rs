//! The VerdictRCA agent: final classification and root-cause attribution.

use crate::graph::{Agent, NodeTag, RunCapabilities};
use crate::state::{Rca, RcaClass, RunState, StepFailure, Verdict};
use crate::telemetry::{RunEvent, RunEventType};
use async_trait::async_trait;

/// Sets `verdict` and `rca` from the finished run state. Rule-based; one
/// class per run with a confidence.
pub struct VerdictRca;

impl VerdictRca {
    pub fn new() -> Self {
        Self
    }

    fn classify_verdict(state: &RunState) -> Verdict {
        if state.all_steps_executed() {
            if state.any_heal_succeeded() {
                Verdict::Healed
            } else {
                Verdict::Pass
            }
        } else if state.context_flag("blocked") {
            Verdict::Blocked
        } else {
            Verdict::Fail
        }
    }

    fn classify_rca(state: &RunState, verdict: Verdict) -> Rca {
        let rca = |class, confidence: f64, notes: &str| Rca {
            class,
            confidence,
            notes: notes.to_string(),
        };

        if verdict == Verdict::Pass {
            return rca(RcaClass::Unknown, 1.0, "no fault observed");
        }

        if verdict == Verdict::Blocked {
            return rca(RcaClass::UiBlocked, 0.9, "external UI refusal");
        }

        // Drift evidence outranks everything: the page changed under us.
        if state.context_flag("drift_detected") {
            return rca(
                RcaClass::SelectorDrift,
                0.9,
                "cache drift event recorded during this run",
            );
        }

        if state.context_flag("sentinel_fired") {
            return rca(
                RcaClass::UiBlocked,
                0.85,
                "dialog sentinel intercepted an error dialog",
            );
        }

        if state.failure == Some(StepFailure::AssertionFail) {
            return rca(RcaClass::AssertionMismatch, 0.85, "declared outcome not met");
        }

        let has_unresolved = state
            .context
            .get("unresolved_tokens")
            .and_then(|v| v.as_array())
            .map(|a| !a.is_empty())
            .unwrap_or(false);
        if has_unresolved && verdict != Verdict::Healed {
            return rca(
                RcaClass::DataIssue,
                0.8,
                "template tokens left unresolved by the data row",
            );
        }

        if state.failure == Some(StepFailure::DiscoveryMissing) {
            return rca(
                RcaClass::DiscoveryExhausted,
                0.9,
                "no tier produced a workable selector",
            );
        }

        // Healing spent its budget without committing a new selector.
        if !state.heal_events.is_empty()
            && !state.any_heal_succeeded()
            && state
                .heal_events
                .iter()
                .all(|e| e.selector_after.is_none())
        {
            return rca(
                RcaClass::DiscoveryExhausted,
                0.85,
                "healing exhausted without a replacement selector",
            );
        }

        if matches!(
            state.failure,
            Some(StepFailure::Timeout) | Some(StepFailure::Unstable)
        ) {
            return rca(
                RcaClass::TimingInstability,
                0.7,
                "repeated transient failures without selector change",
            );
        }

        if verdict == Verdict::Healed {
            return rca(
                RcaClass::SelectorDrift,
                0.7,
                "selector replaced mid-run by healing",
            );
        }

        rca(RcaClass::Unknown, 0.4, "no matching classification rule")
    }
}

impl Default for VerdictRca {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for VerdictRca {
    fn tag(&self) -> NodeTag {
        NodeTag::VerdictRca
    }

    async fn run(&self, state: &mut RunState, caps: &RunCapabilities) {
        // A verdict set upstream (planner error, run cap) stands; only
        // attribution may still be missing.
        let verdict = match state.verdict {
            Some(v) => v,
            None => {
                // Count invariants are checked before classification;
                // violations are internal errors by definition.
                if let Err(notes) = state.check_invariants(caps.config.max_heal_rounds) {
                    state.verdict = Some(Verdict::Error);
                    state.rca = Some(Rca {
                        class: RcaClass::EnvFault,
                        confidence: 1.0,
                        notes,
                    });
                    return;
                }
                let v = Self::classify_verdict(state);
                state.verdict = Some(v);
                v
            }
        };

        if state.rca.is_none() {
            state.rca = Some(Self::classify_rca(state, verdict));
        }

        let rca = state.rca.clone();
        caps.events.emit(RunEvent::new(
            RunEventType::Verdict,
            &state.req_id,
            state.step_idx,
            format!(
                "{} (rca: {}, confidence {:.2})",
                verdict,
                rca.as_ref().map(|r| r.class.to_string()).unwrap_or_default(),
                rca.as_ref().map(|r| r.confidence).unwrap_or_default(),
            ),
        ));
        caps.events.emit(RunEvent::new(
            RunEventType::Result,
            &state.req_id,
            state.step_idx,
            format!(
                "{} steps executed, {} heal cycles, exit code {}",
                state.executed_steps.len(),
                state.heal_events.len(),
                verdict.exit_code()
            ),
        ));
    }
}
