//! The shared run state passed between graph nodes.

use crate::discovery::{SelectorRecord, Strategy};
use crate::plan::Intent;
use crate::profile::RuntimeProfile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Reason the Executor yielded control to the Healer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFailure {
    NotUnique,
    NotVisible,
    Disabled,
    Unstable,
    NotScoped,
    Timeout,
    DiscoveryMissing,
    AssertionFail,
}

impl StepFailure {
    /// Transient failures get same-selector retries before healing.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unstable)
    }
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotUnique => "not_unique",
            Self::NotVisible => "not_visible",
            Self::Disabled => "disabled",
            Self::Unstable => "unstable",
            Self::NotScoped => "not_scoped",
            Self::Timeout => "timeout",
            Self::DiscoveryMissing => "discovery_missing",
            Self::AssertionFail => "assertion_fail",
        };
        write!(f, "{}", s)
    }
}

/// Final classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Healed,
    Blocked,
    Error,
}

impl Verdict {
    /// Driver binary exit-code mapping.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Pass | Self::Healed => 0,
            Self::Fail | Self::Blocked => 1,
            Self::Error => 2,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Healed => "healed",
            Self::Blocked => "blocked",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Root-cause class for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RcaClass {
    SelectorDrift,
    TimingInstability,
    AssertionMismatch,
    DataIssue,
    EnvFault,
    DiscoveryExhausted,
    UiBlocked,
    Unknown,
}

impl std::fmt::Display for RcaClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SelectorDrift => "selector_drift",
            Self::TimingInstability => "timing_instability",
            Self::AssertionMismatch => "assertion_mismatch",
            Self::DataIssue => "data_issue",
            Self::EnvFault => "env_fault",
            Self::DiscoveryExhausted => "discovery_exhausted",
            Self::UiBlocked => "ui_blocked",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Root-cause attribution with confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rca {
    pub class: RcaClass,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub notes: String,
}

/// One successfully executed step (append-only log).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedStep {
    pub intent: Intent,
    pub selector: String,
    /// Discovery strategy behind the selector; None for assertion-only steps.
    pub strategy: Option<Strategy>,
    pub ms: u64,
    /// `"ok"` or the verified outcome token.
    pub outcome: String,
    /// Interaction pattern the executor dispatched to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// One healing cycle record (append-only log).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealEvent {
    pub round: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub success: bool,
    pub reason: String,
}

/// The shared graph state. Each agent consumes and returns it; failures
/// travel through `failure`/`verdict`, never as raised errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// External correlation key.
    pub req_id: String,
    /// Frozen after the Planner runs.
    pub plan: Vec<Intent>,
    /// Working copy the POMBuilder walks.
    pub intents: Vec<Intent>,
    /// One slot per plan step, filled as discovery completes.
    pub discovered: Vec<Option<SelectorRecord>>,
    /// Cursor into the plan during execution.
    pub step_idx: usize,
    /// Healing cycles entered for the current step; reset to zero when a
    /// step completes, so every step gets the full budget.
    pub heal_round: u32,
    /// Why the Executor yielded, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    pub executed_steps: Vec<ExecutedStep>,
    pub heal_events: Vec<HealEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rca: Option<Rca>,
    /// Scratchpad for extensions (URL, storage-state path, sentinel flags).
    pub context: HashMap<String, Value>,
    /// Content hash of the frozen plan.
    pub plan_hash: String,
}

impl RunState {
    /// Create a fresh state for a run.
    pub fn new(req_id: impl Into<String>) -> Self {
        Self {
            req_id: req_id.into(),
            plan: Vec::new(),
            intents: Vec::new(),
            discovered: Vec::new(),
            step_idx: 0,
            heal_round: 0,
            failure: None,
            executed_steps: Vec::new(),
            heal_events: Vec::new(),
            verdict: None,
            rca: None,
            context: HashMap::new(),
            plan_hash: String::new(),
        }
    }

    /// Target URL for the run, from the context scratchpad.
    pub fn url(&self) -> Option<&str> {
        self.context.get("url").and_then(|v| v.as_str())
    }

    /// Set a context value.
    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.insert(key.into(), value.into());
    }

    /// Runtime profile recorded at detection time; Static until then.
    pub fn profile(&self) -> RuntimeProfile {
        match self.context.get("profile").and_then(|v| v.as_str()) {
            Some("DYNAMIC") => RuntimeProfile::Dynamic,
            _ => RuntimeProfile::Static,
        }
    }

    /// Record the detected runtime profile.
    pub fn set_profile(&mut self, profile: RuntimeProfile) {
        self.set_context("profile", profile.to_string());
    }

    /// Whether a context flag is set truthy.
    pub fn context_flag(&self, key: &str) -> bool {
        self.context
            .get(key)
            .map(|v| v.as_bool().unwrap_or(!v.is_null()))
            .unwrap_or(false)
    }

    /// The selector record for the current step, if discovered.
    pub fn current_record(&self) -> Option<&SelectorRecord> {
        self.discovered.get(self.step_idx).and_then(|r| r.as_ref())
    }

    /// Replace the selector record for the current step (healing commit).
    pub fn replace_current_record(&mut self, record: SelectorRecord) {
        if self.step_idx < self.discovered.len() {
            self.discovered[self.step_idx] = Some(record);
        }
    }

    /// Whether every plan step has executed.
    pub fn all_steps_executed(&self) -> bool {
        !self.plan.is_empty() && self.executed_steps.len() == self.plan.len()
    }

    /// Whether any healing cycle committed a new selector.
    pub fn any_heal_succeeded(&self) -> bool {
        self.heal_events.iter().any(|e| e.success)
    }

    /// Cross-check the run-state invariants; returns the first violation.
    ///
    /// Used by tests and by the verdict node's internal-error detection.
    pub fn check_invariants(&self, max_heal_rounds: u32) -> std::result::Result<(), String> {
        if self.executed_steps.len() > self.plan.len() {
            return Err(format!(
                "executed_steps ({}) exceeds plan ({})",
                self.executed_steps.len(),
                self.plan.len()
            ));
        }
        if self.heal_round > max_heal_rounds {
            return Err(format!(
                "heal_round {} exceeds budget {}",
                self.heal_round, max_heal_rounds
            ));
        }
        match self.verdict {
            Some(Verdict::Pass) => {
                if !self.all_steps_executed() {
                    return Err("pass verdict with unexecuted steps".to_string());
                }
                if self.any_heal_succeeded() {
                    return Err("pass verdict with a successful heal".to_string());
                }
                if self.heal_round != 0 {
                    return Err("pass verdict with a nonzero heal counter".to_string());
                }
            }
            Some(Verdict::Healed) => {
                if !self.all_steps_executed() {
                    return Err("healed verdict with unexecuted steps".to_string());
                }
                if !self.any_heal_succeeded() {
                    return Err("healed verdict without a successful heal".to_string());
                }
            }
            _ => {}
        }
        Ok(())
    }
}
