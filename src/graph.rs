//! The agent graph: six nodes, conditional routing, a bounded run loop.
//!
//! Nodes share a uniform signature (`RunState` in, `RunState` out, never
//! raising) and the graph is a table of node -> router built once and
//! immutable thereafter. The executor/healer loop is the only cycle and
//! is bounded by the healing budget plus a run-level wall-clock cap.

use crate::browser::BrowserDriver;
use crate::config::RuntimeConfig;
use crate::memory::{HealLedger, SelectorCache, SqliteStore};
use crate::state::{Rca, RcaClass, RunState, Verdict};
use crate::telemetry::EventSink;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Graph node identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Planner,
    PomBuilder,
    Executor,
    OracleHealer,
    VerdictRca,
    Generator,
    End,
}

impl std::fmt::Display for NodeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Planner => "planner",
            Self::PomBuilder => "pom_builder",
            Self::Executor => "executor",
            Self::OracleHealer => "oracle_healer",
            Self::VerdictRca => "verdict_rca",
            Self::Generator => "generator",
            Self::End => "end",
        };
        write!(f, "{}", s)
    }
}

/// Capability handles a run receives from the orchestrator.
///
/// Nothing in here is a process-wide singleton; tests wire in-memory
/// fakes through the same structure.
#[derive(Clone)]
pub struct RunCapabilities {
    pub driver: Arc<dyn BrowserDriver>,
    pub cache: Arc<SelectorCache>,
    pub ledger: Arc<HealLedger>,
    pub store: Arc<SqliteStore>,
    pub config: Arc<RuntimeConfig>,
    pub events: EventSink,
}

/// A graph node. Implementations translate every internal failure into
/// `RunState` fields; `run` must not panic and has no error channel.
#[async_trait]
pub trait Agent: Send + Sync {
    fn tag(&self) -> NodeTag;
    async fn run(&self, state: &mut RunState, caps: &RunCapabilities);
}

/// Conditional routing after a node completes.
pub fn route(tag: NodeTag, state: &RunState, max_heal_rounds: u32) -> NodeTag {
    match tag {
        NodeTag::Planner | NodeTag::PomBuilder => {
            if state.verdict.is_some() {
                NodeTag::VerdictRca
            } else if tag == NodeTag::Planner {
                NodeTag::PomBuilder
            } else {
                NodeTag::Executor
            }
        }
        NodeTag::Executor => {
            if state.verdict.is_some() {
                NodeTag::VerdictRca
            } else if state.failure.is_some() {
                if state.heal_round < max_heal_rounds {
                    NodeTag::OracleHealer
                } else {
                    NodeTag::VerdictRca
                }
            } else {
                NodeTag::VerdictRca
            }
        }
        NodeTag::OracleHealer => {
            if state.failure.is_none() && state.verdict.is_none() {
                NodeTag::Executor
            } else if state.failure.is_some() && state.heal_round < max_heal_rounds {
                // Healer appended a failed cycle but budget remains.
                NodeTag::OracleHealer
            } else {
                NodeTag::VerdictRca
            }
        }
        NodeTag::VerdictRca => match state.verdict {
            Some(Verdict::Pass) | Some(Verdict::Healed) => NodeTag::Generator,
            _ => NodeTag::End,
        },
        NodeTag::Generator | NodeTag::End => NodeTag::End,
    }
}

/// The built graph: agents registered by tag, run under a hard cap.
pub struct AgentGraph {
    agents: Vec<Box<dyn Agent>>,
    max_heal_rounds: u32,
}

impl AgentGraph {
    pub fn new(agents: Vec<Box<dyn Agent>>, max_heal_rounds: u32) -> Self {
        Self {
            agents,
            max_heal_rounds,
        }
    }

    fn agent_for(&self, tag: NodeTag) -> Option<&dyn Agent> {
        self.agents.iter().find(|a| a.tag() == tag).map(|a| a.as_ref())
    }

    /// Drive the state through the graph until END.
    ///
    /// The run-level cap is `plan.len() x per-step budget`; exceeding it
    /// aborts with `verdict = error`. A transition-count backstop catches
    /// any routing bug the budgets miss.
    pub async fn run(&self, state: &mut RunState, caps: &RunCapabilities) {
        let started = Instant::now();
        let mut tag = NodeTag::Planner;
        let mut transitions: u32 = 0;

        while tag != NodeTag::End {
            let profile = state.profile();
            let cap = profile.budgets().per_step * (state.plan.len().max(1) as u32);
            if started.elapsed() > cap && state.verdict.is_none() {
                tracing::error!(req_id = %state.req_id, "run-level budget exceeded");
                state.verdict = Some(Verdict::Error);
                state.rca = Some(Rca {
                    class: RcaClass::EnvFault,
                    confidence: 0.9,
                    notes: format!("run exceeded wall-clock cap of {:?}", cap),
                });
                break;
            }

            transitions += 1;
            let transition_cap = 16 + (state.plan.len() as u32 + 1) * (self.max_heal_rounds + 4);
            if transitions > transition_cap {
                tracing::error!(req_id = %state.req_id, "transition backstop tripped");
                state.verdict = Some(Verdict::Error);
                state.rca = Some(Rca {
                    class: RcaClass::Unknown,
                    confidence: 0.5,
                    notes: "graph transition backstop tripped".to_string(),
                });
                break;
            }

            let agent = match self.agent_for(tag) {
                Some(a) => a,
                None => {
                    state.verdict = Some(Verdict::Error);
                    state.rca = Some(Rca {
                        class: RcaClass::EnvFault,
                        confidence: 1.0,
                        notes: format!("no agent registered for node {}", tag),
                    });
                    break;
                }
            };

            tracing::debug!(req_id = %state.req_id, node = %tag, "entering node");
            agent.run(state, caps).await;
            tag = route(tag, state, self.max_heal_rounds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StepFailure;

    fn state() -> RunState {
        RunState::new("req-route")
    }

    #[test]
    fn test_happy_path_routing() {
        let mut s = state();
        assert_eq!(route(NodeTag::Planner, &s, 3), NodeTag::PomBuilder);
        assert_eq!(route(NodeTag::PomBuilder, &s, 3), NodeTag::Executor);
        assert_eq!(route(NodeTag::Executor, &s, 3), NodeTag::VerdictRca);

        s.verdict = Some(Verdict::Pass);
        assert_eq!(route(NodeTag::VerdictRca, &s, 3), NodeTag::Generator);
        assert_eq!(route(NodeTag::Generator, &s, 3), NodeTag::End);
    }

    #[test]
    fn test_planner_error_short_circuits() {
        let mut s = state();
        s.verdict = Some(Verdict::Error);
        assert_eq!(route(NodeTag::Planner, &s, 3), NodeTag::VerdictRca);
        assert_eq!(route(NodeTag::VerdictRca, &s, 3), NodeTag::End);
    }

    #[test]
    fn test_executor_failure_routes_to_healer_within_budget() {
        let mut s = state();
        s.failure = Some(StepFailure::NotVisible);
        assert_eq!(route(NodeTag::Executor, &s, 3), NodeTag::OracleHealer);

        s.heal_round = 3;
        assert_eq!(route(NodeTag::Executor, &s, 3), NodeTag::VerdictRca);
    }

    #[test]
    fn test_zero_heal_budget_skips_healer() {
        let mut s = state();
        s.failure = Some(StepFailure::Timeout);
        assert_eq!(route(NodeTag::Executor, &s, 0), NodeTag::VerdictRca);
    }

    #[test]
    fn test_healer_success_resumes_executor() {
        let mut s = state();
        s.heal_round = 1;
        assert_eq!(route(NodeTag::OracleHealer, &s, 3), NodeTag::Executor);

        s.failure = Some(StepFailure::NotVisible);
        assert_eq!(route(NodeTag::OracleHealer, &s, 3), NodeTag::OracleHealer);

        s.heal_round = 3;
        assert_eq!(route(NodeTag::OracleHealer, &s, 3), NodeTag::VerdictRca);
    }

    #[test]
    fn test_fail_verdict_skips_generator() {
        let mut s = state();
        s.verdict = Some(Verdict::Fail);
        assert_eq!(route(NodeTag::VerdictRca, &s, 3), NodeTag::End);
    }
}
