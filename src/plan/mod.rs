//! Plan input model and the Planner agent.
//!
//! A `Suite` is the structured input format (testcases with templated steps
//! and data rows); the legacy format is newline-separated
//! `"element | action | value"` strings. Expansion binds data rows into
//! independent, content-hashed plans of [`Intent`]s.

mod planner;
mod types;

pub use planner::{expand_suite, parse_legacy_steps, plan_hash, ExpandedPlan, Planner, PlannerAgent};
pub use types::{Action, Intent, Outcome, StepSpec, Suite, TestCase};
