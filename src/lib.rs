//! # pacts-core
//!
//! An autonomous web test-automation runtime. Given a structured
//! requirement (URL + ordered steps + expected outcomes + data rows), it
//! drives a browser to discover stable element selectors, execute the
//! steps, self-heal when an element fails its actionability
//! preconditions, classify the run with a root cause, and emit a
//! replayable test artifact plus persistent telemetry.
//!
//! ## Core Components
//!
//! - **Plan**: Suite input, template expansion, and the Planner agent
//! - **Discovery**: the eight-tier selector waterfall plus ordinal tier
//! - **Gate**: three-stage readiness and five-point actionability
//! - **Memory**: dual-tier selector cache, drift detection, heal ledger
//! - **Graph**: the six-agent orchestration loop over a shared `RunState`
//!
//! ## Example
//!
//! ```rust,ignore
//! use pacts_core::{PactsRuntime, RuntimeConfig, SqliteStore, Suite};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open("pacts.db")?);
//! let runtime = PactsRuntime::new(driver, store, RuntimeConfig::default());
//!
//! let suite: Suite = serde_json::from_str(&input)?;
//! let runs = runtime.run_suite(&suite, "https://en.wikipedia.org").await;
//! for run in &runs {
//!     println!("{}: {:?}", run.req_id, run.verdict);
//! }
//! ```

pub mod browser;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod gate;
pub mod generator;
pub mod graph;
pub mod healer;
pub mod memory;
pub mod plan;
pub mod pombuilder;
pub mod profile;
pub mod redact;
pub mod runtime;
pub mod state;
pub mod telemetry;
pub mod verdict;

// Re-exports for convenience
pub use browser::{BoundingBox, BrowserDriver, ElementSnapshot, FakeBrowser, FakeElement, FakePage};
pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use discovery::{
    DiscoveryEngine, DiscoveryOptions, FuzzyMatch, MatchKind, SelectorMeta, SelectorRecord,
    Strategy,
};
pub use error::{Error, Result};
pub use executor::{Executor, PatternResult};
pub use gate::{DialogSentinel, GateResult, SentinelHit};
pub use generator::{artifact_hash, render_artifact, Generator};
pub use graph::{Agent, AgentGraph, NodeTag, RunCapabilities};
pub use healer::OracleHealer;
pub use memory::{
    normalize_url_pattern, CacheEntry, CacheKey, CacheStats, HealLedger, RunRow, RunStepRow,
    SelectorCache, SqliteStore,
};
pub use plan::{
    expand_suite, parse_legacy_steps, plan_hash, Action, Intent, Outcome, Planner, PlannerAgent,
    StepSpec, Suite, TestCase,
};
pub use pombuilder::PomBuilder;
pub use profile::{ProfileBudgets, ProfileDetector, RuntimeProfile};
pub use runtime::PactsRuntime;
pub use state::{
    ExecutedStep, HealEvent, Rca, RcaClass, RunState, StepFailure, Verdict,
};
pub use telemetry::{event_stream, EventSink, RunEvent, RunEventStream, RunEventType};
pub use verdict::VerdictRca;

#[cfg(feature = "webdriver")]
pub use browser::WebDriverSession;
