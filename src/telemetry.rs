//! Run event types for observable PACTS execution.
//!
//! The event stream can be rendered differently depending on the deployment
//! context:
//! - CLI: streaming log lines through `tracing`
//! - Observability facade: JSON export read from the run record store
//! - Tests: collected into a `Vec` for assertions

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Types of events emitted during a PACTS run.
///
/// The `Display` form is the bracketed tag that prefixes structured log
/// entries, e.g. `[DISCOVERY]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEventType {
    /// Runtime profile classified for the target URL
    Profile,
    /// Discovery tier walk progress or result
    Discovery,
    /// Selector cache hit/miss/invalidation
    Cache,
    /// Readiness stage outcome
    Readiness,
    /// Actionability gate outcome
    Gate,
    /// Step execution
    Exec,
    /// Healing cycle activity
    Heal,
    /// Verdict and RCA classification
    Verdict,
    /// Final run result
    Result,
}

impl std::fmt::Display for RunEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Profile => "[PROFILE]",
            Self::Discovery => "[DISCOVERY]",
            Self::Cache => "[CACHE]",
            Self::Readiness => "[READINESS]",
            Self::Gate => "[GATE]",
            Self::Exec => "[EXEC]",
            Self::Heal => "[HEAL]",
            Self::Verdict => "[VERDICT]",
            Self::Result => "[RESULT]",
        };
        write!(f, "{}", s)
    }
}

/// A single event emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Type of the event
    pub event_type: RunEventType,
    /// External correlation key of the run
    pub req_id: String,
    /// Plan cursor at emission time
    pub step_idx: usize,
    /// Human-readable content describing the event
    pub content: String,
    /// Event-specific metadata (strategy name, timing, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    /// Create a new run event.
    pub fn new(
        event_type: RunEventType,
        req_id: impl Into<String>,
        step_idx: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            req_id: req_id.into(),
            step_idx,
            content: content.into(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// Add metadata to the event.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Record the strategy that produced this event.
    pub fn with_strategy(self, strategy: impl Into<String>) -> Self {
        self.with_metadata("strategy", strategy.into())
    }

    /// Record elapsed milliseconds.
    pub fn with_ms(self, ms: u64) -> Self {
        self.with_metadata("ms", ms)
    }

    /// Get a metadata value.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref()?.get(key)
    }
}

/// Sink for run events.
///
/// Always logs through `tracing`; optionally forwards into a channel so a
/// caller can observe the stream (the observability facade and the test
/// suite both consume events this way).
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<RunEvent>>,
}

impl EventSink {
    /// Create a sink that only logs.
    pub fn new() -> Self {
        Self { tx: None }
    }

    /// Create a sink that also forwards events into the given channel.
    pub fn with_channel(tx: UnboundedSender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Emit an event.
    pub fn emit(&self, event: RunEvent) {
        tracing::info!(
            target: "pacts",
            req_id = %event.req_id,
            step_idx = event.step_idx,
            "{} {}",
            event.event_type,
            event.content
        );
        if let Some(tx) = &self.tx {
            // A closed receiver is not an error; the run outlives observers.
            let _ = tx.send(event);
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("forwarding", &self.tx.is_some())
            .finish()
    }
}

/// A boxed stream of run events.
pub type RunEventStream = Pin<Box<dyn Stream<Item = RunEvent> + Send>>;

/// Adapt a channel receiver into a [`RunEventStream`]. The stream ends
/// when every connected sink is dropped.
pub fn event_stream(rx: UnboundedReceiver<RunEvent>) -> RunEventStream {
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }))
}
