//! Intent, Suite, and outcome types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Browser actions a step can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Click,
    Fill,
    Type,
    Press,
    Select,
    Check,
    Uncheck,
    Hover,
    Focus,
    Wait,
    Navigate,
}

impl Action {
    /// Whether this action writes into an editable element.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Fill | Self::Type | Self::Select)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Click => "click",
            Self::Fill => "fill",
            Self::Type => "type",
            Self::Press => "press",
            Self::Select => "select",
            Self::Check => "check",
            Self::Uncheck => "uncheck",
            Self::Hover => "hover",
            Self::Focus => "focus",
            Self::Wait => "wait",
            Self::Navigate => "navigate",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "click" => Ok(Self::Click),
            "fill" => Ok(Self::Fill),
            "type" => Ok(Self::Type),
            "press" => Ok(Self::Press),
            "select" => Ok(Self::Select),
            "check" => Ok(Self::Check),
            "uncheck" => Ok(Self::Uncheck),
            "hover" => Ok(Self::Hover),
            "focus" => Ok(Self::Focus),
            "wait" => Ok(Self::Wait),
            "navigate" => Ok(Self::Navigate),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// Expected outcome attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// Read back the field value and compare with the step value.
    FieldPopulated,
    /// A navigation whose destination URL contains the token.
    NavigatesTo(String),
    /// The DOM contains the given text.
    PageContainsText(String),
}

impl Outcome {
    /// Parse the outcome token grammar (`field_populated`,
    /// `navigates_to:X`, `page_contains_text:X`). Unknown tokens are None.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.eq_ignore_ascii_case("field_populated") {
            return Some(Self::FieldPopulated);
        }
        if let Some(rest) = token.strip_prefix("navigates_to:") {
            return Some(Self::NavigatesTo(rest.trim().to_string()));
        }
        if let Some(rest) = token.strip_prefix("page_contains_text:") {
            return Some(Self::PageContainsText(rest.trim().to_string()));
        }
        None
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FieldPopulated => write!(f, "field_populated"),
            Self::NavigatesTo(t) => write!(f, "navigates_to:{}", t),
            Self::PageContainsText(t) => write!(f, "page_contains_text:{}", t),
        }
    }
}

/// A declarative step description. Never carries a selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Element name as the author wrote it (preserved for logging).
    pub element_name: String,
    /// Requested action.
    pub action: Action,
    /// Literal value after template binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Container name restricting discovery to its descendants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_hint: Option<String>,
    /// Zero-based position within a role class, from the ordinal grammar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<usize>,
    /// Noun extracted by the ordinal grammar (`video`, `result`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type_hint: Option<String>,
    /// Expected outcome, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Value resolved from a secret data-row key; redacted at boundaries.
    #[serde(default)]
    pub secret: bool,
}

impl Intent {
    /// Create an intent with just a name and action.
    pub fn new(element_name: impl Into<String>, action: Action) -> Self {
        Self {
            element_name: element_name.into(),
            action,
            value: None,
            scope_hint: None,
            ordinal: None,
            element_type_hint: None,
            outcome: None,
            secret: false,
        }
    }

    /// Attach a value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Attach an outcome.
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Attach a scope hint.
    pub fn with_scope_hint(mut self, hint: impl Into<String>) -> Self {
        self.scope_hint = Some(hint.into());
        self
    }

    /// Element name lowered for cache keys and ledger rows.
    pub fn element_name_lower(&self) -> String {
        self.element_name.to_lowercase()
    }
}

/// One templated step inside a testcase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Element name template.
    pub target: String,
    /// Action name.
    pub action: Action,
    /// Value template (`literal` or `{{token}}`).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<String>,
    /// Outcome token.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub outcome: Option<String>,
}

/// A testcase: step templates plus the data rows to expand them against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub steps: Vec<StepSpec>,
    /// Suite-level outcome tokens (advisory; step outcomes take precedence).
    #[serde(default)]
    pub outcomes: Vec<String>,
    /// Data rows; an empty list expands once with no bindings.
    #[serde(default)]
    pub data: Vec<HashMap<String, String>>,
}

/// Top-level structured plan input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub testcases: Vec<TestCase>,
}
