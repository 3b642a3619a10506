//! Error types for pacts-core.

use thiserror::Error;

/// Result type alias using pacts-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during PACTS operations.
///
/// These are infrastructural errors only. Step-level failures (element not
/// visible, selector not unique, ...) travel through `RunState.failure` and
/// never cross a node boundary as an `Err`.
#[derive(Error, Debug)]
pub enum Error {
    /// Browser driver call failed
    #[error("Browser driver error: {message}")]
    Driver {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Selector store / run record storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Plan input could not be parsed
    #[error("Plan input error: {0}")]
    PlanInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run-level wall-clock budget exceeded
    #[error("Run budget exhausted: {resource}")]
    BudgetExhausted { resource: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
            source: None,
        }
    }

    /// Create a driver error with source.
    pub fn driver_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Driver {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a budget exhausted error.
    pub fn budget_exhausted(resource: impl Into<String>) -> Self {
        Self::BudgetExhausted {
            resource: resource.into(),
        }
    }
}
