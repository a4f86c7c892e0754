//! # Error Types Module
//!
//! This module defines the error type returned by the public entry points of the
//! ingredient pipeline. Per-record anomalies (malformed boxes, unknown labels) are
//! absorbed by the pipeline and never show up here; only misuse of the API,
//! lookups that miss, and failures of the external collaborators do.

/// Errors surfaced by the ingredient pipeline and its collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum VisionError {
    /// Thresholds or dimensions outside their valid range
    Configuration(String),
    /// Recipe id not present in the catalog
    NotFound(i64),
    /// Recipe file could not be read or parsed
    CatalogLoad(String),
    /// LLM endpoint could not be reached or returned an HTTP error
    LlmRequest(String),
    /// LLM output could not be coerced into ranked recipes
    LlmResponse(String),
    /// Circuit breaker is open, requests fail fast
    CircuitOpen(String),
}

impl VisionError {
    /// Whether this error is the "recipe not found" signal
    pub fn is_not_found(&self) -> bool {
        matches!(self, VisionError::NotFound(_))
    }

    /// Whether this error was caused by invalid configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, VisionError::Configuration(_))
    }
}

impl std::fmt::Display for VisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            VisionError::NotFound(id) => write!(f, "Recipe {id} not found"),
            VisionError::CatalogLoad(msg) => write!(f, "Catalog load error: {msg}"),
            VisionError::LlmRequest(msg) => write!(f, "LLM request error: {msg}"),
            VisionError::LlmResponse(msg) => write!(f, "LLM response error: {msg}"),
            VisionError::CircuitOpen(msg) => write!(f, "Circuit open: {msg}"),
        }
    }
}

impl std::error::Error for VisionError {}

impl From<serde_json::Error> for VisionError {
    fn from(err: serde_json::Error) -> Self {
        VisionError::CatalogLoad(err.to_string())
    }
}

impl From<reqwest::Error> for VisionError {
    fn from(err: reqwest::Error) -> Self {
        VisionError::LlmRequest(err.to_string())
    }
}
