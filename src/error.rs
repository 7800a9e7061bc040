//! # Error Module
//!
//! Typed errors for the orchestrator, plus the `ErrorRecord` that nodes append
//! to the shared state when something goes wrong but the run can carry on.
//!
//! Only two things are fatal to a run: a bad configuration (caught before the
//! workflow starts) and a delegator that keeps producing invalid decisions.
//! Everything else is recorded and the workflow keeps going.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// LLM PROVIDER ERRORS
// =============================================================================
/// Failure of a single LLM call.
///
/// # Rust Concept: Custom Error Types with thiserror
///
/// Each variant is a distinct failure mode, and `#[error("...")]` writes the
/// `Display` implementation for us.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("Rate limited by LLM provider")]
    RateLimited,

    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("No LLM response available: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Classify a provider error message coming back from rig.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") {
            ProviderError::RateLimited
        } else if lower.contains("timed out") || lower.contains("timeout") {
            ProviderError::Timeout
        } else {
            ProviderError::Request(message)
        }
    }
}

// =============================================================================
// SEARCH ERRORS
// =============================================================================
/// Failure of a web search call. Always non-fatal: the research agent falls
/// back to the model's own knowledge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search request failed with HTTP {0}: {1}")]
    Http(u16, String),

    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Unauthorized - check the search API key")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse search response: {0}")]
    Parse(String),
}

impl SearchError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::RateLimited | SearchError::Network(_) => true,
            SearchError::Http(status, _) => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        SearchError::Network(e.to_string())
    }
}

// =============================================================================
// TOP-LEVEL ERROR
// =============================================================================
/// Errors that abort a run (or never let it start).
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Delegation failed after {attempts} attempts: {reason}")]
    DelegationFailed { attempts: u32, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    State(String),
}

impl OrchestratorError {
    /// True for the errors the CLI should treat as configuration problems.
    pub fn is_configuration(&self) -> bool {
        matches!(self, OrchestratorError::Configuration(_))
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

// =============================================================================
// RECORDED ERRORS
// =============================================================================
/// The category of a recorded, non-fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Never recorded by the workflow itself: configuration errors abort
    /// before a state exists. Kept so exported records cover every kind.
    Configuration,
    Provider,
    Validation,
    SearchUnavailable,
    IterationLimitExceeded,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Provider => "ProviderError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::SearchUnavailable => "SearchUnavailable",
            ErrorKind::IterationLimitExceeded => "IterationLimitExceeded",
        };
        f.write_str(name)
    }
}

/// One entry of `SharedState::errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Node that produced the error (`"delegator"`, `"research"`, ...)
    pub source: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn provider(source: impl Into<String>, error: &ProviderError) -> Self {
        Self::new(ErrorKind::Provider, source, error.to_string())
    }

    pub fn search_unavailable(source: impl Into<String>, error: &SearchError) -> Self {
        Self::new(ErrorKind::SearchUnavailable, source, error.to_string())
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.source, self.message)
    }
}
