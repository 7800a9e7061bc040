//! # Configuration Module
//!
//! Loads the orchestrator configuration from environment variables (and a
//! `.env` file when one is present). The resulting `Config` is passed by
//! reference into `Workflow::new`; nothing else reads the environment.

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::{OrchestratorError, Result};
use crate::llm::Caller;
use crate::state::AgentRole;

// =============================================================================
// ENUMERATED OPTIONS
// =============================================================================
/// Which rig provider backs the LLM client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    Ollama,
}

impl FromStr for Provider {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "ollama" => Ok(Provider::Ollama),
            other => Err(OrchestratorError::Configuration(format!(
                "LLM_PROVIDER must be 'anthropic' or 'ollama', got: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Anthropic => f.write_str("anthropic"),
            Provider::Ollama => f.write_str("ollama"),
        }
    }
}

/// How the analyze step decides whether a request needs several specialists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    Keyword,
    Llm,
}

impl FromStr for ClassifierKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyword" | "heuristic" => Ok(ClassifierKind::Keyword),
            "llm" => Ok(ClassifierKind::Llm),
            other => Err(OrchestratorError::Configuration(format!(
                "COLLABORATION_CLASSIFIER must be 'keyword' or 'llm', got: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the multi-agent workflow.
///
/// # Rust Concept: Derive Macros
/// - Debug: printing with {:?} (the API keys are redacted by our own impl below)
/// - Clone: the CLI tweaks a copy before handing it to the workflow
#[derive(Clone)]
pub struct Config {
    /// LLM backend
    pub provider: Provider,

    /// Anthropic API key (required for the anthropic provider)
    pub anthropic_api_key: Option<String>,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Model used by every role without its own override
    pub default_model: String,

    pub delegator_model: Option<String>,
    pub writing_model: Option<String>,
    pub code_model: Option<String>,
    pub data_model: Option<String>,
    pub research_model: Option<String>,

    /// Temperature for LLM responses (0.0 = deterministic, 2.0 = very creative)
    pub temperature: f64,

    /// Upper bound on response length
    pub max_tokens: u64,

    /// Ceiling on delegation rounds per request
    pub max_iterations: u32,

    /// Print the message log after each answer
    pub show_decision_log: bool,

    /// Tavily key; DuckDuckGo is used when absent
    pub tavily_api_key: Option<String>,

    /// Maximum number of search results handed to the research agent
    pub max_search_results: usize,

    /// Collaboration classifier used by the analyze step
    pub classifier: ClassifierKind,

    /// Merge multiple specialist outputs with one extra LLM call
    pub merge_with_llm: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("anthropic_api_key", &self.anthropic_api_key.as_ref().map(|_| "<redacted>"))
            .field("ollama_host", &self.ollama_host)
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_iterations", &self.max_iterations)
            .field("show_decision_log", &self.show_decision_log)
            .field("tavily_api_key", &self.tavily_api_key.as_ref().map(|_| "<redacted>"))
            .field("max_search_results", &self.max_search_results)
            .field("classifier", &self.classifier)
            .field("merge_with_llm", &self.merge_with_llm)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::Anthropic,
            anthropic_api_key: None,
            ollama_host: "http://localhost:11434".to_string(),
            // Cheapest model as the fallback
            default_model: "claude-3-5-haiku-20241022".to_string(),
            delegator_model: None,
            writing_model: None,
            code_model: None,
            data_model: None,
            research_model: None,
            temperature: 0.7,
            max_tokens: 4096,
            max_iterations: 10,
            show_decision_log: false,
            tavily_api_key: None,
            max_search_results: 5,
            classifier: ClassifierKind::Keyword,
            merge_with_llm: false,
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Rust Concept: The ? Operator
    ///
    /// Every parse below returns a `Result`; `?` hands the first failure back
    /// to the caller as an `OrchestratorError::Configuration`.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup. `from_env` passes
    /// `std::env::var`; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(val) = get("LLM_PROVIDER") {
            config.provider = val.parse()?;
        }
        config.anthropic_api_key = get("ANTHROPIC_API_KEY");
        if let Some(val) = get("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }
        if let Some(val) = get("DEFAULT_MODEL") {
            config.default_model = val;
        }

        config.delegator_model = get("DELEGATOR_MODEL");
        config.writing_model = get("WRITING_AGENT_MODEL");
        config.code_model = get("CODE_AGENT_MODEL");
        config.data_model = get("DATA_AGENT_MODEL");
        config.research_model = get("RESEARCH_AGENT_MODEL");

        if let Some(val) = get("TEMPERATURE") {
            config.temperature = parse_value("TEMPERATURE", &val, "a floating-point number (e.g., 0.7)")?;
        }
        if let Some(val) = get("MAX_TOKENS") {
            config.max_tokens = parse_value("MAX_TOKENS", &val, "a positive integer")?;
        }
        if let Some(val) = get("MAX_ITERATIONS") {
            config.max_iterations = parse_value("MAX_ITERATIONS", &val, "a positive integer")?;
        }
        if let Some(val) = get("SHOW_DECISION_LOG") {
            config.show_decision_log = parse_flag("SHOW_DECISION_LOG", &val)?;
        }
        config.tavily_api_key = get("TAVILY_API_KEY");
        if let Some(val) = get("MAX_SEARCH_RESULTS") {
            config.max_search_results = parse_value("MAX_SEARCH_RESULTS", &val, "a positive integer")?;
        }
        if let Some(val) = get("COLLABORATION_CLASSIFIER") {
            config.classifier = val.parse()?;
        }
        if let Some(val) = get("SYNTHESIS_MERGE_WITH_LLM") {
            config.merge_with_llm = parse_flag("SYNTHESIS_MERGE_WITH_LLM", &val)?;
        }

        Ok(config)
    }

    /// Validate the configuration before any workflow starts.
    pub fn validate(&self) -> Result<()> {
        if self.provider == Provider::Anthropic && self.anthropic_api_key.is_none() {
            return Err(OrchestratorError::Configuration(
                "ANTHROPIC_API_KEY is not set. Add it to your environment or .env file".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(OrchestratorError::Configuration(format!(
                "TEMPERATURE must be between 0.0 and 2.0, got: {}",
                self.temperature
            )));
        }

        if self.max_iterations == 0 {
            return Err(OrchestratorError::Configuration(
                "MAX_ITERATIONS must be at least 1".to_string(),
            ));
        }

        if self.max_search_results == 0 {
            return Err(OrchestratorError::Configuration(
                "MAX_SEARCH_RESULTS must be at least 1".to_string(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(OrchestratorError::Configuration(
                "MAX_TOKENS must be at least 1".to_string(),
            ));
        }

        let models = [
            Some(&self.default_model),
            self.delegator_model.as_ref(),
            self.writing_model.as_ref(),
            self.code_model.as_ref(),
            self.data_model.as_ref(),
            self.research_model.as_ref(),
        ];
        if models.iter().flatten().any(|m| m.trim().is_empty()) {
            return Err(OrchestratorError::Configuration(
                "model names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The model a given caller should use.
    ///
    /// Priority: role-specific override, then `default_model`.
    pub fn model_for(&self, caller: Caller) -> &str {
        let specific = match caller {
            Caller::Delegator | Caller::Analyzer => self.delegator_model.as_deref(),
            Caller::Specialist(AgentRole::Writing) | Caller::Synthesizer => {
                self.writing_model.as_deref()
            }
            Caller::Specialist(AgentRole::Code) => self.code_model.as_deref(),
            Caller::Specialist(AgentRole::Data) => self.data_model.as_deref(),
            Caller::Specialist(AgentRole::Research) => self.research_model.as_deref(),
        };
        specific.unwrap_or(&self.default_model)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str, expected: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        OrchestratorError::Configuration(format!("{} must be {}, got: {}", key, expected, raw))
    })
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(OrchestratorError::Configuration(format!(
            "{} must be true or false, got: {}",
            key, raw
        ))),
    }
}
