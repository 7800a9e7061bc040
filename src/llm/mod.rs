//! # LLM Module
//!
//! Every agent talks to the model through the [`LlmClient`] trait:
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ Delegator / Specialists / Synthesizer      │
//! └──────────────────┬─────────────────────────┘
//!                    │ generate(caller, system_prompt, context)
//!                    ▼
//! ┌────────────────────────────────────────────┐
//! │          LlmClient (trait)                 │
//! └──────────┬──────────────────────┬──────────┘
//!            ▼                      ▼
//!   RigLlmClient (Anthropic /   ScriptedLlm (tests,
//!   Ollama via rig-core)        offline demos)
//! ```
//!
//! Structured responses are plain text that must contain a JSON object;
//! [`parse_structured`] pulls it out and deserializes it.

pub mod mock;

use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::{anthropic, ollama};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, info};

use crate::config::{Config, Provider};
use crate::error::{OrchestratorError, ProviderError};
use crate::state::AgentRole;

// =============================================================================
// CALLERS
// =============================================================================
/// Which node is making an LLM call. Selects the model and tags logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caller {
    Analyzer,
    Delegator,
    Specialist(AgentRole),
    Synthesizer,
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::Analyzer => f.write_str("analyze"),
            Caller::Delegator => f.write_str("delegator"),
            Caller::Specialist(role) => write!(f, "{}", role),
            Caller::Synthesizer => f.write_str("synthesize"),
        }
    }
}

// =============================================================================
// LLM CLIENT TRAIT
// =============================================================================
/// Provider-agnostic text generation.
///
/// # Rust Concept: async-trait
///
/// Traits with async methods used behind `dyn` need the `#[async_trait]`
/// attribute, which boxes the returned future.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response for `context` under a role-specific system prompt.
    async fn generate(
        &self,
        caller: Caller,
        system_prompt: &str,
        context: &str,
    ) -> Result<String, ProviderError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Generate and parse a structured (JSON) response in one go.
///
/// A transport failure comes back as `OrchestratorError::Provider`, a
/// response that is not the expected JSON as `OrchestratorError::Validation`.
pub async fn generate_structured<T: DeserializeOwned>(
    llm: &dyn LlmClient,
    caller: Caller,
    system_prompt: &str,
    context: &str,
) -> Result<T, OrchestratorError> {
    let text = llm.generate(caller, system_prompt, context).await?;
    parse_structured(&text)
}

/// Parse the JSON object embedded in an LLM response.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, OrchestratorError> {
    let json = extract_json(text).ok_or_else(|| {
        OrchestratorError::Validation("response does not contain a JSON object".to_string())
    })?;
    serde_json::from_str(json)
        .map_err(|e| OrchestratorError::Validation(format!("malformed JSON response: {}", e)))
}

/// Find the first complete JSON object in a response that may wrap it in a
/// markdown fence or surround it with prose.
///
/// Each `{` is tried in turn; the stream deserializer stops at the end of
/// the first complete value, so trailing prose (even with braces) is ignored.
pub fn extract_json(text: &str) -> Option<&str> {
    let body = match text.find("```json") {
        Some(start) => {
            let after = &text[start + "```json".len()..];
            after.find("```").map(|end| &after[..end]).unwrap_or(after)
        }
        None => text,
    };

    body.match_indices('{').find_map(|(start, _)| {
        let candidate = &body[start..];
        let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<serde_json::Value>();
        match stream.next() {
            Some(Ok(serde_json::Value::Object(_))) => Some(&candidate[..stream.byte_offset()]),
            _ => None,
        }
    })
}

// =============================================================================
// RIG-BACKED CLIENT
// =============================================================================
enum RigBackend {
    Anthropic(anthropic::Client),
    Ollama(ollama::Client),
}

/// `LlmClient` backed by rig-core's Anthropic or Ollama provider.
///
/// A fresh rig agent is built per call so each caller gets its own model
/// and preamble.
pub struct RigLlmClient {
    backend: RigBackend,
    config: Config,
}

impl RigLlmClient {
    /// Create a client for the provider named in `config`.
    ///
    /// The configuration must already be validated; the Anthropic client
    /// reads its key from `ANTHROPIC_API_KEY`, which is exported here from
    /// the config so both always agree.
    pub fn new(config: &Config) -> Result<Self, OrchestratorError> {
        let backend = match config.provider {
            Provider::Anthropic => {
                let key = config.anthropic_api_key.as_deref().ok_or_else(|| {
                    OrchestratorError::Configuration("ANTHROPIC_API_KEY is not set".to_string())
                })?;
                std::env::set_var("ANTHROPIC_API_KEY", key);
                RigBackend::Anthropic(anthropic::Client::from_env())
            }
            Provider::Ollama => {
                std::env::set_var("OLLAMA_API_BASE_URL", &config.ollama_host);
                RigBackend::Ollama(ollama::Client::from_env())
            }
        };

        info!(provider = %config.provider, model = %config.default_model, "LLM client ready");

        Ok(Self {
            backend,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for RigLlmClient {
    async fn generate(
        &self,
        caller: Caller,
        system_prompt: &str,
        context: &str,
    ) -> Result<String, ProviderError> {
        let model = self.config.model_for(caller);
        debug!(caller = %caller, model = %model, "Calling LLM");

        let response = match &self.backend {
            RigBackend::Anthropic(client) => {
                let agent = client
                    .agent(model)
                    .preamble(system_prompt)
                    .temperature(self.config.temperature)
                    .max_tokens(self.config.max_tokens)
                    .build();
                agent.prompt(context).await
            }
            RigBackend::Ollama(client) => {
                let agent = client
                    .agent(model)
                    .preamble(system_prompt)
                    .temperature(self.config.temperature)
                    .max_tokens(self.config.max_tokens)
                    .build();
                agent.prompt(context).await
            }
        }
        .map_err(|e| ProviderError::from_message(e.to_string()))?;

        if response.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        debug!(caller = %caller, chars = response.len(), "LLM call completed");
        Ok(response)
    }

    fn name(&self) -> &str {
        match self.backend {
            RigBackend::Anthropic(_) => "anthropic",
            RigBackend::Ollama(_) => "ollama",
        }
    }
}
