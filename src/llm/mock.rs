//! Scripted LLM client for tests and offline runs.
//!
//! Responses are queued per caller. When a caller's queue is empty the
//! fallback response (if any) is returned, otherwise the call fails with
//! `ProviderError::NotConfigured`.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{Caller, LlmClient};
use crate::error::ProviderError;

/// One recorded `generate` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub caller: Caller,
    pub system_prompt: String,
    pub context: String,
}

#[derive(Default)]
pub struct ScriptedLlm {
    queues: Mutex<HashMap<Caller, VecDeque<Result<String, ProviderError>>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response for `caller`.
    pub fn respond(self, caller: Caller, text: impl Into<String>) -> Self {
        self.push(caller, Ok(text.into()))
    }

    /// Queue a failure for `caller`.
    pub fn fail(self, caller: Caller, error: ProviderError) -> Self {
        self.push(caller, Err(error))
    }

    /// Response used when a caller has nothing queued.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    fn push(self, caller: Caller, response: Result<String, ProviderError>) -> Self {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(caller)
            .or_default()
            .push_back(response);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls made by `caller`.
    pub fn call_count(&self, caller: Caller) -> usize {
        self.calls().iter().filter(|c| c.caller == caller).count()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(
        &self,
        caller: Caller,
        system_prompt: &str,
        context: &str,
    ) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                caller,
                system_prompt: system_prompt.to_string(),
                context: context.to_string(),
            });

        let queued = self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&caller)
            .and_then(|q| q.pop_front());

        match (queued, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(text)) => Ok(text.clone()),
            (None, None) => Err(ProviderError::NotConfigured(format!(
                "no scripted response for {}",
                caller
            ))),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
