//! # Delegator
//!
//! Chooses the next specialist, or `done`. Three paths, checked in order:
//!
//! 1. iteration ceiling reached: `done`, no LLM call, no increment
//! 2. collaboration plan active: the next plan entry, no LLM call
//! 3. otherwise: one LLM decision, validated against a fixed schema and
//!    retried once with a corrective note
//!
//! A decision that keeps failing validation is the only fatal error a node
//! can raise during a run.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, ErrorRecord, OrchestratorError, Result};
use crate::llm::{parse_structured, Caller, LlmClient};
use crate::state::{AgentRole, MessageEntry, Selection, SharedState, Speaker, StateUpdate};

/// Attempts at a valid decision before the run is aborted.
const MAX_DECISION_ATTEMPTS: u32 = 2;

/// Log entries shown to the model.
const RECENT_MESSAGES: usize = 5;

// =============================================================================
// SYSTEM PROMPT
// =============================================================================
const DELEGATOR_SYSTEM_PROMPT: &str = r#"You are the delegator of a team of specialist AI agents.
Your job is to pick the ONE agent that should work next, or to finish.

AVAILABLE AGENTS:
- writing: articles, summaries, explanations, creative and technical writing
- code: programming tasks, code generation, debugging, code explanation
- data: statistics, calculations, comparisons, interpreting numbers
- research: web search, current information, fact-finding

DECISION RULES:
1. Choose the agent whose strengths best match what the request still needs
2. Never choose an agent whose output is already available
3. Choose "done" when the available outputs fully answer the request

Respond with ONLY valid JSON in this exact shape:
{
  "selected_agent": "writing" | "code" | "data" | "research" | "done",
  "reasoning": "one or two sentences explaining the choice",
  "instructions": "specific guidance for the chosen agent",
  "confidence": 0.0 to 1.0
}"#;

const CORRECTIVE_NOTE: &str = "YOUR PREVIOUS RESPONSE WAS REJECTED";

// =============================================================================
// DECISIONS
// =============================================================================
#[derive(Debug, Deserialize)]
struct RawDecision {
    selected_agent: String,
    reasoning: String,
    confidence: f64,
    #[serde(default)]
    instructions: Option<String>,
}

/// A validated delegator decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub selection: Selection,
    pub reasoning: String,
    pub instructions: String,
    pub confidence: f64,
}

impl Decision {
    /// Parse and validate a raw LLM response.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawDecision = parse_structured(text)?;

        let selection: Selection = raw.selected_agent.parse()?;
        if raw.reasoning.trim().is_empty() {
            return Err(OrchestratorError::Validation("reasoning must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&raw.confidence) {
            return Err(OrchestratorError::Validation(format!(
                "confidence {} is outside [0, 1]",
                raw.confidence
            )));
        }

        Ok(Self {
            selection,
            reasoning: raw.reasoning.trim().to_string(),
            instructions: raw.instructions.unwrap_or_default().trim().to_string(),
            confidence: raw.confidence,
        })
    }
}

// =============================================================================
// DELEGATOR
// =============================================================================
pub struct Delegator {
    llm: Arc<dyn LlmClient>,
    max_iterations: u32,
}

impl Delegator {
    pub fn new(llm: Arc<dyn LlmClient>, max_iterations: u32) -> Self {
        Self { llm, max_iterations }
    }

    /// Decide the next step.
    ///
    /// Returns `Err(DelegationFailed)` only when the model produced an
    /// invalid decision on every attempt.
    pub async fn run(&self, state: &SharedState) -> Result<StateUpdate> {
        // The synthesizer ends a run at the ceiling before control comes back
        // here, so this only fires for a zero ceiling or a hand-driven `step`.
        if state.iteration_count() >= self.max_iterations {
            warn!(
                iteration = state.iteration_count(),
                ceiling = self.max_iterations,
                "Iteration ceiling reached, finishing with partial results"
            );
            let reason = format!(
                "iteration ceiling of {} reached",
                self.max_iterations
            );
            return Ok(StateUpdate::default()
                .with_selection(Selection::Done)
                .with_reasoning(reason.clone())
                .with_error(ErrorRecord::new(
                    ErrorKind::IterationLimitExceeded,
                    "delegator",
                    reason.clone(),
                ))
                .with_message(decision_message(Selection::Done, &reason, 1.0, "limit")));
        }

        if state.has_plan() {
            return Ok(self.follow_plan(state));
        }

        let decision = match self.decide(state).await? {
            Ok(decision) => decision,
            Err(record) => {
                let reason = "delegator unavailable, finishing with available results".to_string();
                return Ok(StateUpdate::default()
                    .with_selection(Selection::Done)
                    .with_reasoning(reason.clone())
                    .with_iteration_increment()
                    .with_error(record)
                    .with_message(decision_message(Selection::Done, &reason, 0.0, "error")));
            }
        };

        let (selection, reasoning) = match decision.selection {
            Selection::Agent(role) if state.has_run(role) => {
                info!(agent = %role, "Delegator re-selected a finished agent, treating as done");
                (
                    Selection::Done,
                    format!("{} (the {} has already contributed)", decision.reasoning, role.display_name()),
                )
            }
            selection => (selection, decision.reasoning),
        };

        info!(
            selected = %selection,
            confidence = decision.confidence,
            iteration = state.iteration_count() + 1,
            "Delegation decision"
        );

        let mut update = StateUpdate::default()
            .with_selection(selection)
            .with_reasoning(reasoning.clone())
            .with_iteration_increment()
            .with_message(decision_message(selection, &reasoning, decision.confidence, "llm"));
        if matches!(selection, Selection::Agent(_)) && !decision.instructions.is_empty() {
            update = update.with_instructions(decision.instructions);
        }
        Ok(update)
    }

    fn follow_plan(&self, state: &SharedState) -> StateUpdate {
        let plan = state.collaboration_plan();
        let (selection, reasoning) = match state.next_planned() {
            Some(role) => (
                Selection::Agent(role),
                format!(
                    "Following collaboration plan (step {} of {})",
                    state.plan_cursor() + 1,
                    plan.len()
                ),
            ),
            None => (Selection::Done, "Collaboration plan complete".to_string()),
        };

        info!(selected = %selection, iteration = state.iteration_count() + 1, "Delegation from plan");

        let mut update = StateUpdate::default()
            .with_selection(selection)
            .with_reasoning(reasoning.clone())
            .with_iteration_increment()
            .with_message(decision_message(selection, &reasoning, 1.0, "plan"));
        if let Selection::Agent(role) = selection {
            update = update.with_instructions(plan_instructions(plan, role));
        }
        update
    }

    /// Ask the model for a decision.
    ///
    /// Outer `Err` is fatal (validation kept failing); inner `Err` is a
    /// recorded provider failure the run survives.
    async fn decide(&self, state: &SharedState) -> Result<std::result::Result<Decision, ErrorRecord>> {
        let base_context = build_context(state);
        let mut context = base_context.clone();
        let mut last_error = String::new();

        for attempt in 1..=MAX_DECISION_ATTEMPTS {
            let text = match self
                .llm
                .generate(Caller::Delegator, DELEGATOR_SYSTEM_PROMPT, &context)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Delegator LLM call failed");
                    return Ok(Err(ErrorRecord::provider("delegator", &e)));
                }
            };

            match Decision::parse(&text) {
                Ok(decision) => return Ok(Ok(decision)),
                Err(e) => {
                    warn!(attempt, error = %e, "Delegator returned an invalid decision");
                    debug!(response = %text, "Rejected delegator response");
                    last_error = e.to_string();
                    context = format!(
                        "{}\n\n{}: {}\nReturn ONLY the JSON object described in your instructions, with \
                         selected_agent one of writing, code, data, research, done; a non-empty \
                         reasoning; and confidence between 0 and 1.",
                        base_context, CORRECTIVE_NOTE, last_error
                    );
                }
            }
        }

        Err(OrchestratorError::DelegationFailed {
            attempts: MAX_DECISION_ATTEMPTS,
            reason: last_error,
        })
    }
}

/// The delegator's own log entry.
fn decision_message(selection: Selection, reasoning: &str, confidence: f64, source: &str) -> MessageEntry {
    MessageEntry::new(Speaker::Delegator, format!("Selected {}: {}", selection, reasoning)).with_metadata(
        serde_json::json!({
            "selected_agent": selection.to_string(),
            "confidence": confidence,
            "source": source,
        }),
    )
}

fn plan_instructions(plan: &[AgentRole], role: AgentRole) -> String {
    let steps: Vec<&str> = plan.iter().map(|r| r.as_str()).collect();
    format!(
        "You are the {} step of the plan [{}]. Handle only your part of the request.",
        role,
        steps.join(", ")
    )
}

/// The user-side prompt: request, recent log, available outputs, plan, iteration.
fn build_context(state: &SharedState) -> String {
    let mut context = format!("USER REQUEST:\n{}\n", state.user_request());

    let messages = state.messages();
    let recent = &messages[messages.len().saturating_sub(RECENT_MESSAGES)..];
    if !recent.is_empty() {
        context.push_str("\nRECENT ACTIVITY:\n");
        for entry in recent {
            context.push_str(&format!("- [{}] {}\n", entry.speaker, entry.content));
        }
    }

    let available: Vec<&str> = AgentRole::ALL
        .iter()
        .filter(|r| state.has_run(**r))
        .map(|r| r.as_str())
        .collect();
    context.push_str(&format!(
        "\nAVAILABLE OUTPUTS: {}\n",
        if available.is_empty() { "none".to_string() } else { available.join(", ") }
    ));

    if state.has_plan() {
        let steps: Vec<&str> = state.collaboration_plan().iter().map(|r| r.as_str()).collect();
        context.push_str(&format!("COLLABORATION PLAN: {}\n", steps.join(" → ")));
    }

    context.push_str(&format!("ITERATION: {}\n", state.iteration_count() + 1));
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::llm::mock::ScriptedLlm;

    fn delegator(llm: ScriptedLlm) -> (Delegator, Arc<ScriptedLlm>) {
        let llm = Arc::new(llm);
        (Delegator::new(llm.clone(), 10), llm)
    }

    #[test]
    fn test_decision_parse_valid() {
        let decision = Decision::parse(
            r#"```json
{"selected_agent": "Research", "reasoning": "needs facts", "confidence": 0.8, "instructions": "find stars"}
```"#,
        )
        .unwrap();
        assert_eq!(decision.selection, Selection::Agent(AgentRole::Research));
        assert_eq!(decision.instructions, "find stars");
    }

    #[test]
    fn test_decision_parse_ignores_trailing_prose_with_braces() {
        let decision = Decision::parse(
            "{\"selected_agent\": \"code\", \"reasoning\": \"needs a function\", \"confidence\": 0.9}\n\
             Alternative considered: {\"selected_agent\": \"writing\"}",
        )
        .unwrap();
        assert_eq!(decision.selection, Selection::Agent(AgentRole::Code));

        let decision = Decision::parse(
            "{\"selected_agent\": \"code\", \"reasoning\": \"needs a function\", \"confidence\": 0.9}\n\
             Use fn main() {} as a template.",
        )
        .unwrap();
        assert_eq!(decision.reasoning, "needs a function");
    }

    #[test]
    fn test_decision_parse_rejects_bad_fields() {
        for text in [
            r#"{"selected_agent": "poet", "reasoning": "x", "confidence": 0.5}"#,
            r#"{"selected_agent": "code", "reasoning": "  ", "confidence": 0.5}"#,
            r#"{"selected_agent": "code", "reasoning": "x", "confidence": 1.5}"#,
            r#"{"selected_agent": "code", "confidence": 0.5}"#,
            "I think the code agent should go next",
        ] {
            assert!(
                matches!(Decision::parse(text), Err(OrchestratorError::Validation(_))),
                "accepted: {}",
                text
            );
        }
    }

    #[tokio::test]
    async fn test_llm_decision_sets_selection_and_increments() {
        let (delegator, llm) = delegator(ScriptedLlm::new().respond(
            Caller::Delegator,
            r#"{"selected_agent": "writing", "reasoning": "a poem", "confidence": 0.95, "instructions": "17 syllables"}"#,
        ));
        let mut state = SharedState::new("Write a haiku about Python");
        state.apply(delegator.run(&state).await.unwrap()).unwrap();

        assert_eq!(state.selected_agent(), Some(Selection::Agent(AgentRole::Writing)));
        assert_eq!(state.delegation_instructions(), Some("17 syllables"));
        assert_eq!(state.iteration_count(), 1);
        assert_eq!(state.messages().len(), 1);
        assert!(llm.calls()[0].context.contains("Write a haiku about Python"));
    }

    #[tokio::test]
    async fn test_invalid_then_valid_decision_retries_once() {
        let (delegator, llm) = delegator(
            ScriptedLlm::new()
                .respond(Caller::Delegator, "not json")
                .respond(
                    Caller::Delegator,
                    r#"{"selected_agent": "code", "reasoning": "code task", "confidence": 0.7}"#,
                ),
        );
        let update = delegator.run(&SharedState::new("sort a list")).await.unwrap();

        assert_eq!(update.selection(), Some(Selection::Agent(AgentRole::Code)));
        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].context.contains(CORRECTIVE_NOTE));
    }

    #[tokio::test]
    async fn test_persistent_invalid_decision_is_fatal() {
        let (delegator, _) = delegator(
            ScriptedLlm::new()
                .respond(Caller::Delegator, "not json")
                .respond(Caller::Delegator, r#"{"selected_agent": "poet"}"#),
        );
        let err = delegator.run(&SharedState::new("anything")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DelegationFailed { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_provider_failure_finishes_run() {
        let (delegator, _) = delegator(ScriptedLlm::new().fail(Caller::Delegator, ProviderError::Timeout));
        let update = delegator.run(&SharedState::new("anything")).await.unwrap();

        assert_eq!(update.selection(), Some(Selection::Done));
        assert_eq!(update.errors()[0].kind, ErrorKind::Provider);
    }

    #[tokio::test]
    async fn test_plan_is_followed_without_llm() {
        let (delegator, llm) = delegator(ScriptedLlm::new());
        let mut state = SharedState::new("research then write");
        state
            .apply(StateUpdate::default().with_plan(vec![AgentRole::Research, AgentRole::Writing]))
            .unwrap();

        let update = delegator.run(&state).await.unwrap();
        assert_eq!(update.selection(), Some(Selection::Agent(AgentRole::Research)));
        assert_eq!(llm.calls().len(), 0);
    }

    #[tokio::test]
    async fn test_ceiling_selects_done_without_increment() {
        let llm = Arc::new(ScriptedLlm::new());
        let delegator = Delegator::new(llm.clone(), 1);
        let mut state = SharedState::new("anything");
        state
            .apply(StateUpdate::default().with_iteration_increment())
            .unwrap();

        state.apply(delegator.run(&state).await.unwrap()).unwrap();

        assert_eq!(state.selected_agent(), Some(Selection::Done));
        assert_eq!(state.iteration_count(), 1);
        assert_eq!(state.errors()[0].kind, ErrorKind::IterationLimitExceeded);
        assert_eq!(llm.calls().len(), 0);
    }

    #[tokio::test]
    async fn test_reselecting_finished_agent_means_done() {
        let (delegator, _) = delegator(ScriptedLlm::new().respond(
            Caller::Delegator,
            r#"{"selected_agent": "writing", "reasoning": "again", "confidence": 0.5}"#,
        ));
        let mut state = SharedState::new("Write a haiku");
        state
            .apply(StateUpdate::default().with_output(AgentRole::Writing, "haiku"))
            .unwrap();

        let update = delegator.run(&state).await.unwrap();
        assert_eq!(update.selection(), Some(Selection::Done));
    }
}
