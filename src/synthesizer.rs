//! # Synthesizer
//!
//! Runs after every delegation round. It decides whether the workflow goes
//! back to the delegator or ends, and on `end` composes the final answer
//! from the non-empty output slots in the order the specialists ran.
//!
//! The answer is formatted deterministically. Optionally, when more than one
//! specialist contributed, a single LLM call merges the sections into one
//! narrative; if that call fails the formatted version is used.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ErrorKind, ErrorRecord};
use crate::llm::{Caller, LlmClient};
use crate::state::{AgentRole, MessageEntry, NextAction, Selection, SharedState, Speaker, StateUpdate};

const NO_RESULTS: &str = "No specialist was able to produce a result for this request.";

const MERGE_SYSTEM_PROMPT: &str = r#"You are an editor combining the work of several specialist agents
into one answer for the user.

- Keep every fact, number, code block and source URL from the inputs
- Remove repetition and make the sections flow as one response
- Do not add new claims
- Answer the user's request directly; do not mention the agents"#;

/// Why the run is ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    DelegatorDone,
    PlanComplete,
    SingleSpecialist,
    IterationLimit,
}

pub struct Synthesizer {
    max_iterations: u32,
    merge_llm: Option<Arc<dyn LlmClient>>,
}

impl Synthesizer {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            merge_llm: None,
        }
    }

    /// Merge multi-specialist answers with one LLM call.
    pub fn with_llm_merge(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.merge_llm = Some(llm);
        self
    }

    fn end_reason(&self, state: &SharedState) -> Option<EndReason> {
        if state.selected_agent() == Some(Selection::Done) {
            Some(EndReason::DelegatorDone)
        } else if state.plan_exhausted() {
            Some(EndReason::PlanComplete)
        } else if !state.has_plan() && state.specialists_run() > 0 {
            Some(EndReason::SingleSpecialist)
        } else if state.iteration_count() >= self.max_iterations {
            Some(EndReason::IterationLimit)
        } else {
            None
        }
    }

    pub async fn run(&self, state: &SharedState) -> StateUpdate {
        let Some(reason) = self.end_reason(state) else {
            let next = state
                .next_planned()
                .map(|role| role.to_string())
                .unwrap_or_else(|| "delegator's choice".to_string());
            info!(iteration = state.iteration_count(), next = %next, "Continuing workflow");
            return StateUpdate::default()
                .with_next_action(NextAction::Continue)
                .with_message(MessageEntry::new(
                    Speaker::Synthesizer,
                    format!(
                        "Continuing: {} specialist(s) finished, next: {}",
                        state.specialists_run(),
                        next
                    ),
                ));
        };

        let mut update = StateUpdate::default().with_next_action(NextAction::End);
        if reason == EndReason::IterationLimit {
            warn!(ceiling = self.max_iterations, "Iteration ceiling reached with work remaining");
            update = update.with_error(ErrorRecord::new(
                ErrorKind::IterationLimitExceeded,
                "synthesize",
                format!(
                    "iteration ceiling of {} reached, returning partial results",
                    self.max_iterations
                ),
            ));
        }

        let contributions = state.contributions();
        let (answer, merge_error) = self.compose(state.user_request(), &contributions).await;
        if let Some(error) = merge_error {
            update = update.with_error(error);
        }

        info!(
            reason = ?reason,
            contributions = contributions.len(),
            "Workflow finished"
        );

        update
            .with_final_answer(answer)
            .with_message(
                MessageEntry::new(
                    Speaker::Synthesizer,
                    format!("Final answer composed from {} contribution(s)", contributions.len()),
                )
                .with_metadata(serde_json::json!({ "reason": format!("{:?}", reason) })),
            )
    }

    async fn compose(
        &self,
        request: &str,
        contributions: &[(AgentRole, &str)],
    ) -> (String, Option<ErrorRecord>) {
        let formatted = format_contributions(contributions);

        let Some(llm) = self.merge_llm.as_ref().filter(|_| contributions.len() > 1) else {
            return (formatted, None);
        };

        let context = format!("USER REQUEST:\n{}\n\nSPECIALIST OUTPUTS:\n\n{}", request, formatted);
        match llm.generate(Caller::Synthesizer, MERGE_SYSTEM_PROMPT, &context).await {
            Ok(merged) => (merged.trim().to_string(), None),
            Err(e) => {
                warn!(error = %e, "LLM merge failed, using formatted sections");
                (formatted, Some(ErrorRecord::provider("synthesize", &e)))
            }
        }
    }
}

/// Deterministic final answer: a single contribution verbatim, several as
/// headed sections.
pub fn format_contributions(contributions: &[(AgentRole, &str)]) -> String {
    match contributions {
        [] => NO_RESULTS.to_string(),
        [(_, only)] => only.to_string(),
        many => many
            .iter()
            .map(|(role, text)| format!("## {}\n\n{}", role.display_name(), text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::llm::mock::ScriptedLlm;

    fn run_specialist(state: &mut SharedState, role: AgentRole, text: &str) {
        state
            .apply(
                StateUpdate::default()
                    .with_output(role, text)
                    .with_message(MessageEntry::new(Speaker::Specialist(role), "done")),
            )
            .unwrap();
    }

    #[test]
    fn test_format_contributions() {
        assert_eq!(format_contributions(&[]), NO_RESULTS);
        assert_eq!(format_contributions(&[(AgentRole::Writing, "haiku")]), "haiku");

        let text = format_contributions(&[(AgentRole::Research, "facts"), (AgentRole::Writing, "prose")]);
        assert_eq!(text, "## Research Agent\n\nfacts\n\n## Writing Agent\n\nprose");
    }

    #[tokio::test]
    async fn test_single_specialist_without_plan_ends() {
        let mut state = SharedState::new("Write a haiku");
        run_specialist(&mut state, AgentRole::Writing, "an old silent pond");

        let update = Synthesizer::new(10).run(&state).await;
        state.apply(update).unwrap();

        assert_eq!(state.next_action(), Some(NextAction::End));
        assert_eq!(state.final_answer(), Some("an old silent pond"));
    }

    #[tokio::test]
    async fn test_unfinished_plan_continues() {
        let mut state = SharedState::new("task");
        state
            .apply(StateUpdate::default().with_plan(vec![AgentRole::Research, AgentRole::Writing]))
            .unwrap();
        run_specialist(&mut state, AgentRole::Research, "facts");

        let update = Synthesizer::new(10).run(&state).await;
        assert_eq!(update.next_action(), Some(NextAction::Continue));
        assert!(update.message().unwrap().content.contains("next: writing"));
    }

    #[tokio::test]
    async fn test_ceiling_ends_with_partial_results() {
        let mut state = SharedState::new("task");
        state
            .apply(StateUpdate::default().with_plan(vec![AgentRole::Research, AgentRole::Writing]))
            .unwrap();
        state
            .apply(StateUpdate::default().with_iteration_increment())
            .unwrap();
        run_specialist(&mut state, AgentRole::Research, "facts");

        let update = Synthesizer::new(1).run(&state).await;
        state.apply(update).unwrap();

        assert_eq!(state.next_action(), Some(NextAction::End));
        assert_eq!(state.final_answer(), Some("facts"));
        assert_eq!(state.errors()[0].kind, ErrorKind::IterationLimitExceeded);
    }

    #[tokio::test]
    async fn test_llm_merge_and_fallback() {
        let mut state = SharedState::new("task");
        run_specialist(&mut state, AgentRole::Research, "facts");
        run_specialist(&mut state, AgentRole::Writing, "prose");
        state
            .apply(StateUpdate::default().with_selection(Selection::Done))
            .unwrap();

        let merged = Synthesizer::new(10)
            .with_llm_merge(Arc::new(ScriptedLlm::new().respond(Caller::Synthesizer, "one story")))
            .run(&state)
            .await;
        assert!(merged.errors().is_empty());

        let fallback = Synthesizer::new(10)
            .with_llm_merge(Arc::new(ScriptedLlm::new().fail(Caller::Synthesizer, ProviderError::Timeout)))
            .run(&state)
            .await;
        assert_eq!(fallback.errors()[0].kind, ErrorKind::Provider);

        let mut merged_state = state.clone();
        merged_state.apply(merged).unwrap();
        assert_eq!(merged_state.final_answer(), Some("one story"));

        state.apply(fallback).unwrap();
        assert!(state.final_answer().unwrap().starts_with("## Research Agent"));
    }
}
