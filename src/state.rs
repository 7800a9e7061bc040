//! # State Module
//!
//! `SharedState` is the single record threaded through every workflow node.
//! Nodes never mutate it directly: each one returns a `StateUpdate`, and the
//! workflow engine merges it with [`SharedState::apply`]. That is where the
//! run-wide rules live:
//!
//! - `messages` and `errors` are append-only
//! - each specialist output slot is written at most once
//! - the collaboration plan is set at most once
//! - a specialist run clears `selected_agent` so the next round cannot
//!   re-route on a stale choice

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorRecord, OrchestratorError, Result};

// =============================================================================
// AGENT ROLES
// =============================================================================
/// The closed set of specialists.
///
/// # Rust Concept: Enums instead of Strings
///
/// Routing on an enum means the compiler checks every `match` covers all
/// specialists. A typo in an agent name is a parse error, not a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Writing,
    Code,
    Data,
    Research,
}

impl AgentRole {
    /// All specialists, in the order a collaboration plan lists them.
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Research,
        AgentRole::Data,
        AgentRole::Code,
        AgentRole::Writing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Writing => "writing",
            AgentRole::Code => "code",
            AgentRole::Data => "data",
            AgentRole::Research => "research",
        }
    }

    /// Human-readable name used in prompts and the final answer.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::Writing => "Writing Agent",
            AgentRole::Code => "Code Agent",
            AgentRole::Data => "Data Analysis Agent",
            AgentRole::Research => "Research Agent",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "writing" => Ok(AgentRole::Writing),
            "code" => Ok(AgentRole::Code),
            "data" => Ok(AgentRole::Data),
            "research" => Ok(AgentRole::Research),
            other => Err(OrchestratorError::Validation(format!(
                "unknown agent '{}'",
                other
            ))),
        }
    }
}

/// What the delegator chose for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Agent(AgentRole),
    Done,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Agent(role) => write!(f, "{}", role),
            Selection::Done => f.write_str("done"),
        }
    }
}

impl FromStr for Selection {
    type Err = OrchestratorError;

    /// Accepts the four specialist names plus `done` (or `FINISH`), case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "done" | "finish" => Ok(Selection::Done),
            other => other.parse().map(Selection::Agent),
        }
    }
}

/// Set by the synthesizer, consumed by the conditional edge after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NextAction {
    Continue,
    End,
}

// =============================================================================
// MESSAGE LOG
// =============================================================================
/// Who produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Analyzer,
    Delegator,
    Specialist(AgentRole),
    Synthesizer,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Analyzer => f.write_str("analyze"),
            Speaker::Delegator => f.write_str("delegator"),
            Speaker::Specialist(role) => write!(f, "{}", role),
            Speaker::Synthesizer => f.write_str("synthesize"),
        }
    }
}

/// A role-tagged entry in the append-only message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl MessageEntry {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            speaker,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

// =============================================================================
// SHARED STATE
// =============================================================================
/// The record every node reads. Created once per request.
///
/// # Rust Concept: Private Fields with Getters
///
/// Fields are private so the only way to change the state is through
/// `apply`, which enforces the append-only and write-once rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedState {
    user_request: String,
    selected_agent: Option<Selection>,
    delegation_reasoning: Option<String>,
    delegation_instructions: Option<String>,
    collaboration_plan: Vec<AgentRole>,
    plan_cursor: usize,
    messages: Vec<MessageEntry>,
    writing_output: Option<String>,
    code_output: Option<String>,
    data_output: Option<String>,
    research_output: Option<String>,
    iteration_count: u32,
    next_action: Option<NextAction>,
    errors: Vec<ErrorRecord>,
    final_answer: Option<String>,
}

impl SharedState {
    /// Create a fresh state for a new request.
    pub fn new(user_request: impl Into<String>) -> Self {
        Self {
            user_request: user_request.into(),
            selected_agent: None,
            delegation_reasoning: None,
            delegation_instructions: None,
            collaboration_plan: Vec::new(),
            plan_cursor: 0,
            messages: Vec::new(),
            writing_output: None,
            code_output: None,
            data_output: None,
            research_output: None,
            iteration_count: 0,
            next_action: None,
            errors: Vec::new(),
            final_answer: None,
        }
    }

    /// Check the state is fit to start (or continue) a run.
    pub fn validate(&self, max_iterations: u32) -> Result<()> {
        if self.user_request.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "user request must not be empty".to_string(),
            ));
        }
        if self.iteration_count > max_iterations {
            return Err(OrchestratorError::State(format!(
                "iteration count {} exceeds the ceiling of {}",
                self.iteration_count, max_iterations
            )));
        }
        Ok(())
    }

    pub fn user_request(&self) -> &str {
        &self.user_request
    }

    pub fn selected_agent(&self) -> Option<Selection> {
        self.selected_agent
    }

    pub fn delegation_reasoning(&self) -> Option<&str> {
        self.delegation_reasoning.as_deref()
    }

    pub fn delegation_instructions(&self) -> Option<&str> {
        self.delegation_instructions.as_deref()
    }

    pub fn collaboration_plan(&self) -> &[AgentRole] {
        &self.collaboration_plan
    }

    pub fn plan_cursor(&self) -> usize {
        self.plan_cursor
    }

    pub fn messages(&self) -> &[MessageEntry] {
        &self.messages
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn next_action(&self) -> Option<NextAction> {
        self.next_action
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    /// The output slot owned by `role`, if that specialist has run.
    pub fn output(&self, role: AgentRole) -> Option<&str> {
        self.slot(role).as_deref()
    }

    fn slot(&self, role: AgentRole) -> &Option<String> {
        match role {
            AgentRole::Writing => &self.writing_output,
            AgentRole::Code => &self.code_output,
            AgentRole::Data => &self.data_output,
            AgentRole::Research => &self.research_output,
        }
    }

    fn slot_mut(&mut self, role: AgentRole) -> &mut Option<String> {
        match role {
            AgentRole::Writing => &mut self.writing_output,
            AgentRole::Code => &mut self.code_output,
            AgentRole::Data => &mut self.data_output,
            AgentRole::Research => &mut self.research_output,
        }
    }

    pub fn has_run(&self, role: AgentRole) -> bool {
        self.slot(role).is_some()
    }

    /// Number of specialists whose slot has been written.
    pub fn specialists_run(&self) -> usize {
        AgentRole::ALL.iter().filter(|r| self.has_run(**r)).count()
    }

    /// The next unconsumed plan entry.
    pub fn next_planned(&self) -> Option<AgentRole> {
        self.collaboration_plan.get(self.plan_cursor).copied()
    }

    pub fn has_plan(&self) -> bool {
        !self.collaboration_plan.is_empty()
    }

    pub fn plan_exhausted(&self) -> bool {
        self.has_plan() && self.plan_cursor >= self.collaboration_plan.len()
    }

    /// Non-empty outputs in the order their specialists ran, as recorded in
    /// the message log.
    pub fn contributions(&self) -> Vec<(AgentRole, &str)> {
        let mut seen = Vec::new();
        for entry in &self.messages {
            if let Speaker::Specialist(role) = entry.speaker {
                if !seen.contains(&role) {
                    seen.push(role);
                }
            }
        }

        seen.into_iter()
            .filter_map(|role| {
                self.output(role)
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| (role, text))
            })
            .collect()
    }

    /// Merge a partial update produced by a node.
    ///
    /// The update is checked in full before anything is written, so a
    /// rejected update leaves the state untouched.
    pub fn apply(&mut self, update: StateUpdate) -> Result<()> {
        if let Some((role, _)) = &update.output {
            if self.has_run(*role) {
                return Err(OrchestratorError::State(format!(
                    "output slot '{}' already written",
                    role
                )));
            }
        }
        if update.collaboration_plan.is_some() && self.has_plan() {
            return Err(OrchestratorError::State(
                "collaboration plan already set".to_string(),
            ));
        }

        if let Some(plan) = update.collaboration_plan {
            self.collaboration_plan = plan;
        }
        if update.clear_selection {
            self.selected_agent = None;
            self.delegation_instructions = None;
        }
        if let Some(selection) = update.selection {
            self.selected_agent = Some(selection);
        }
        if let Some(reasoning) = update.reasoning {
            self.delegation_reasoning = Some(reasoning);
        }
        if let Some(instructions) = update.instructions {
            self.delegation_instructions = Some(instructions);
        }
        if let Some((role, text)) = update.output {
            *self.slot_mut(role) = Some(text);
            if update.advance_plan && self.next_planned() == Some(role) {
                self.plan_cursor += 1;
            }
        }
        if update.increment_iteration {
            self.iteration_count += 1;
        }
        if let Some(next) = update.next_action {
            self.next_action = Some(next);
        }
        if let Some(answer) = update.final_answer {
            self.final_answer = Some(answer);
        }
        if let Some(message) = update.message {
            self.messages.push(message);
        }
        self.errors.extend(update.errors);

        Ok(())
    }
}

// =============================================================================
// PARTIAL UPDATES
// =============================================================================
/// A node's contribution to the shared state.
///
/// # Rust Concept: Builder Pattern
///
/// Nodes start from `StateUpdate::default()` and chain `with_*` calls for
/// the fields they touch. Untouched fields leave the state as it was.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    selection: Option<Selection>,
    clear_selection: bool,
    reasoning: Option<String>,
    instructions: Option<String>,
    collaboration_plan: Option<Vec<AgentRole>>,
    output: Option<(AgentRole, String)>,
    advance_plan: bool,
    increment_iteration: bool,
    next_action: Option<NextAction>,
    final_answer: Option<String>,
    message: Option<MessageEntry>,
    errors: Vec<ErrorRecord>,
}

impl StateUpdate {
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_plan(mut self, plan: Vec<AgentRole>) -> Self {
        self.collaboration_plan = Some(plan);
        self
    }

    /// Write a specialist's slot. Also clears the consumed selection and
    /// advances the plan cursor when `role` is the planned entry.
    pub fn with_output(mut self, role: AgentRole, text: impl Into<String>) -> Self {
        self.output = Some((role, text.into()));
        self.clear_selection = true;
        self.advance_plan = true;
        self
    }

    pub fn with_iteration_increment(mut self) -> Self {
        self.increment_iteration = true;
        self
    }

    pub fn with_next_action(mut self, next: NextAction) -> Self {
        self.next_action = Some(next);
        self
    }

    pub fn with_final_answer(mut self, answer: impl Into<String>) -> Self {
        self.final_answer = Some(answer.into());
        self
    }

    pub fn with_message(mut self, message: MessageEntry) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_error(mut self, error: ErrorRecord) -> Self {
        self.errors.push(error);
        self
    }

    pub fn message(&self) -> Option<&MessageEntry> {
        self.message.as_ref()
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn output(&self) -> Option<(AgentRole, &str)> {
        self.output.as_ref().map(|(role, text)| (*role, text.as_str()))
    }

    pub fn next_action(&self) -> Option<NextAction> {
        self.next_action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_selection_parsing() {
        assert_eq!("writing".parse::<Selection>().unwrap(), Selection::Agent(AgentRole::Writing));
        assert_eq!(" Research ".parse::<Selection>().unwrap(), Selection::Agent(AgentRole::Research));
        assert_eq!("FINISH".parse::<Selection>().unwrap(), Selection::Done);
        assert_eq!("done".parse::<Selection>().unwrap(), Selection::Done);
        assert!("writer".parse::<Selection>().is_err());
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = SharedState::new("Write a haiku");
        assert_eq!(state.user_request(), "Write a haiku");
        assert!(state.messages().is_empty());
        assert_eq!(state.iteration_count(), 0);
        assert_eq!(state.specialists_run(), 0);
        assert!(!state.has_plan());
        assert!(state.validate(10).is_ok());
    }

    #[test]
    fn test_empty_request_fails_validation() {
        let state = SharedState::new("   ");
        assert!(matches!(state.validate(10), Err(OrchestratorError::Validation(_))));
    }

    #[test]
    fn test_output_slot_written_once() {
        let mut state = SharedState::new("task");
        state
            .apply(StateUpdate::default().with_output(AgentRole::Writing, "first"))
            .unwrap();

        let err = state
            .apply(
                StateUpdate::default()
                    .with_output(AgentRole::Writing, "second")
                    .with_message(MessageEntry::new(Speaker::Specialist(AgentRole::Writing), "x")),
            )
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::State(_)));
        assert_eq!(state.output(AgentRole::Writing), Some("first"));
        // Rejected update must not leak its message either
        assert!(state.messages().is_empty());
    }

    #[test]
    fn test_messages_and_errors_append() {
        let mut state = SharedState::new("task");
        for i in 0..3 {
            state
                .apply(
                    StateUpdate::default()
                        .with_message(MessageEntry::new(Speaker::Delegator, format!("round {}", i)))
                        .with_error(ErrorRecord::new(ErrorKind::Provider, "delegator", "boom")),
                )
                .unwrap();
        }
        assert_eq!(state.messages().len(), 3);
        assert_eq!(state.messages()[0].content, "round 0");
        assert_eq!(state.errors().len(), 3);
    }

    #[test]
    fn test_specialist_output_clears_selection_and_advances_plan() {
        let mut state = SharedState::new("task");
        state
            .apply(StateUpdate::default().with_plan(vec![AgentRole::Research, AgentRole::Writing]))
            .unwrap();
        state
            .apply(
                StateUpdate::default()
                    .with_selection(Selection::Agent(AgentRole::Research))
                    .with_instructions("look it up")
                    .with_iteration_increment(),
            )
            .unwrap();
        assert_eq!(state.selected_agent(), Some(Selection::Agent(AgentRole::Research)));

        state
            .apply(StateUpdate::default().with_output(AgentRole::Research, "findings"))
            .unwrap();

        assert_eq!(state.selected_agent(), None);
        assert_eq!(state.delegation_instructions(), None);
        assert_eq!(state.plan_cursor(), 1);
        assert_eq!(state.next_planned(), Some(AgentRole::Writing));
        assert!(!state.plan_exhausted());
    }

    #[test]
    fn test_plan_set_once() {
        let mut state = SharedState::new("task");
        state
            .apply(StateUpdate::default().with_plan(vec![AgentRole::Research, AgentRole::Data]))
            .unwrap();
        assert!(state
            .apply(StateUpdate::default().with_plan(vec![AgentRole::Code]))
            .is_err());
        assert_eq!(state.collaboration_plan(), &[AgentRole::Research, AgentRole::Data]);
    }

    #[test]
    fn test_contributions_follow_message_order() {
        let mut state = SharedState::new("task");
        for (role, text) in [
            (AgentRole::Data, "numbers"),
            (AgentRole::Code, ""),
            (AgentRole::Research, "facts"),
        ] {
            state
                .apply(
                    StateUpdate::default()
                        .with_output(role, text)
                        .with_message(MessageEntry::new(Speaker::Specialist(role), "done")),
                )
                .unwrap();
        }

        let contributions = state.contributions();
        assert_eq!(
            contributions,
            vec![(AgentRole::Data, "numbers"), (AgentRole::Research, "facts")]
        );
        assert_eq!(state.specialists_run(), 3);
    }

    #[test]
    fn test_state_serializes_to_json() {
        let state = SharedState::new("Explain ownership");
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("Explain ownership"));
        assert!(json.contains("iteration_count"));
    }
}
