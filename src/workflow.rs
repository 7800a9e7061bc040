//! # Workflow Module
//!
//! The state machine that drives a request through the agents:
//!
//! ```text
//!   analyze ──▶ delegate ──route──▶ writing | code | data | research
//!                  ▲    │                          │
//!                  │    └──── done ──┐             ▼
//!                  │                 └────────▶ synthesize ──end──▶ (finish)
//!                  └───────────── continue ───────────┘
//! ```
//!
//! Execution is strictly sequential: one node runs to completion, its
//! `StateUpdate` is applied, and only then is the next node chosen. The only
//! suspension points are the LLM and search calls inside the nodes.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::agents::{CodeAgent, DataAgent, Delegator, ResearchAgent, Specialist, WritingAgent};
use crate::analyze::{Analyzer, CollaborationClassifier, KeywordClassifier, LlmClassifier};
use crate::config::{ClassifierKind, Config};
use crate::error::{ErrorRecord, OrchestratorError, Result};
use crate::llm::{LlmClient, RigLlmClient};
use crate::search::{self, SearchProvider};
use crate::state::{AgentRole, NextAction, Selection, SharedState};
use crate::synthesizer::Synthesizer;

// =============================================================================
// NODES AND ROUTING
// =============================================================================
/// A state of the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Analyze,
    Delegate,
    Specialist(AgentRole),
    Synthesize,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Analyze => f.write_str("analyze"),
            Node::Delegate => f.write_str("delegate"),
            Node::Specialist(role) => write!(f, "{}", role),
            Node::Synthesize => f.write_str("synthesize"),
        }
    }
}

/// The conditional edge after `delegate`.
///
/// # Rust Concept: Exhaustive Matching
///
/// `Selection` is a closed enum, so adding a specialist without routing it
/// is a compile error rather than a silently skipped branch.
pub fn route(selection: Option<Selection>) -> Node {
    match selection {
        Some(Selection::Agent(role)) => Node::Specialist(role),
        Some(Selection::Done) | None => Node::Synthesize,
    }
}

/// The workflow graph as a Mermaid flowchart.
pub fn mermaid() -> String {
    let mut lines = vec![
        "flowchart TD".to_string(),
        "    START([start]) --> analyze".to_string(),
        "    analyze --> delegate".to_string(),
    ];
    for role in AgentRole::ALL {
        lines.push(format!("    delegate -- {0} --> {0}", role));
    }
    lines.push("    delegate -- done --> synthesize".to_string());
    for role in AgentRole::ALL {
        lines.push(format!("    {} --> synthesize", role));
    }
    lines.push("    synthesize -- continue --> delegate".to_string());
    lines.push("    synthesize -- end --> END([end])".to_string());
    lines.join("\n")
}

// =============================================================================
// OUTCOME
// =============================================================================
/// Result of a completed run: the final state, with partial results and
/// every recorded error.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub state: SharedState,
}

impl WorkflowOutcome {
    pub fn final_answer(&self) -> &str {
        self.state.final_answer().unwrap_or_default()
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        self.state.errors()
    }
}

// =============================================================================
// WORKFLOW ENGINE
// =============================================================================
pub struct Workflow {
    analyzer: Analyzer,
    delegator: Delegator,
    writing: WritingAgent,
    code: CodeAgent,
    data: DataAgent,
    research: ResearchAgent,
    synthesizer: Synthesizer,
    max_iterations: u32,
}

impl Workflow {
    /// Wire the graph from explicit collaborators.
    pub fn new(config: &Config, llm: Arc<dyn LlmClient>, search: Arc<dyn SearchProvider>) -> Self {
        let classifier: Arc<dyn CollaborationClassifier> = match config.classifier {
            ClassifierKind::Keyword => Arc::new(KeywordClassifier::new()),
            ClassifierKind::Llm => Arc::new(LlmClassifier::new(llm.clone())),
        };

        let mut synthesizer = Synthesizer::new(config.max_iterations);
        if config.merge_with_llm {
            synthesizer = synthesizer.with_llm_merge(llm.clone());
        }

        Self {
            analyzer: Analyzer::new(classifier),
            delegator: Delegator::new(llm.clone(), config.max_iterations),
            writing: WritingAgent::new(llm.clone()),
            code: CodeAgent::new(llm.clone()),
            data: DataAgent::new(llm.clone()),
            research: ResearchAgent::new(llm, search),
            synthesizer,
            max_iterations: config.max_iterations,
        }
    }

    /// Validate `config` and build the real LLM and search backends.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let llm: Arc<dyn LlmClient> = Arc::new(RigLlmClient::new(config)?);
        Ok(Self::new(config, llm, search::from_config(config)))
    }

    fn specialist(&self, role: AgentRole) -> &dyn Specialist {
        match role {
            AgentRole::Writing => &self.writing,
            AgentRole::Code => &self.code,
            AgentRole::Data => &self.data,
            AgentRole::Research => &self.research,
        }
    }

    /// Upper bound on node executions for one run. Each delegation round is
    /// at most three nodes; the extra covers `analyze` and a final round
    /// at the ceiling.
    fn step_limit(&self) -> usize {
        3 * (self.max_iterations as usize + 1) + 1
    }

    /// Execute one node, merge its update, and return the node to run next
    /// (`None` when the workflow has finished).
    pub async fn step(&self, node: Node, state: &mut SharedState) -> Result<Option<Node>> {
        debug!(node = %node, iteration = state.iteration_count(), "Running node");

        let (update, next) = match node {
            Node::Analyze => (self.analyzer.run(state).await, Some(Node::Delegate)),
            Node::Delegate => {
                let update = self.delegator.run(state).await?;
                let next = route(update.selection());
                (update, Some(next))
            }
            Node::Specialist(role) => {
                let specialist = self.specialist(role);
                debug_assert_eq!(specialist.role(), role);
                info!(agent = %specialist.role(), iteration = state.iteration_count(), "Running specialist");
                (specialist.run(state).await, Some(Node::Synthesize))
            }
            Node::Synthesize => {
                let update = self.synthesizer.run(state).await;
                let next = match update.next_action() {
                    Some(NextAction::Continue) => Some(Node::Delegate),
                    Some(NextAction::End) | None => None,
                };
                (update, next)
            }
        };

        state.apply(update)?;
        Ok(next)
    }

    /// Run a request from `analyze` to completion.
    pub async fn run(&self, request: &str) -> Result<WorkflowOutcome> {
        let mut state = SharedState::new(request);
        state.validate(self.max_iterations)?;

        info!(request = %request, "Starting workflow");

        let mut node = Some(Node::Analyze);
        let mut steps = 0;
        while let Some(current) = node {
            steps += 1;
            if steps > self.step_limit() {
                return Err(OrchestratorError::State(format!(
                    "workflow did not finish within {} steps",
                    self.step_limit()
                )));
            }
            node = self.step(current, &mut state).await?;
        }

        info!(
            iterations = state.iteration_count(),
            errors = state.errors().len(),
            "Workflow complete"
        );

        Ok(WorkflowOutcome { state })
    }
}
