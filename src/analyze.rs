//! # Analyze Module
//!
//! The workflow's entry node. It decides whether a request needs several
//! specialists and, if so, in what order. The decision sits behind the
//! [`CollaborationClassifier`] trait so the heuristic can be swapped for an
//! LLM call (or anything else) without touching the workflow.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ErrorKind, ErrorRecord, OrchestratorError};
use crate::llm::{generate_structured, Caller, LlmClient};
use crate::state::{AgentRole, MessageEntry, SharedState, Speaker, StateUpdate};

/// Result of classifying a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Ordered specialists; empty when one specialist is enough
    pub plan: Vec<AgentRole>,
    /// Set when classification failed and the run fell back to no plan
    pub error: Option<ErrorRecord>,
}

impl Classification {
    pub fn single() -> Self {
        Self::default()
    }

    /// A plan is only worth recording when it names two or more roles.
    pub fn from_roles(roles: Vec<AgentRole>) -> Self {
        let mut plan = Vec::new();
        for role in roles {
            if !plan.contains(&role) {
                plan.push(role);
            }
        }
        if plan.len() < 2 {
            plan.clear();
        }
        Self { plan, error: None }
    }
}

/// Decides whether a request needs a collaboration plan.
#[async_trait]
pub trait CollaborationClassifier: Send + Sync {
    async fn classify(&self, request: &str) -> Classification;

    fn name(&self) -> &str;
}

// =============================================================================
// KEYWORD CLASSIFIER
// =============================================================================
/// Cues that a request describes more than one step.
const MULTI_STEP_CUES: &[&str] = &[
    r"\bresearch and\b",
    r"\banaly[sz]e and\b",
    r"\bthen\b",
    r"\bafter that\b",
    r"\bfirst\b",
    r"\bsecond\b",
    r"\bfinally\b",
    r"\bcompar\w*",
];

/// Cue words per specialist, in plan order.
const ROLE_CUES: &[(AgentRole, &str)] = &[
    (AgentRole::Research, r"\b(research\w*|find|search\w*|look up)\b"),
    (AgentRole::Data, r"\b(analy[sz]\w*|calculat\w*|compar\w*|data|statistic\w*)\b"),
    (AgentRole::Code, r"\b(code|function|program|script|implement\w*)\b"),
    (AgentRole::Writing, r"\b(write|summar\w*|explain|document\w*|report)\b"),
];

/// Heuristic classifier matching cue words on word boundaries.
pub struct KeywordClassifier {
    multi_step: Vec<Regex>,
    roles: Vec<(AgentRole, Regex)>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        let compile = |pattern: &str| match Regex::new(&format!("(?i){}", pattern)) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern, error = %e, "Skipping invalid classifier pattern");
                None
            }
        };

        Self {
            multi_step: MULTI_STEP_CUES.iter().filter_map(|p| compile(p)).collect(),
            roles: ROLE_CUES
                .iter()
                .filter_map(|(role, p)| compile(p).map(|re| (*role, re)))
                .collect(),
        }
    }

    fn needs_collaboration(&self, request: &str) -> bool {
        self.multi_step.iter().any(|re| re.is_match(request))
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollaborationClassifier for KeywordClassifier {
    async fn classify(&self, request: &str) -> Classification {
        if !self.needs_collaboration(request) {
            return Classification::single();
        }

        let roles = self
            .roles
            .iter()
            .filter(|(_, re)| re.is_match(request))
            .map(|(role, _)| *role)
            .collect();
        Classification::from_roles(roles)
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

// =============================================================================
// LLM CLASSIFIER
// =============================================================================
const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You plan work for a team of specialist AI agents.

AVAILABLE AGENTS (in the order they usually work):
- research: web search, fact-finding, current information
- data: statistics, calculations, comparisons of numbers
- code: programming tasks, code examples
- writing: summaries, articles, explanations, reports

Decide whether the user request needs MORE THAN ONE of these agents.
If it does, list the agents in the order they should run.
If one agent is enough, return an empty list.

Respond with ONLY valid JSON:
{"plan": ["research", "writing"]}
"#;

#[derive(Debug, Deserialize)]
struct PlanResponse {
    plan: Vec<String>,
}

/// Single-call LLM classifier.
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn try_classify(&self, request: &str) -> Result<Vec<AgentRole>, OrchestratorError> {
        let context = format!("USER REQUEST:\n{}", request);
        let response: PlanResponse = generate_structured(
            self.llm.as_ref(),
            Caller::Analyzer,
            CLASSIFIER_SYSTEM_PROMPT,
            &context,
        )
        .await?;

        response.plan.iter().map(|name| name.parse()).collect()
    }
}

#[async_trait]
impl CollaborationClassifier for LlmClassifier {
    async fn classify(&self, request: &str) -> Classification {
        match self.try_classify(request).await {
            Ok(roles) => Classification::from_roles(roles),
            Err(e) => {
                warn!(error = %e, "Collaboration classification failed, continuing without a plan");
                let kind = match e {
                    OrchestratorError::Provider(_) => ErrorKind::Provider,
                    _ => ErrorKind::Validation,
                };
                Classification {
                    plan: Vec::new(),
                    error: Some(ErrorRecord::new(kind, "analyze", e.to_string())),
                }
            }
        }
    }

    fn name(&self) -> &str {
        "llm"
    }
}

// =============================================================================
// ANALYZE NODE
// =============================================================================
/// The analyze node: classify once, record the plan.
pub struct Analyzer {
    classifier: Arc<dyn CollaborationClassifier>,
}

impl Analyzer {
    pub fn new(classifier: Arc<dyn CollaborationClassifier>) -> Self {
        Self { classifier }
    }

    pub async fn run(&self, state: &SharedState) -> StateUpdate {
        let classification = self.classifier.classify(state.user_request()).await;

        let mut update = StateUpdate::default();
        let content = if classification.plan.is_empty() {
            "No collaboration needed; a single specialist will handle the request".to_string()
        } else {
            let steps: Vec<&str> = classification.plan.iter().map(|r| r.as_str()).collect();
            format!("Collaboration plan: {}", steps.join(" → "))
        };

        info!(
            classifier = self.classifier.name(),
            plan = ?classification.plan,
            "Request analyzed"
        );

        if !classification.plan.is_empty() {
            update = update.with_plan(classification.plan);
        }
        if let Some(error) = classification.error {
            update = update.with_error(error);
        }
        update.with_message(MessageEntry::new(Speaker::Analyzer, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedLlm;

    async fn plan_for(request: &str) -> Vec<AgentRole> {
        KeywordClassifier::new().classify(request).await.plan
    }

    #[test]
    fn test_all_patterns_compile() {
        let classifier = KeywordClassifier::new();
        assert_eq!(classifier.multi_step.len(), MULTI_STEP_CUES.len());
        assert_eq!(classifier.roles.len(), ROLE_CUES.len());
    }

    #[tokio::test]
    async fn test_single_agent_request() {
        assert!(plan_for("Write a haiku about Python").await.is_empty());
        assert!(plan_for("Generate a Python function to sort a list").await.is_empty());
    }

    #[tokio::test]
    async fn test_three_step_plan() {
        let plan = plan_for(
            "Research the top 3 Python async frameworks, analyze their GitHub stars, then write a comparison report",
        )
        .await;
        assert_eq!(plan, vec![AgentRole::Research, AgentRole::Data, AgentRole::Writing]);
    }

    #[tokio::test]
    async fn test_word_boundaries() {
        // "authentication" contains "then" but is not a step cue
        assert!(plan_for("Explain authentication and write code for it").await.is_empty());
    }

    #[tokio::test]
    async fn test_single_role_plan_is_dropped() {
        // Multi-step cue, but only one specialist mentioned
        assert!(plan_for("First write an intro, then write a conclusion").await.is_empty());
    }

    #[tokio::test]
    async fn test_llm_classifier_plan() {
        let llm = Arc::new(
            ScriptedLlm::new().respond(Caller::Analyzer, r#"{"plan": ["research", "writing"]}"#),
        );
        let classification = LlmClassifier::new(llm).classify("anything").await;
        assert_eq!(classification.plan, vec![AgentRole::Research, AgentRole::Writing]);
        assert!(classification.error.is_none());
    }

    #[tokio::test]
    async fn test_llm_classifier_invalid_agent() {
        let llm = Arc::new(ScriptedLlm::new().respond(Caller::Analyzer, r#"{"plan": ["poetry"]}"#));
        let classification = LlmClassifier::new(llm).classify("anything").await;
        assert!(classification.plan.is_empty());
        assert_eq!(classification.error.unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_analyzer_records_plan_and_message() {
        let analyzer = Analyzer::new(Arc::new(KeywordClassifier::new()));
        let mut state = SharedState::new("Research Rust web frameworks and then write a summary");

        let update = analyzer.run(&state).await;
        state.apply(update).unwrap();

        assert_eq!(state.collaboration_plan(), &[AgentRole::Research, AgentRole::Writing]);
        assert_eq!(state.messages().len(), 1);
        assert!(state.messages()[0].content.contains("research → writing"));
    }
}
