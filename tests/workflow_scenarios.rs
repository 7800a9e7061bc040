//! End-to-end runs of the workflow against a scripted LLM and a static
//! search backend.

use std::sync::Arc;

use multi_agent_orchestrator::config::{ClassifierKind, Config};
use multi_agent_orchestrator::error::{ErrorKind, OrchestratorError, ProviderError, SearchError};
use multi_agent_orchestrator::llm::mock::ScriptedLlm;
use multi_agent_orchestrator::llm::Caller;
use multi_agent_orchestrator::search::mock::StaticSearch;
use multi_agent_orchestrator::search::SearchHit;
use multi_agent_orchestrator::state::{AgentRole, SharedState, Speaker};
use multi_agent_orchestrator::workflow::{Node, Workflow};

const THREE_STEP_REQUEST: &str =
    "Research the top 3 Python async frameworks, analyze their GitHub stars, then write a comparison report";

fn hits() -> Vec<SearchHit> {
    vec![
        SearchHit {
            title: "FastAPI".into(),
            url: "https://fastapi.tiangolo.com".into(),
            snippet: "FastAPI framework, high performance".into(),
        },
        SearchHit {
            title: "aiohttp".into(),
            url: "https://docs.aiohttp.org".into(),
            snippet: "Asynchronous HTTP client/server".into(),
        },
    ]
}

fn specialist_order(state: &SharedState) -> Vec<AgentRole> {
    state
        .messages()
        .iter()
        .filter_map(|m| match m.speaker {
            Speaker::Specialist(role) => Some(role),
            _ => None,
        })
        .collect()
}

fn delegation(agent: &str) -> String {
    format!(
        r#"{{"selected_agent": "{}", "reasoning": "best fit", "confidence": 0.9, "instructions": ""}}"#,
        agent
    )
}

#[tokio::test]
async fn test_haiku_runs_single_writing_round() {
    let haiku = "Indented blocks flow\nsnakes of logic gently coil\nimport this, find peace";
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(Caller::Delegator, delegation("writing"))
            .respond(Caller::Specialist(AgentRole::Writing), haiku),
    );
    let workflow = Workflow::new(&Config::default(), llm.clone(), Arc::new(StaticSearch::empty()));

    let outcome = workflow.run("Write a haiku about Python").await.unwrap();

    assert!(outcome.state.collaboration_plan().is_empty());
    assert_eq!(outcome.state.iteration_count(), 1);
    assert_eq!(outcome.final_answer(), haiku);
    assert_eq!(outcome.state.output(AgentRole::Writing), Some(haiku));
    assert!(outcome.errors().is_empty());
    // analyze, delegate, writing, synthesize
    assert_eq!(outcome.state.messages().len(), 4);
    assert_eq!(llm.call_count(Caller::Delegator), 1);
}

#[tokio::test]
async fn test_three_step_plan_runs_in_order() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(Caller::Specialist(AgentRole::Research), "FastAPI, aiohttp and Sanic lead.")
            .respond(Caller::Specialist(AgentRole::Data), "FastAPI has the most stars.")
            .respond(Caller::Specialist(AgentRole::Writing), "A comparison report."),
    );
    let search = Arc::new(StaticSearch::with_hits(hits()));
    let workflow = Workflow::new(&Config::default(), llm.clone(), search.clone());

    let outcome = workflow.run(THREE_STEP_REQUEST).await.unwrap();
    let state = &outcome.state;

    assert_eq!(
        state.collaboration_plan(),
        &[AgentRole::Research, AgentRole::Data, AgentRole::Writing]
    );
    assert_eq!(
        specialist_order(state),
        vec![AgentRole::Research, AgentRole::Data, AgentRole::Writing]
    );
    assert_eq!(state.iteration_count(), 3);
    assert_eq!(llm.call_count(Caller::Delegator), 0);
    assert_eq!(search.call_count(), 1);

    let answer = outcome.final_answer();
    assert!(answer.contains("FastAPI, aiohttp and Sanic lead."));
    assert!(answer.contains("https://fastapi.tiangolo.com"));
    assert!(answer.contains("FastAPI has the most stars."));
    assert!(answer.contains("A comparison report."));
    assert!(answer.find("## Research Agent") < answer.find("## Writing Agent"));

    // Data and writing agents build on earlier outputs
    let calls = llm.calls();
    assert!(calls[1].context.contains("FastAPI, aiohttp and Sanic lead."));
    assert!(calls[2].context.contains("FastAPI has the most stars."));
}

#[tokio::test]
async fn test_search_failure_falls_back_to_model_knowledge() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(Caller::Delegator, delegation("research"))
            .respond(Caller::Specialist(AgentRole::Research), "AI agents and small models are trending."),
    );
    let search = Arc::new(StaticSearch::failing(SearchError::Network("connection refused".into())));
    let workflow = Workflow::new(&Config::default(), llm, search);

    let outcome = workflow
        .run("What are the latest trends in artificial intelligence?")
        .await
        .unwrap();

    assert!(outcome
        .errors()
        .iter()
        .any(|e| e.kind == ErrorKind::SearchUnavailable));
    let research = outcome.state.output(AgentRole::Research).unwrap();
    assert!(!research.is_empty());
    assert_eq!(outcome.final_answer(), research);
}

#[tokio::test]
async fn test_invalid_delegation_twice_aborts_without_mutation() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(Caller::Delegator, "I would pick the writer")
            .respond(Caller::Delegator, r#"{"selected_agent": "poet", "reasoning": "x", "confidence": 0.5}"#),
    );
    let workflow = Workflow::new(&Config::default(), llm, Arc::new(StaticSearch::empty()));

    let mut state = SharedState::new("Tell me something");
    workflow.step(Node::Analyze, &mut state).await.unwrap();
    let before = state.messages().len();

    let err = workflow.step(Node::Delegate, &mut state).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::DelegationFailed { attempts: 2, .. }));
    assert_eq!(state.messages().len(), before);
    assert_eq!(state.iteration_count(), 0);
    assert!(state.selected_agent().is_none());
}

#[tokio::test]
async fn test_invalid_delegation_is_fatal_for_run() {
    let llm = Arc::new(ScriptedLlm::new().with_fallback("not a decision"));
    let workflow = Workflow::new(&Config::default(), llm, Arc::new(StaticSearch::empty()));

    let result = workflow.run("Tell me something").await;
    assert!(matches!(result, Err(OrchestratorError::DelegationFailed { .. })));
}

#[tokio::test]
async fn test_iteration_ceiling_returns_partial_results() {
    let config = Config {
        max_iterations: 2,
        ..Config::default()
    };
    let llm = Arc::new(ScriptedLlm::new().with_fallback("partial work"));
    let workflow = Workflow::new(&config, llm, Arc::new(StaticSearch::with_hits(hits())));

    let outcome = workflow.run(THREE_STEP_REQUEST).await.unwrap();

    assert_eq!(outcome.state.iteration_count(), 2);
    assert!(!outcome.state.has_run(AgentRole::Writing));
    assert!(outcome
        .errors()
        .iter()
        .any(|e| e.kind == ErrorKind::IterationLimitExceeded));
    assert!(outcome.final_answer().contains("## Research Agent"));
    assert!(outcome.final_answer().contains("## Data Analysis Agent"));
}

#[tokio::test]
async fn test_each_step_appends_exactly_one_message() {
    let llm = Arc::new(ScriptedLlm::new().with_fallback("output"));
    let workflow = Workflow::new(&Config::default(), llm, Arc::new(StaticSearch::with_hits(hits())));

    let mut state = SharedState::new(THREE_STEP_REQUEST);
    let mut node = Some(Node::Analyze);
    let mut steps = 0;
    while let Some(current) = node {
        let before = state.messages().len();
        node = workflow.step(current, &mut state).await.unwrap();
        assert_eq!(state.messages().len(), before + 1, "node {}", current);
        steps += 1;
    }

    // analyze + three rounds of delegate/specialist/synthesize
    assert_eq!(steps, 10);
    for role in [AgentRole::Research, AgentRole::Data, AgentRole::Writing] {
        assert!(state.has_run(role));
    }
}

#[tokio::test]
async fn test_specialist_failure_does_not_abort() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(Caller::Delegator, delegation("code"))
            .fail(Caller::Specialist(AgentRole::Code), ProviderError::RateLimited),
    );
    let workflow = Workflow::new(&Config::default(), llm, Arc::new(StaticSearch::empty()));

    let outcome = workflow.run("Generate a Python function to sort a list").await.unwrap();

    assert_eq!(outcome.state.output(AgentRole::Code), Some(""));
    assert!(outcome.errors().iter().any(|e| e.kind == ErrorKind::Provider));
    assert!(!outcome.final_answer().is_empty());
}

#[tokio::test]
async fn test_llm_classifier_plan_is_respected() {
    let config = Config {
        classifier: ClassifierKind::Llm,
        ..Config::default()
    };
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(Caller::Analyzer, r#"{"plan": ["research", "writing"]}"#)
            .respond(Caller::Specialist(AgentRole::Research), "findings")
            .respond(Caller::Specialist(AgentRole::Writing), "article"),
    );
    let workflow = Workflow::new(&config, llm, Arc::new(StaticSearch::with_hits(hits())));

    let outcome = workflow.run("Tell me about async Python").await.unwrap();

    assert_eq!(
        specialist_order(&outcome.state),
        vec![AgentRole::Research, AgentRole::Writing]
    );
    assert_eq!(outcome.state.iteration_count(), 2);
}

#[tokio::test]
async fn test_llm_merge_combines_contributions() {
    let config = Config {
        merge_with_llm: true,
        ..Config::default()
    };
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(Caller::Synthesizer, "One cohesive report.")
            .with_fallback("section"),
    );
    let workflow = Workflow::new(&config, llm.clone(), Arc::new(StaticSearch::with_hits(hits())));

    let outcome = workflow.run(THREE_STEP_REQUEST).await.unwrap();

    assert_eq!(outcome.final_answer(), "One cohesive report.");
    assert_eq!(llm.call_count(Caller::Synthesizer), 1);
}

#[tokio::test]
async fn test_zero_ceiling_finishes_without_delegating() {
    let config = Config {
        max_iterations: 0,
        ..Config::default()
    };
    let llm = Arc::new(ScriptedLlm::new());
    let workflow = Workflow::new(&config, llm.clone(), Arc::new(StaticSearch::empty()));

    let outcome = workflow.run("Write a haiku about Python").await.unwrap();

    assert_eq!(outcome.state.iteration_count(), 0);
    assert_eq!(outcome.state.specialists_run(), 0);
    assert!(outcome
        .errors()
        .iter()
        .any(|e| e.kind == ErrorKind::IterationLimitExceeded && e.source == "delegator"));
    assert!(llm.calls().is_empty());
    assert!(!outcome.final_answer().is_empty());
}
