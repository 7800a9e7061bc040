//! Research specialist: one web search, then an LLM summary of the findings.
//!
//! When search is unavailable (error or no hits) the agent records a
//! `SearchUnavailable` error and answers from the model's own knowledge.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{finish, generate_output, task_context, Specialist};
use crate::error::{ErrorKind, ErrorRecord};
use crate::llm::LlmClient;
use crate::search::{format_hits, SearchHit, SearchProvider};
use crate::state::{AgentRole, SharedState, StateUpdate};

// =============================================================================
// SYSTEM PROMPTS
// =============================================================================
const RESEARCH_SYSTEM_PROMPT: &str = r#"You are a helpful AI research assistant.

Web search results for the user's request are provided below.
Synthesize them into a factual briefing:
- **Overview**: brief introduction to the topic
- **Key Findings**: the most important facts, each tied to a source
- **Open Questions**: anything the sources leave unclear

Only state what the sources support. Do not invent URLs."#;

const OFFLINE_RESEARCH_SYSTEM_PROMPT: &str = r#"You are a helpful AI research assistant.

Web search is unavailable for this request. Answer from your own knowledge:
- **Overview**: brief introduction to the topic
- **Key Findings**: the most important facts you are confident about
- **Caveats**: say clearly that the information may be out of date

Do not invent URLs or cite sources you have not seen."#;

pub struct ResearchAgent {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchProvider>,
}

impl ResearchAgent {
    pub fn new(llm: Arc<dyn LlmClient>, search: Arc<dyn SearchProvider>) -> Self {
        Self { llm, search }
    }

    /// Run the search, turning any failure or empty result into an error record.
    async fn gather(&self, query: &str) -> Result<Vec<SearchHit>, ErrorRecord> {
        let source = AgentRole::Research.as_str();
        match self.search.search(query).await {
            Ok(hits) if hits.is_empty() => {
                warn!(backend = self.search.name(), "Search returned no results");
                Err(ErrorRecord::new(
                    ErrorKind::SearchUnavailable,
                    source,
                    format!("{} returned no results", self.search.name()),
                ))
            }
            Ok(hits) => {
                info!(backend = self.search.name(), count = hits.len(), "Search results gathered");
                Ok(hits)
            }
            Err(e) => {
                warn!(backend = self.search.name(), error = %e, "Search failed, falling back to model knowledge");
                Err(ErrorRecord::search_unavailable(source, &e))
            }
        }
    }
}

/// Append the `Sources:` list to a research summary.
fn with_sources(summary: String, hits: &[SearchHit]) -> String {
    if summary.is_empty() || hits.is_empty() {
        return summary;
    }
    let sources: Vec<String> = hits.iter().map(|h| format!("- {}", h.url)).collect();
    format!("{}\n\nSources:\n{}", summary, sources.join("\n"))
}

#[async_trait]
impl Specialist for ResearchAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Research
    }

    async fn run(&self, state: &SharedState) -> StateUpdate {
        let mut context = task_context(state, &[]);
        let mut errors = Vec::new();

        let (system_prompt, hits) = match self.gather(state.user_request()).await {
            Ok(hits) => {
                context.push_str(&format!("\nSEARCH RESULTS:\n{}", format_hits(&hits)));
                (RESEARCH_SYSTEM_PROMPT, hits)
            }
            Err(record) => {
                errors.push(record);
                (OFFLINE_RESEARCH_SYSTEM_PROMPT, Vec::new())
            }
        };

        let (summary, error) =
            generate_output(self.llm.as_ref(), AgentRole::Research, system_prompt, &context).await;
        errors.extend(error);

        finish(AgentRole::Research, with_sources(summary, &hits), errors)
    }
}
