//! Writing specialist: free-text generation, no structured parsing.

use async_trait::async_trait;
use std::sync::Arc;

use super::{finish, generate_output, task_context, Specialist};
use crate::llm::LlmClient;
use crate::state::{AgentRole, SharedState, StateUpdate};

const WRITING_SYSTEM_PROMPT: &str = r#"You are an expert writer.

Your strengths:
- Clear, engaging prose adapted to the requested tone and length
- Summaries, articles, explanations, reports and creative pieces
- Turning research notes and analysis into a well-structured narrative

When material from other agents is provided, build on it rather than
repeating it verbatim, and keep every fact consistent with it.
Follow the requested format exactly (word counts, number of paragraphs,
poetic forms)."#;

/// Prior outputs the writer builds on.
const CONTEXT_FROM: [AgentRole; 3] = [AgentRole::Research, AgentRole::Data, AgentRole::Code];

pub struct WritingAgent {
    llm: Arc<dyn LlmClient>,
}

impl WritingAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Specialist for WritingAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Writing
    }

    async fn run(&self, state: &SharedState) -> StateUpdate {
        let context = task_context(state, &CONTEXT_FROM);
        let (output, error) =
            generate_output(self.llm.as_ref(), AgentRole::Writing, WRITING_SYSTEM_PROMPT, &context).await;
        finish(AgentRole::Writing, output, error.into_iter().collect())
    }
}
