//! Data analysis specialist.
//!
//! Numbers come from the model; nothing is recomputed here.

use async_trait::async_trait;
use std::sync::Arc;

use super::{finish, generate_output, task_context, Specialist};
use crate::llm::LlmClient;
use crate::state::{AgentRole, SharedState, StateUpdate};

const DATA_SYSTEM_PROMPT: &str = r#"You are an expert data analyst.

Your strengths:
- Statistical reasoning, calculations and comparisons
- Spotting trends, outliers and meaningful differences
- Presenting numbers in tables or bullet lists with clear units

When research findings are provided, base the analysis on them and say
which figures are estimates. Show the key calculations step by step and
end with a short list of conclusions."#;

const CONTEXT_FROM: [AgentRole; 1] = [AgentRole::Research];

pub struct DataAgent {
    llm: Arc<dyn LlmClient>,
}

impl DataAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Specialist for DataAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Data
    }

    async fn run(&self, state: &SharedState) -> StateUpdate {
        let context = task_context(state, &CONTEXT_FROM);
        let (output, error) =
            generate_output(self.llm.as_ref(), AgentRole::Data, DATA_SYSTEM_PROMPT, &context).await;
        finish(AgentRole::Data, output, error.into_iter().collect())
    }
}
