//! Code specialist. Output is checked for at least one fenced code block.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::{finish, generate_output, task_context, Specialist};
use crate::error::{ErrorKind, ErrorRecord};
use crate::llm::LlmClient;
use crate::state::{AgentRole, SharedState, StateUpdate};

const CODE_SYSTEM_PROMPT: &str = r#"You are an expert software engineer.

Your strengths:
- Writing correct, idiomatic, well-commented code in any mainstream language
- Explaining how the code works and how to run it
- Including error handling and edge cases where they matter

ALWAYS put code inside markdown code fences with a language tag, e.g.:
```python
def example():
    pass
```
Keep explanations brief and put them outside the code fences."#;

const CONTEXT_FROM: [AgentRole; 2] = [AgentRole::Research, AgentRole::Data];

pub struct CodeAgent {
    llm: Arc<dyn LlmClient>,
}

impl CodeAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

/// Every fenced block's body, in order.
pub fn extract_code_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        // Skip the language tag line
        let Some(newline) = after_open.find('\n') else {
            break;
        };
        let body = &after_open[newline + 1..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(body[..close].trim_end());
        rest = &body[close + 3..];
    }

    blocks
}

#[async_trait]
impl Specialist for CodeAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Code
    }

    async fn run(&self, state: &SharedState) -> StateUpdate {
        let context = task_context(state, &CONTEXT_FROM);
        let (output, error) =
            generate_output(self.llm.as_ref(), AgentRole::Code, CODE_SYSTEM_PROMPT, &context).await;

        let mut errors: Vec<ErrorRecord> = error.into_iter().collect();
        if !output.is_empty() && extract_code_blocks(&output).iter().all(|b| b.trim().is_empty()) {
            warn!("Code agent response contains no fenced code");
            errors.push(ErrorRecord::new(
                ErrorKind::Validation,
                AgentRole::Code.as_str(),
                "response contains no fenced code block",
            ));
        }

        finish(AgentRole::Code, output, errors)
    }
}
