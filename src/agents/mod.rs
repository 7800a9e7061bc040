//! # Agents Module
//!
//! The delegator and the four specialists.
//!
//! ```text
//!                  ┌────────────┐
//!                  │ Delegator  │  picks the next specialist (or done)
//!                  └─────┬──────┘
//!        ┌───────────┬───┴───────┬────────────┐
//!        ▼           ▼           ▼            ▼
//!   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐
//!   │ Writing │ │  Code   │ │  Data   │ │ Research │
//!   └─────────┘ └─────────┘ └─────────┘ └──────────┘
//! ```
//!
//! Every specialist follows the same contract: read the shared state, write
//! exactly one output slot, append exactly one message. An LLM failure is
//! recorded and leaves an empty slot; it never stops the workflow.

mod code;
mod data;
mod delegator;
mod research;
mod writing;

pub use code::CodeAgent;
pub use data::DataAgent;
pub use delegator::{Decision, Delegator};
pub use research::ResearchAgent;
pub use writing::WritingAgent;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ErrorRecord;
use crate::llm::{Caller, LlmClient};
use crate::state::{AgentRole, MessageEntry, SharedState, Speaker, StateUpdate};

/// A single-purpose generator owning one output slot.
#[async_trait]
pub trait Specialist: Send + Sync {
    fn role(&self) -> AgentRole;

    /// Produce this specialist's contribution. Never fails; problems are
    /// recorded in the returned update.
    async fn run(&self, state: &SharedState) -> StateUpdate;
}

/// Build the user-side prompt shared by every specialist: the request, the
/// delegator's instructions and whatever earlier specialists produced.
pub(crate) fn task_context(state: &SharedState, prior: &[AgentRole]) -> String {
    let mut context = format!("USER REQUEST:\n{}\n", state.user_request());

    if let Some(instructions) = state.delegation_instructions().filter(|i| !i.trim().is_empty()) {
        context.push_str(&format!("\nINSTRUCTIONS FROM THE DELEGATOR:\n{}\n", instructions));
    }

    for role in prior {
        if let Some(output) = state.output(*role).filter(|o| !o.trim().is_empty()) {
            context.push_str(&format!(
                "\nOUTPUT FROM THE {}:\n{}\n",
                role.display_name().to_uppercase(),
                output
            ));
        }
    }

    context
}

/// One LLM call on behalf of a specialist. A failure becomes an empty output
/// plus an error record.
pub(crate) async fn generate_output(
    llm: &dyn LlmClient,
    role: AgentRole,
    system_prompt: &str,
    context: &str,
) -> (String, Option<ErrorRecord>) {
    match llm.generate(Caller::Specialist(role), system_prompt, context).await {
        Ok(text) => (text.trim().to_string(), None),
        Err(e) => {
            warn!(agent = %role, error = %e, "Specialist LLM call failed");
            (String::new(), Some(ErrorRecord::provider(role.as_str(), &e)))
        }
    }
}

/// Wrap a specialist's output into its state update.
pub(crate) fn finish(role: AgentRole, output: String, errors: Vec<ErrorRecord>) -> StateUpdate {
    let content = if output.is_empty() {
        format!("{} could not produce a result", role.display_name())
    } else {
        format!("{} completed ({} chars)", role.display_name(), output.len())
    };

    info!(agent = %role, chars = output.len(), errors = errors.len(), "Specialist finished");

    let metadata = serde_json::json!({ "chars": output.len(), "errors": errors.len() });
    let mut update = StateUpdate::default()
        .with_output(role, output)
        .with_message(MessageEntry::new(Speaker::Specialist(role), content).with_metadata(metadata));
    for error in errors {
        update = update.with_error(error);
    }
    update
}
