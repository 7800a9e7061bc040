//! # Multi-Agent Orchestrator
//!
//! Routes a user request through a team of LLM-backed specialists (writing,
//! code, data analysis, research) under the control of a delegator, and
//! combines their outputs into one answer.
//!
//! ```no_run
//! use multi_agent_orchestrator::{Config, Workflow};
//!
//! # async fn demo() -> multi_agent_orchestrator::error::Result<()> {
//! let config = Config::from_env()?;
//! let workflow = Workflow::from_config(&config)?;
//! let outcome = workflow.run("Write a haiku about Python").await?;
//! println!("{}", outcome.final_answer());
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod analyze;
pub mod config;
pub mod error;
pub mod llm;
pub mod search;
pub mod state;
pub mod synthesizer;
pub mod workflow;

pub use config::Config;
pub use error::{ErrorKind, ErrorRecord, OrchestratorError};
pub use state::{AgentRole, Selection, SharedState};
pub use workflow::{Workflow, WorkflowOutcome};
