//! # Multi-Agent Orchestrator CLI
//!
//! Thin command-line wrapper around the workflow.
//!
//! ## Quick Start
//! ```bash
//! cargo run -- "Write a haiku about Python"
//! cargo run            # interactive mode
//! ```

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use multi_agent_orchestrator::workflow::{self, WorkflowOutcome};
use multi_agent_orchestrator::{Config, Workflow};

const EXAMPLE_REQUESTS: &[&str] = &[
    "Write a 2-paragraph summary about the benefits of remote work",
    "Generate a Python function to calculate fibonacci numbers with memoization",
    "What is the average of these numbers: 45, 67, 89, 23, 56, 78, 90, 12?",
    "What are the latest trends in artificial intelligence?",
    "Research the top 3 Python async frameworks, analyze their GitHub stars, then write a comparison report",
];

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "multi-agent",
    version,
    about = "Routes a request through a team of specialist AI agents",
    long_about = r#"
Multi-Agent Orchestrator - a delegator and four specialists working together.

The delegator reads your request and hands it to the right specialist:
  writing   summaries, articles, explanations
  code      programs, functions, scripts
  data      statistics, calculations, comparisons
  research  web search and fact-finding

Multi-step requests ("research X, analyze Y, then write Z") run the
specialists in order and combine their results.

PREREQUISITES:
  ANTHROPIC_API_KEY in the environment or a .env file
  (or LLM_PROVIDER=ollama with a running Ollama server)

EXAMPLES:
  multi-agent "Write a haiku about Python"
  multi-agent --decision-log "Research Rust web frameworks, then write a summary"
  multi-agent --json "Generate a function to reverse a string"
  multi-agent                 # interactive mode
"#
)]
struct Args {
    /// The request to handle; omit for interactive mode
    #[arg(value_name = "REQUEST")]
    query: Option<String>,

    /// Model used by every agent without a per-role override
    #[arg(short = 'm', long = "model", env = "DEFAULT_MODEL")]
    model: Option<String>,

    /// Enable verbose/debug logging
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,

    /// Print the delegator and agent log after the answer
    #[arg(short = 'd', long = "decision-log", default_value = "false")]
    decision_log: bool,

    /// Print the final state as JSON instead of the formatted answer
    #[arg(long = "json", default_value = "false")]
    json: bool,

    /// Print the workflow graph (Mermaid) and exit
    #[arg(long = "graph", default_value = "false")]
    graph: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.graph {
        println!("{}", workflow::mermaid());
        return Ok(());
    }

    init_logging(args.verbose)?;

    let mut config = Config::from_env()?;
    if let Some(model) = args.model {
        info!(model = %model, "Using model from command line");
        config.default_model = model;
    }
    if args.decision_log {
        config.show_decision_log = true;
    }

    // Configuration errors abort before any node runs
    let workflow = match Workflow::from_config(&config) {
        Ok(workflow) => workflow,
        Err(e) => {
            error!(error = %e, "Startup failed");
            eprintln!("\n❌ {}", e);
            if e.is_configuration() {
                eprintln!("\n💡 Tip: set ANTHROPIC_API_KEY in your environment or .env file");
            }
            return Err(e.into());
        }
    };

    info!(provider = %config.provider, model = %config.default_model, "Configuration loaded");

    match args.query {
        Some(query) => {
            let outcome = workflow.run(&query).await.inspect_err(|e| {
                error!(error = %e, "Request failed");
                eprintln!("\n❌ Request failed: {}", e);
            })?;
            print_outcome(&outcome, config.show_decision_log, args.json)?;
        }
        None => interactive(&workflow, config.show_decision_log, args.json).await?,
    }

    Ok(())
}

/// Read requests from stdin until `quit`. A failed request is reported and
/// the loop goes on.
async fn interactive(workflow: &Workflow, decision_log: bool, json: bool) -> Result<()> {
    println!("Multi-Agent Orchestrator. Type a request, 'help' for examples, 'quit' to exit.");

    let stdin = io::stdin();
    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "help" => {
                println!("Example requests:");
                for example in EXAMPLE_REQUESTS {
                    println!("  - {}", example);
                }
            }
            request => match workflow.run(request).await {
                Ok(outcome) => print_outcome(&outcome, decision_log, json)?,
                Err(e) => {
                    error!(error = %e, "Request failed");
                    eprintln!("❌ Request failed: {}", e);
                }
            },
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn print_outcome(outcome: &WorkflowOutcome, decision_log: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.state)?);
        return Ok(());
    }

    println!("\n{}", "=".repeat(60));
    println!("FINAL ANSWER");
    println!("{}\n", "=".repeat(60));
    println!("{}", outcome.final_answer());
    println!("\n{}", "=".repeat(60));

    if !outcome.errors().is_empty() {
        println!("\n⚠️  {} issue(s) during the run:", outcome.errors().len());
        for record in outcome.errors() {
            println!("  - {}", record);
        }
    }

    if decision_log {
        println!("\nDECISION LOG ({} iteration(s))", outcome.state.iteration_count());
        for (i, entry) in outcome.state.messages().iter().enumerate() {
            println!(
                "  {:>2}. {} [{}] {}",
                i + 1,
                entry.timestamp.format("%H:%M:%S"),
                entry.speaker,
                entry.content
            );
        }
    }

    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
