// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow command implementations
//!
//! # Commands
//!
//! - `loom workflow validate <file>` - Parse and schema-check a workflow file
//! - `loom workflow run <file>` - Validate and execute a workflow

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use loom_core::application::orchestrator::{Orchestrator, OrchestratorConfig};
use loom_core::domain::llm::LLMProvider;
use loom_core::infrastructure::event_bus::EventBus;
use loom_core::infrastructure::llm::{AnthropicAdapter, OpenAIAdapter, ProviderRegistry};
use loom_core::infrastructure::message_bus::MessageBus;
use loom_core::infrastructure::workflow_parser::{WorkflowDefinition, WorkflowParser};

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Validate a workflow file (parse + schema check, no execution)
    Validate {
        /// Path to workflow YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Validate and execute a workflow
    Run {
        /// Path to workflow YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Input passed to the workflow
        #[arg(long, short = 'i', value_name = "TEXT", default_value = "")]
        input: String,

        /// LLM gate capacity
        #[arg(long, default_value = "2")]
        concurrency: usize,
    },
}

pub async fn handle_command(command: WorkflowCommand) -> Result<()> {
    match command {
        WorkflowCommand::Validate { file } => validate_workflow(file).await,
        WorkflowCommand::Run {
            file,
            input,
            concurrency,
        } => run_workflow(file, input, concurrency).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("{}", "Validating workflow file...".cyan());
    println!("   File: {}", file.display());
    println!();

    let definition = WorkflowParser::parse_file(&file).context("Failed to parse workflow file")?;

    println!("{}", "✓ Workflow is valid!".green().bold());
    println!();
    match &definition {
        WorkflowDefinition::Pattern(spec) => {
            println!("  Kind:    pattern");
            println!("  Type:    {}", spec.pattern_type());
        }
        WorkflowDefinition::Communication(spec) => {
            println!("  Kind:        communication");
            println!("  Entrypoint:  {}", spec.entrypoint);
            println!("  Topic:       {}", spec.communication.topic);
            println!("  Agents:      {}", spec.agents.len());
        }
    }

    Ok(())
}

async fn run_workflow(file: PathBuf, input: String, concurrency: usize) -> Result<()> {
    let definition = WorkflowParser::parse_file(&file).context("Failed to parse workflow file")?;

    let spec = match definition {
        WorkflowDefinition::Pattern(spec) => spec,
        WorkflowDefinition::Communication(_) => {
            println!("{}", "✓ Communication workflow is valid.".green());
            println!(
                "{}",
                "Communication workflows run inside the multi-agent server, not the CLI."
                    .yellow()
            );
            return Ok(());
        }
    };

    let llm = provider_from_env()?;
    let events = EventBus::with_default_capacity();
    let bus = Arc::new(MessageBus::new(events.clone()));
    let orchestrator = Orchestrator::new(
        llm,
        bus,
        events,
        OrchestratorConfig {
            llm_concurrency: concurrency,
        },
    );

    println!("{}", "Starting workflow execution...".cyan());
    println!("   Type:  {}", spec.pattern_type());
    if !input.is_empty() {
        println!("   Input: {}", input);
    }
    println!();

    // Ctrl-C cancels in-flight branches instead of killing the process.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let outcome = orchestrator
        .run_with_cancel(&spec, &input, cancel)
        .await
        .context("Workflow execution failed")?;

    println!("{}", "✓ Workflow complete".green().bold());
    println!();
    println!("{}", outcome.output);

    if !outcome.branches.is_empty() {
        println!();
        println!("{}", "Branches:".cyan());
        for trace in &outcome.branches {
            let status = if trace.succeeded() {
                "ok".green()
            } else if trace.timed_out {
                "timeout".yellow()
            } else {
                "failed".red()
            };
            println!("  [{}] {} - {}", trace.branch, trace.agent_id, status);
            if let Some(error) = &trace.error {
                println!("      {}", error.red());
            }
        }
    }

    Ok(())
}

/// Build the LLM provider from environment credentials.
fn provider_from_env() -> Result<Arc<dyn LLMProvider>> {
    if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        let model = std::env::var("LOOM_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
        let adapter = Arc::new(AnthropicAdapter::new(api_key, model));
        return Ok(Arc::new(ProviderRegistry::new("anthropic", adapter)));
    }
    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        let model = std::env::var("LOOM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let adapter = Arc::new(OpenAIAdapter::new(
            "https://api.openai.com/v1".to_string(),
            api_key,
            model,
        ));
        return Ok(Arc::new(ProviderRegistry::new("openai", adapter)));
    }
    bail!("No LLM credentials found. Set ANTHROPIC_API_KEY or OPENAI_API_KEY.")
}
