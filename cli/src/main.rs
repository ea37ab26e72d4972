// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Loom CLI
//!
//! The `loom` binary drives workflow files against the orchestration core.
//!
//! ## Commands
//!
//! - `loom workflow validate <file>` - Parse and validate a workflow file
//! - `loom workflow run <file>` - Validate and execute a workflow
//! - `loom pattern list` - List pattern templates from the data directory
//! - `loom pattern recommend <query>` - Recommend a pattern for a query

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{PatternCommand, WorkflowCommand};

/// Loom - multi-agent orchestration runtime
#[derive(Parser)]
#[command(name = "loom")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Workflow operations (validate, run)
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Pattern template operations (list, recommend)
    Pattern {
        #[command(subcommand)]
        command: PatternCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Workflow { command } => commands::workflow::handle_command(command).await,
        Command::Pattern { command } => commands::pattern::handle_command(command).await,
    }
}
