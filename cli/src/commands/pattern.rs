// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern template commands
//!
//! # Commands
//!
//! - `loom pattern list` - List templates from `<LOOM_DATA_DIR>/patterns`
//! - `loom pattern recommend <query>` - Recommend a template for a query

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use loom_core::application::recommender::{
    PatternRecommender, RecommenderConfig, RuleBasedIntentClassifier,
};
use loom_core::infrastructure::pattern_library::PatternLibrary;
use loom_core::infrastructure::paths;

#[derive(Subcommand)]
pub enum PatternCommand {
    /// List pattern templates from the data directory
    List {
        /// Show descriptions and use cases
        #[arg(long, short = 'l')]
        long: bool,
    },

    /// Recommend a pattern template for a query (keyword scoring only)
    Recommend {
        /// The user query
        #[arg(value_name = "QUERY")]
        query: String,
    },
}

pub async fn handle_command(command: PatternCommand) -> Result<()> {
    match command {
        PatternCommand::List { long } => list_patterns(long).await,
        PatternCommand::Recommend { query } => recommend_pattern(query).await,
    }
}

async fn list_patterns(long: bool) -> Result<()> {
    let library = PatternLibrary::from_data_dir();
    let summaries = library.list_summaries();

    if summaries.is_empty() {
        println!("{}", "No pattern templates found.".yellow());
        println!(
            "Place template YAML files under {}",
            paths::loom_subdir("patterns").display()
        );
        return Ok(());
    }

    println!("{}", "Pattern Templates".cyan().bold());
    println!();
    for summary in summaries {
        if long {
            println!("{}", format!("• {}", summary.name).green().bold());
            println!("  Title:       {}", summary.title);
            println!("  Category:    {}", summary.category);
            if !summary.description.is_empty() {
                println!("  Description: {}", summary.description);
            }
            if !summary.use_cases.is_empty() {
                println!("  Use cases:   {}", summary.use_cases.join(", "));
            }
            println!();
        } else {
            println!("• {} ({})", summary.name.green(), summary.category);
        }
    }

    Ok(())
}

async fn recommend_pattern(query: String) -> Result<()> {
    let library = Arc::new(PatternLibrary::from_data_dir());
    let recommender = PatternRecommender::new(library, RecommenderConfig::default())
        .with_classifier(Arc::new(RuleBasedIntentClassifier));

    let selection = recommender.recommend(&query).await?;

    println!("{}", "Recommended pattern".cyan().bold());
    println!();
    println!("  Pattern:    {}", selection.pattern.green().bold());
    println!("  Confidence: {:.2}", selection.confidence);
    println!("  Method:     {:?}", selection.method);
    if let Some(reasoning) = selection.reasoning {
        println!("  Reasoning:  {}", reasoning);
    }

    Ok(())
}
