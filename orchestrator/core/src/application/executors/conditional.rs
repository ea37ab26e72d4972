// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Conditional Executor
//!
//! Runs the classifier agent on the input, normalizes its output into a
//! branch key, and executes the single branch agent whose name matches.
//! Undeclared keys fall through to a branch named `default` when present;
//! otherwise the execution fails with `ClassificationUnmatched`. Sequential
//! by design: exactly two agent turns. Nested workflows are out of scope.

use serde_json::json;
use tracing::debug;

use crate::application::executors::{
    branch_prompt, run_agent_branch, ExecutionContext, PatternOutcome,
};
use crate::domain::error::{LoomError, LoomResult};
use crate::domain::llm::LLMError;
use crate::domain::pattern::ConditionalSpec;

pub struct ConditionalExecutor;

impl ConditionalExecutor {
    pub async fn execute(
        ctx: &ExecutionContext,
        spec: &ConditionalSpec,
        input: &str,
    ) -> LoomResult<PatternOutcome> {
        let classifier = spec
            .classifier()
            .ok_or_else(|| LoomError::Internal("validated spec lost its classifier".into()))?;

        let prompt = classifier_prompt(ctx, classifier, spec, input)?;
        let mut traces = Vec::with_capacity(2);
        let classifier_trace = run_agent_branch(ctx, 0, classifier, prompt).await;
        let classifier_output = match &classifier_trace.output {
            Some(output) => output.clone(),
            None => {
                let reason = classifier_trace
                    .error
                    .clone()
                    .unwrap_or_else(|| "no output".into());
                if ctx.cancel.is_cancelled() {
                    return Err(LoomError::Canceled);
                }
                return Err(LoomError::Upstream(LLMError::Provider(format!(
                    "classifier failed: {}",
                    reason
                ))));
            }
        };
        traces.push(classifier_trace);

        let key = normalize_key(&classifier_output);
        debug!(key = %key, "classifier selected branch");

        let branches = spec.branches();
        let selected = branches
            .iter()
            .find(|b| normalize_key(b.display_name()) == key)
            .or_else(|| branches.iter().find(|b| b.display_name() == "default"))
            .copied()
            .ok_or(LoomError::ClassificationUnmatched { output: key.clone() })?;

        let prompt = branch_prompt(ctx, selected, None, input)?;
        let branch_trace = run_agent_branch(ctx, 1, selected, prompt).await;
        let output = match &branch_trace.output {
            Some(output) => output.clone(),
            None => {
                let reason = branch_trace.error.clone().unwrap_or_else(|| "no output".into());
                if ctx.cancel.is_cancelled() {
                    return Err(LoomError::Canceled);
                }
                return Err(LoomError::Upstream(LLMError::Provider(format!(
                    "branch '{}' failed: {}",
                    selected.id, reason
                ))));
            }
        };
        traces.push(branch_trace);

        Ok(PatternOutcome::new(output, traces)
            .with_metadata("classifier_output", json!(classifier_output.trim()))
            .with_metadata("selected_branch", json!(selected.id)))
    }
}

/// Classifier prompt: its own template when declared, otherwise a default
/// that lists the declared branch keys.
fn classifier_prompt(
    ctx: &ExecutionContext,
    classifier: &crate::domain::pattern::AgentSpec,
    spec: &ConditionalSpec,
    input: &str,
) -> LoomResult<String> {
    if classifier.prompt_template.is_some() {
        return branch_prompt(ctx, classifier, None, input);
    }
    let keys: Vec<&str> = spec.branches().iter().map(|b| b.display_name()).collect();
    Ok(format!(
        "{}\n\nClassify this input into exactly one of: {}. Respond with the category name only.",
        input,
        keys.join(", ")
    ))
}

/// Branch keys are matched on the trimmed, lowercased first line with
/// trailing punctuation stripped.
fn normalize_key(text: &str) -> String {
    text.trim()
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(|c: char| c == '.' || c == ',' || c == ':' || c == ';' || c == '"' || c == '\'')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_key_strips_noise() {
        assert_eq!(normalize_key("  Billing.  "), "billing");
        assert_eq!(normalize_key("\"Support\"\nextra reasoning"), "support");
        assert_eq!(normalize_key("REFUND:"), "refund");
    }
}
