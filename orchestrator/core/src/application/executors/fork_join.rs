// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fork-Join / Parallel Executor
//!
//! Launches one branch task per agent. Branch dispatch is not serialized by
//! the LLM gate: every branch starts immediately and acquires the gate
//! itself, so surplus branches beyond the gate capacity are observably
//! blocked waiting.
//!
//! Partial-failure policy: a failed branch is recorded in the trace and
//! does not fail the job unless every branch fails. A deadline cancels
//! unfinished branches (their gate permits release on drop) and merges
//! whatever completed; `timeout_seconds: 0` therefore merges nothing.

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::executors::swarm::{parse_ballot, tally_votes, Ballot};
use crate::application::executors::{
    branch_prompt, run_agent_branch, BranchTrace, ExecutionContext, PatternOutcome,
};
use crate::domain::error::{LoomError, LoomResult};
use crate::domain::llm::LLMError;
use crate::domain::pattern::{AgentSpec, ForkJoinSpec, MergeStrategy, SwarmStrategy};

pub struct ForkJoinExecutor;

impl ForkJoinExecutor {
    pub async fn execute(
        ctx: &ExecutionContext,
        spec: &ForkJoinSpec,
        input: &str,
    ) -> LoomResult<PatternOutcome> {
        let agents = spec.branches();
        let deadline = spec
            .timeout_seconds
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        // Branch subtree cancellation: a deadline cancels outstanding
        // branches without touching finished ones.
        let branch_cancel = ctx.cancel.child_token();
        let branch_ctx = ctx.with_cancel(branch_cancel.clone());

        let mut handles = Vec::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            let prompt = branch_prompt(ctx, agent, spec.prompt.as_deref(), input)?;
            let task_ctx = branch_ctx.clone();
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                run_agent_branch(&task_ctx, i, &agent, prompt).await
            }));
        }

        let mut traces: Vec<BranchTrace> = Vec::with_capacity(agents.len());
        for (i, handle) in handles.into_iter().enumerate() {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, handle).await {
                    Ok(joined) => joined,
                    Err(_elapsed) => {
                        // Deadline passed: cancel and abort the stragglers.
                        branch_cancel.cancel();
                        warn!(branch = i, agent_id = %agents[i].id, "branch timed out");
                        let mut trace = BranchTrace::new(i, &agents[i].id);
                        trace.timed_out = true;
                        trace.error = Some("timed out".into());
                        traces.push(trace);
                        continue;
                    }
                },
                None => handle.await,
            };

            match joined {
                Ok(trace) => traces.push(trace),
                Err(e) => {
                    // Aborted or panicked task.
                    let mut trace = BranchTrace::new(i, &agents[i].id);
                    if e.is_cancelled() {
                        trace.timed_out = true;
                        trace.error = Some("timed out".into());
                    } else {
                        trace.error = Some(format!("branch task failed: {}", e));
                    }
                    traces.push(trace);
                }
            }
        }

        if ctx.cancel.is_cancelled() {
            return Err(LoomError::Canceled);
        }

        let completed = traces.iter().filter(|t| t.succeeded()).count();
        let failed = traces
            .iter()
            .filter(|t| t.error.is_some() && !t.timed_out)
            .count();
        debug!(completed, failed, total = traces.len(), "fork-join joined");

        // Every branch genuinely failed (not a timeout): surface the error.
        if completed == 0 && failed == traces.len() && !traces.is_empty() {
            let first_error = traces
                .iter()
                .find_map(|t| t.error.clone())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(LoomError::Upstream(LLMError::Provider(format!(
                "all {} branches failed; first error: {}",
                traces.len(),
                first_error
            ))));
        }

        Self::merge(spec, &agents, traces)
    }

    /// Merge completed branches per the spec's strategy, in spec order
    /// (never completion order) so equal inputs give byte-identical output.
    fn merge(
        spec: &ForkJoinSpec,
        agents: &[AgentSpec],
        traces: Vec<BranchTrace>,
    ) -> LoomResult<PatternOutcome> {
        match spec.merge_strategy {
            MergeStrategy::Concatenate => {
                let sections: Vec<String> = traces
                    .iter()
                    .filter(|t| t.succeeded())
                    .map(|t| {
                        let name = agents
                            .get(t.branch)
                            .map(|a| a.display_name())
                            .unwrap_or(t.agent_id.as_str());
                        format!("## {}\n\n{}", name, t.output.as_deref().unwrap_or_default())
                    })
                    .collect();
                Ok(PatternOutcome::new(sections.join("\n\n"), traces)
                    .with_metadata("merge_strategy", json!("concatenate")))
            }

            MergeStrategy::Vote => {
                let ballots: Vec<Ballot> = traces
                    .iter()
                    .filter(|t| t.succeeded())
                    .map(|t| parse_ballot(t.output.as_deref().unwrap_or_default()))
                    .collect();
                let tally = tally_votes(&ballots, SwarmStrategy::Majority, 0.0);
                let output = tally.winner.clone().unwrap_or_default();
                Ok(PatternOutcome::new(output, traces)
                    .with_metadata("merge_strategy", json!("vote"))
                    .with_metadata("ballots", json!(ballots))
                    .with_metadata("consensus", json!(tally.winner.is_some())))
            }

            MergeStrategy::Custom => {
                // Caller-defined merge: hand back structured outputs.
                let outputs: Vec<serde_json::Value> = traces
                    .iter()
                    .filter(|t| t.succeeded())
                    .map(|t| {
                        json!({
                            "agent": t.agent_id,
                            "output": t.output.as_deref().unwrap_or_default(),
                        })
                    })
                    .collect();
                let output = serde_json::to_string_pretty(&outputs)
                    .map_err(|e| LoomError::Internal(format!("merge serialization: {}", e)))?;
                Ok(PatternOutcome::new(output, traces)
                    .with_metadata("merge_strategy", json!("custom")))
            }
        }
    }
}
