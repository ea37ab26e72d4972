// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Swarm Executor
//!
//! All voters run in parallel under the shared LLM gate. Each voter's
//! output is parsed into a `{vote, confidence}` ballot; ballots at or above
//! the confidence threshold qualify for the tally. When the strategy's bar
//! is unmet, a configured judge breaks the tie, seeing every ballot or
//! only the tallies when `share_votes` is false. Without a judge the swarm
//! reports no consensus.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::application::executors::{
    branch_prompt, extract_json, run_agent_branch, BranchTrace, ExecutionContext, PatternOutcome,
};
use crate::domain::error::{LoomError, LoomResult};
use crate::domain::llm::LLMError;
use crate::domain::pattern::{SwarmSpec, SwarmStrategy};

// ============================================================================
// Ballots
// ============================================================================

/// One voter's parsed ballot. Votes are normalized (trimmed, lowercased)
/// so agreement is case-insensitive.
#[derive(Debug, Clone, Serialize)]
pub struct Ballot {
    pub vote: String,
    pub confidence: f64,
}

#[derive(Deserialize)]
struct RawBallot {
    vote: String,
    #[serde(default = "default_ballot_confidence")]
    confidence: f64,
}

fn default_ballot_confidence() -> f64 {
    1.0
}

/// Parse a voter's output into a ballot.
///
/// JSON (optionally fenced) is authoritative; anything else falls back to
/// the trimmed first line with full confidence.
pub(crate) fn parse_ballot(text: &str) -> Ballot {
    let candidate = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    if let Ok(raw) = serde_json::from_str::<RawBallot>(&candidate) {
        return Ballot {
            vote: raw.vote.trim().to_lowercase(),
            confidence: raw.confidence.clamp(0.0, 1.0),
        };
    }

    let first_line = text.trim().lines().next().unwrap_or("").trim().to_lowercase();
    Ballot {
        vote: first_line,
        confidence: 1.0,
    }
}

/// Tally of qualifying ballots.
pub(crate) struct Tally {
    pub winner: Option<String>,
    pub qualifying: usize,
    /// (vote, count) in first-seen order, deterministic for equal inputs
    pub counts: Vec<(String, usize)>,
}

/// Tally qualifying ballots under the given strategy.
pub(crate) fn tally_votes(ballots: &[Ballot], strategy: SwarmStrategy, threshold: f64) -> Tally {
    let qualifying: Vec<&Ballot> = ballots.iter().filter(|b| b.confidence >= threshold).collect();

    let mut counts: Vec<(String, usize)> = Vec::new();
    for ballot in &qualifying {
        match counts.iter_mut().find(|(vote, _)| *vote == ballot.vote) {
            Some((_, count)) => *count += 1,
            None => counts.push((ballot.vote.clone(), 1)),
        }
    }

    let n = qualifying.len();
    let winner = if n == 0 {
        None
    } else {
        let max = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
        let leaders: Vec<&(String, usize)> = counts.iter().filter(|(_, c)| *c == max).collect();
        let unique_leader = leaders.len() == 1;

        match strategy {
            // Strict plurality: exactly one vote holds the maximum count.
            SwarmStrategy::Majority => unique_leader.then(|| leaders[0].0.clone()),
            SwarmStrategy::Supermajority => {
                (unique_leader && max * 3 >= n * 2).then(|| leaders[0].0.clone())
            }
            SwarmStrategy::Unanimous => (counts.len() == 1).then(|| counts[0].0.clone()),
        }
    };

    Tally {
        winner,
        qualifying: n,
        counts,
    }
}

// ============================================================================
// Executor
// ============================================================================

pub struct SwarmExecutor;

impl SwarmExecutor {
    pub async fn execute(
        ctx: &ExecutionContext,
        spec: &SwarmSpec,
        input: &str,
    ) -> LoomResult<PatternOutcome> {
        let voters: Vec<_> = spec.voters().into_iter().cloned().collect();

        let mut handles = Vec::with_capacity(voters.len());
        for (i, voter) in voters.iter().enumerate() {
            let prompt = vote_prompt(ctx, voter, input)?;
            let branch_ctx = ctx.clone();
            let voter = voter.clone();
            handles.push(tokio::spawn(async move {
                run_agent_branch(&branch_ctx, i, &voter, prompt).await
            }));
        }

        let mut traces = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            let trace =
                joined.map_err(|e| LoomError::Internal(format!("voter task failed: {}", e)))?;
            traces.push(trace);
        }

        if ctx.cancel.is_cancelled() {
            return Err(LoomError::Canceled);
        }

        let completed: Vec<&BranchTrace> = traces.iter().filter(|t| t.succeeded()).collect();
        if completed.is_empty() {
            let first_error = traces
                .iter()
                .find_map(|t| t.error.clone())
                .unwrap_or_else(|| "no voters ran".to_string());
            return Err(LoomError::Upstream(LLMError::Provider(format!(
                "all {} voters failed; first error: {}",
                traces.len(),
                first_error
            ))));
        }

        let ballots: Vec<Ballot> = completed
            .iter()
            .map(|t| parse_ballot(t.output.as_deref().unwrap_or_default()))
            .collect();
        let tally = tally_votes(&ballots, spec.strategy, spec.confidence_threshold);
        debug!(
            qualifying = tally.qualifying,
            total = ballots.len(),
            winner = tally.winner.as_deref().unwrap_or("-"),
            "swarm tally"
        );

        if let Some(winner) = tally.winner.clone() {
            let outcome = PatternOutcome::new(winner, traces)
                .with_metadata("consensus", json!(true));
            return Ok(attach_tally(outcome, spec.strategy, &ballots, &tally));
        }

        if let Some(judge) = spec.judge() {
            let judge_branch = voters.len();
            let prompt = judge_prompt(spec, input, &ballots, &tally);
            let mut traces = traces;
            let trace = run_agent_branch(ctx, judge_branch, judge, prompt).await;
            let verdict = trace.output.clone();
            let error = trace.error.clone();
            traces.push(trace);

            return match verdict {
                Some(answer) => {
                    let outcome = PatternOutcome::new(answer.trim().to_string(), traces)
                        .with_metadata("consensus", json!(false))
                        .with_metadata("judged", json!(true));
                    Ok(attach_tally(outcome, spec.strategy, &ballots, &tally))
                }
                None => Err(LoomError::Upstream(LLMError::Provider(format!(
                    "judge failed: {}",
                    error.unwrap_or_else(|| "no output".into())
                )))),
            };
        }

        let outcome = PatternOutcome::new("", traces)
            .with_metadata("consensus", json!(false))
            .with_metadata("verdict", json!("no_consensus"));
        Ok(attach_tally(outcome, spec.strategy, &ballots, &tally))
    }
}

fn attach_tally(
    outcome: PatternOutcome,
    strategy: SwarmStrategy,
    ballots: &[Ballot],
    tally: &Tally,
) -> PatternOutcome {
    outcome
        .with_metadata("strategy", json!(strategy_name(strategy)))
        .with_metadata("ballots", json!(ballots))
        .with_metadata("qualifying", json!(tally.qualifying))
}

fn strategy_name(strategy: SwarmStrategy) -> &'static str {
    match strategy {
        SwarmStrategy::Majority => "majority",
        SwarmStrategy::Supermajority => "supermajority",
        SwarmStrategy::Unanimous => "unanimous",
    }
}

fn vote_prompt(
    ctx: &ExecutionContext,
    voter: &crate::domain::pattern::AgentSpec,
    input: &str,
) -> LoomResult<String> {
    if voter.prompt_template.is_some() {
        return branch_prompt(ctx, voter, None, input);
    }
    Ok(format!(
        "{}\n\nRespond with JSON:\n{{\"vote\": \"<your choice>\", \"confidence\": <0.0-1.0>}}",
        input
    ))
}

fn judge_prompt(spec: &SwarmSpec, input: &str, ballots: &[Ballot], tally: &Tally) -> String {
    let mut prompt = format!("Question:\n{}\n\n", input);

    if spec.share_votes {
        prompt.push_str("The swarm did not reach consensus. Ballots:\n");
        for (i, ballot) in ballots.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. {} (confidence {:.2})\n",
                i + 1,
                ballot.vote,
                ballot.confidence
            ));
        }
    } else {
        prompt.push_str("The swarm did not reach consensus. Vote tallies:\n");
        for (vote, count) in &tally.counts {
            prompt.push_str(&format!("- {}: {}\n", vote, count));
        }
    }

    prompt.push_str("\nDecide the final answer. Respond with the answer only.");
    prompt
}
