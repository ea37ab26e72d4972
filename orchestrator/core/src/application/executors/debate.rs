// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Debate Executor
//!
//! `rounds` passes over the debaters in spec order; every turn sees the
//! transcript of all prior turns. The moderator speaks per
//! `moderator_cadence` and its final output is the debate result; without
//! a moderator the formatted transcript is. Cancellation mid-round yields
//! the partial transcript instead of an error.

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::application::executors::{BranchTrace, ExecutionContext, PatternOutcome};
use crate::domain::error::{LoomError, LoomResult};
use crate::domain::events::OrchestrationEvent;
use crate::domain::llm::ChatMessage;
use crate::domain::pattern::{AgentSpec, DebateSpec, ModeratorCadence};

pub struct DebateExecutor;

impl DebateExecutor {
    pub async fn execute(
        ctx: &ExecutionContext,
        spec: &DebateSpec,
        input: &str,
    ) -> LoomResult<PatternOutcome> {
        let debaters = spec.debaters();
        let moderator = spec.moderator();

        let mut transcript: Vec<(String, String)> = Vec::new();
        let mut traces: Vec<BranchTrace> = Vec::new();
        let mut moderator_output: Option<String> = None;
        let mut turn = 0usize;

        for round in 1..=spec.rounds {
            for debater in &debaters {
                let prompt = debater_prompt(input, round, spec.rounds, debater, &transcript);
                match Self::turn(ctx, turn, debater, prompt, &mut traces).await {
                    TurnResult::Output(text) => {
                        transcript.push((debater.display_name().to_string(), text));
                    }
                    TurnResult::Canceled => {
                        return Ok(Self::partial_outcome(input, transcript, traces, round));
                    }
                    TurnResult::Failed(e) => return Err(e),
                }
                turn += 1;
            }

            let moderate = match spec.moderator_cadence {
                ModeratorCadence::EveryRound => true,
                ModeratorCadence::FinalOnly => round == spec.rounds,
            };
            if moderate {
                if let Some(moderator) = moderator {
                    let prompt = moderator_prompt(input, round, spec.rounds, &transcript);
                    match Self::turn(ctx, turn, moderator, prompt, &mut traces).await {
                        TurnResult::Output(text) => {
                            transcript.push((moderator.display_name().to_string(), text.clone()));
                            moderator_output = Some(text);
                        }
                        TurnResult::Canceled => {
                            return Ok(Self::partial_outcome(input, transcript, traces, round));
                        }
                        TurnResult::Failed(e) => return Err(e),
                    }
                    turn += 1;
                }
            }
            debug!(round, turns = turn, "debate round complete");
        }

        let output = moderator_output.unwrap_or_else(|| format_transcript(&transcript));
        Ok(PatternOutcome::new(output, traces)
            .with_metadata("rounds", json!(spec.rounds))
            .with_metadata("turns", json!(turn)))
    }

    async fn turn(
        ctx: &ExecutionContext,
        branch: usize,
        agent: &AgentSpec,
        prompt: String,
        traces: &mut Vec<BranchTrace>,
    ) -> TurnResult {
        let mut trace = BranchTrace::new(branch, &agent.id);
        ctx.events.publish(OrchestrationEvent::BranchStarted {
            branch,
            agent_id: agent.id.clone(),
            started_at: trace.started_at,
        });

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &agent.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(prompt));

        match ctx.agent_turn(branch, &agent.id, &mut messages, &mut trace).await {
            Ok(output) => {
                trace.output = Some(output.clone());
                trace.completed_at = Some(Utc::now());
                ctx.events.publish(OrchestrationEvent::BranchCompleted {
                    branch,
                    agent_id: agent.id.clone(),
                    completed_at: Utc::now(),
                });
                traces.push(trace);
                TurnResult::Output(output)
            }
            Err(LoomError::Canceled) => {
                trace.error = Some("canceled".into());
                trace.completed_at = Some(Utc::now());
                traces.push(trace);
                TurnResult::Canceled
            }
            Err(e) => {
                trace.error = Some(e.to_string());
                trace.completed_at = Some(Utc::now());
                ctx.events.publish(OrchestrationEvent::BranchFailed {
                    branch,
                    agent_id: agent.id.clone(),
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
                traces.push(trace);
                TurnResult::Failed(e)
            }
        }
    }

    fn partial_outcome(
        _input: &str,
        transcript: Vec<(String, String)>,
        traces: Vec<BranchTrace>,
        round: u32,
    ) -> PatternOutcome {
        PatternOutcome::new(format_transcript(&transcript), traces)
            .with_metadata("canceled", json!(true))
            .with_metadata("canceled_in_round", json!(round))
    }
}

enum TurnResult {
    Output(String),
    Canceled,
    Failed(LoomError),
}

fn format_transcript(transcript: &[(String, String)]) -> String {
    transcript
        .iter()
        .map(|(speaker, text)| format!("{}: {}", speaker, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn debater_prompt(
    input: &str,
    round: u32,
    total_rounds: u32,
    debater: &AgentSpec,
    transcript: &[(String, String)],
) -> String {
    let mut prompt = format!("Debate topic:\n{}\n\n", input);
    if !transcript.is_empty() {
        prompt.push_str(&format!("Transcript so far:\n{}\n\n", format_transcript(transcript)));
    }
    prompt.push_str(&format!(
        "You are {}. Round {} of {}. Present your argument.",
        debater.display_name(),
        round,
        total_rounds
    ));
    prompt
}

fn moderator_prompt(
    input: &str,
    round: u32,
    total_rounds: u32,
    transcript: &[(String, String)],
) -> String {
    format!(
        "Debate topic:\n{}\n\nTranscript:\n{}\n\nYou are the moderator. Round {} of {}. \
         Summarize the strongest points and state the current conclusion.",
        input,
        format_transcript(transcript),
        round,
        total_rounds
    )
}
