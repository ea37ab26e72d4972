// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pipeline Executor
//!
//! Strictly sequential: stage 0 consumes the initial prompt verbatim, each
//! later stage renders its `prompt_template` with `{{previous}}` bound to
//! the prior stage's output. Execution stops on the first stage error
//! unless that stage sets `continue_on_error`, in which case the error text
//! feeds forward instead.

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::application::executors::{BranchTrace, ExecutionContext, PatternOutcome};
use crate::domain::error::LoomResult;
use crate::domain::events::OrchestrationEvent;
use crate::domain::llm::ChatMessage;
use crate::domain::pattern::PipelineSpec;

pub struct PipelineExecutor;

impl PipelineExecutor {
    pub async fn execute(
        ctx: &ExecutionContext,
        spec: &PipelineSpec,
        input: &str,
    ) -> LoomResult<PatternOutcome> {
        let initial = if spec.initial_prompt.is_empty() {
            input.to_string()
        } else {
            spec.initial_prompt.clone()
        };

        let mut branches = Vec::with_capacity(spec.stages.len());
        let mut history: Vec<ChatMessage> = Vec::new();
        let mut previous = initial.clone();

        for (i, stage) in spec.stages.iter().enumerate() {
            let mut trace = BranchTrace::new(i, &stage.agent_id);
            ctx.events.publish(OrchestrationEvent::BranchStarted {
                branch: i,
                agent_id: stage.agent_id.clone(),
                started_at: trace.started_at,
            });

            let prompt = if i == 0 {
                initial.clone()
            } else {
                ctx.render(
                    &stage.prompt_template,
                    &json!({ "previous": previous, "input": input }),
                )?
            };
            debug!(stage = i, agent_id = %stage.agent_id, "running pipeline stage");

            let mut messages = if spec.pass_full_history {
                let mut carried = history.clone();
                carried.push(ChatMessage::user(prompt.clone()));
                carried
            } else {
                vec![ChatMessage::user(prompt.clone())]
            };

            match ctx
                .agent_turn(i, &stage.agent_id, &mut messages, &mut trace)
                .await
            {
                Ok(output) => {
                    trace.output = Some(output.clone());
                    trace.completed_at = Some(Utc::now());
                    ctx.events.publish(OrchestrationEvent::BranchCompleted {
                        branch: i,
                        agent_id: stage.agent_id.clone(),
                        completed_at: Utc::now(),
                    });
                    branches.push(trace);

                    if spec.pass_full_history {
                        history.push(ChatMessage::user(prompt));
                        history.push(ChatMessage::assistant(output.clone()));
                    }
                    previous = output;
                }
                Err(e) => {
                    trace.error = Some(e.to_string());
                    trace.completed_at = Some(Utc::now());
                    ctx.events.publish(OrchestrationEvent::BranchFailed {
                        branch: i,
                        agent_id: stage.agent_id.clone(),
                        reason: e.to_string(),
                        failed_at: Utc::now(),
                    });
                    branches.push(trace);

                    if stage.continue_on_error {
                        previous = format!("stage {} failed: {}", i, e);
                        continue;
                    }
                    // Later stages never run; the caller gets this stage's error.
                    return Err(e);
                }
            }
        }

        let stage_count = branches.len();
        Ok(PatternOutcome::new(previous, branches)
            .with_metadata("stages", json!(stage_count)))
    }
}
