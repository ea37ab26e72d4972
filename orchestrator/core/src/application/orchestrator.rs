// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Orchestrator Application Service
//!
//! Entry point for pattern execution: validates the spec, selects the
//! executor for its tag, and drives it with a shared execution context.
//! The orchestrator owns the single LLM gate every executor shares; its
//! capacity (default 2) is fixed at construction and is the runtime's only
//! LLM throttling mechanism.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::executors::conditional::ConditionalExecutor;
use crate::application::executors::debate::DebateExecutor;
use crate::application::executors::fork_join::ForkJoinExecutor;
use crate::application::executors::pipeline::PipelineExecutor;
use crate::application::executors::swarm::SwarmExecutor;
use crate::application::executors::{ExecutionContext, PatternOutcome};
use crate::application::llm_gate::{LlmGate, DEFAULT_LLM_CONCURRENCY};
use crate::domain::error::LoomResult;
use crate::domain::events::OrchestrationEvent;
use crate::domain::llm::LLMProvider;
use crate::domain::pattern::PatternSpec;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::message_bus::MessageBus;

/// Orchestrator configuration, fixed at startup.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Capacity of the global LLM gate
    pub llm_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            llm_concurrency: DEFAULT_LLM_CONCURRENCY,
        }
    }
}

/// Dispatches pattern executions by spec tag.
pub struct Orchestrator {
    llm: Arc<dyn LLMProvider>,
    gate: Arc<LlmGate>,
    bus: Arc<MessageBus>,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        bus: Arc<MessageBus>,
        events: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        let gate = Arc::new(LlmGate::new(config.llm_concurrency, events.clone()));
        Self {
            llm,
            gate,
            bus,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn gate(&self) -> &Arc<LlmGate> {
        &self.gate
    }

    /// Execution context for one run, scoped to a cancellation token.
    pub fn context(&self, cancel: CancellationToken) -> ExecutionContext {
        ExecutionContext::new(
            self.llm.clone(),
            self.gate.clone(),
            self.bus.clone(),
            self.events.clone(),
            cancel,
        )
    }

    /// Run a pattern to completion.
    pub async fn run(&self, spec: &PatternSpec, input: &str) -> LoomResult<PatternOutcome> {
        self.run_with_cancel(spec, input, CancellationToken::new())
            .await
    }

    /// Run a pattern under an external cancellation signal.
    pub async fn run_with_cancel(
        &self,
        spec: &PatternSpec,
        input: &str,
        cancel: CancellationToken,
    ) -> LoomResult<PatternOutcome> {
        spec.validate()?;

        let pattern = spec.pattern_type();
        let started = std::time::Instant::now();
        info!(pattern, "starting pattern execution");
        self.events.publish(OrchestrationEvent::PatternStarted {
            pattern: pattern.to_string(),
            started_at: Utc::now(),
        });

        let ctx = self.context(cancel);
        let result = match spec {
            PatternSpec::Pipeline(s) => PipelineExecutor::execute(&ctx, s, input).await,
            PatternSpec::ForkJoin(s) | PatternSpec::Parallel(s) => {
                ForkJoinExecutor::execute(&ctx, s, input).await
            }
            PatternSpec::Debate(s) => DebateExecutor::execute(&ctx, s, input).await,
            PatternSpec::Conditional(s) => ConditionalExecutor::execute(&ctx, s, input).await,
            PatternSpec::Swarm(s) => SwarmExecutor::execute(&ctx, s, input).await,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                info!(pattern, duration_ms, "pattern execution complete");
                self.events.publish(OrchestrationEvent::PatternCompleted {
                    pattern: pattern.to_string(),
                    duration_ms,
                    completed_at: Utc::now(),
                });
            }
            Err(e) => {
                warn!(pattern, duration_ms, error = %e, "pattern execution failed");
                self.events.publish(OrchestrationEvent::PatternFailed {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
            }
        }

        result
    }
}
