// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern Executors
//!
//! One executor per pattern kind, all conforming to a common contract:
//! accept `(ctx, spec, input)`, return a `PatternOutcome` carrying the
//! merged output plus a per-branch trace, honor cancellation at every
//! suspension point, and acquire the shared LLM gate around every chat
//! call.

pub mod conditional;
pub mod debate;
pub mod fork_join;
pub mod pipeline;
pub mod swarm;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::application::llm_gate::LlmGate;
use crate::domain::error::{LoomError, LoomResult};
use crate::domain::llm::{ChatMessage, LLMProvider};
use crate::domain::pattern::AgentSpec;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::message_bus::MessageBus;

// ============================================================================
// Execution context
// ============================================================================

/// Shared context handed to every executor invocation.
///
/// No hidden singletons: the gate, bus, and event stream are all passed
/// here explicitly.
#[derive(Clone)]
pub struct ExecutionContext {
    pub llm: Arc<dyn LLMProvider>,
    pub gate: Arc<LlmGate>,
    pub bus: Arc<MessageBus>,
    pub events: EventBus,
    pub cancel: CancellationToken,
    pub templates: Arc<Handlebars<'static>>,
}

impl ExecutionContext {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        gate: Arc<LlmGate>,
        bus: Arc<MessageBus>,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            llm,
            gate,
            bus,
            events,
            cancel,
            templates: Arc::new(new_template_engine()),
        }
    }

    /// Same context with a different cancellation scope (branch subtrees).
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        let mut ctx = self.clone();
        ctx.cancel = cancel;
        ctx
    }

    /// Render a prompt template against a JSON context.
    pub fn render(&self, template: &str, vars: &serde_json::Value) -> LoomResult<String> {
        self.templates
            .render_template(template, vars)
            .map_err(|e| LoomError::InvalidSpec(format!("template rendering failed: {}", e)))
    }

    /// One gated agent turn.
    ///
    /// Drains pending bus deliveries into the conversation as
    /// system-prefixed turns, acquires the LLM gate, runs the chat call,
    /// and releases the gate on every exit path. Gate timestamps are
    /// recorded on the trace.
    pub async fn agent_turn(
        &self,
        branch: usize,
        agent_id: &str,
        messages: &mut Vec<ChatMessage>,
        trace: &mut BranchTrace,
    ) -> LoomResult<String> {
        for injected in self.bus.drain(agent_id).await {
            messages.push(ChatMessage::system(injected.as_system_turn()));
        }

        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(LoomError::Canceled),
            permit = self.gate.acquire(branch) => permit,
        };
        trace.gate_acquired_at = Some(permit.acquired_at());

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(LoomError::Canceled),
            response = self.llm.chat(messages) => {
                response.map_err(LoomError::from)
            }
        };
        trace.gate_released_at = Some(Utc::now());
        drop(permit);

        Ok(result?.content)
    }
}

fn new_template_engine() -> Handlebars<'static> {
    let mut engine = Handlebars::new();
    // Prompts are plain text; HTML escaping would corrupt them.
    engine.register_escape_fn(handlebars::no_escape);
    engine
}

// ============================================================================
// Outcome and traces
// ============================================================================

/// Record of one branch (or one sequential step) of a pattern execution.
#[derive(Debug, Clone, Serialize)]
pub struct BranchTrace {
    pub branch: usize,
    pub agent_id: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub gate_acquired_at: Option<DateTime<Utc>>,
    pub gate_released_at: Option<DateTime<Utc>>,
}

impl BranchTrace {
    pub fn new(branch: usize, agent_id: impl Into<String>) -> Self {
        Self {
            branch,
            agent_id: agent_id.into(),
            output: None,
            error: None,
            timed_out: false,
            started_at: Utc::now(),
            completed_at: None,
            gate_acquired_at: None,
            gate_released_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }
}

/// Result of a full pattern execution.
#[derive(Debug, Clone, Serialize)]
pub struct PatternOutcome {
    pub output: String,
    pub branches: Vec<BranchTrace>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PatternOutcome {
    pub fn new(output: impl Into<String>, branches: Vec<BranchTrace>) -> Self {
        Self {
            output: output.into(),
            branches,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Initial conversation for a pattern agent: optional system prompt plus
/// the rendered user prompt.
pub(crate) fn build_messages(agent: &AgentSpec, prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &agent.system_prompt {
        messages.push(ChatMessage::system(system.clone()));
    }
    messages.push(ChatMessage::user(prompt.to_string()));
    messages
}

/// Prompt for one concurrent branch: per-agent template, then the shared
/// prompt, then the raw input. Templates see `{{input}}`.
pub(crate) fn branch_prompt(
    ctx: &ExecutionContext,
    agent: &AgentSpec,
    shared: Option<&str>,
    input: &str,
) -> LoomResult<String> {
    let vars = serde_json::json!({ "input": input });
    if let Some(template) = &agent.prompt_template {
        ctx.render(template, &vars)
    } else if let Some(shared) = shared {
        ctx.render(shared, &vars)
    } else {
        Ok(input.to_string())
    }
}

/// Run one concurrent agent branch to a finished trace.
///
/// Failures are recorded on the trace, never propagated; the caller's
/// partial-failure policy decides what a failed branch means.
pub(crate) async fn run_agent_branch(
    ctx: &ExecutionContext,
    branch: usize,
    agent: &AgentSpec,
    prompt: String,
) -> BranchTrace {
    let mut trace = BranchTrace::new(branch, &agent.id);
    ctx.events.publish(crate::domain::events::OrchestrationEvent::BranchStarted {
        branch,
        agent_id: agent.id.clone(),
        started_at: trace.started_at,
    });

    let mut messages = build_messages(agent, &prompt);
    match ctx.agent_turn(branch, &agent.id, &mut messages, &mut trace).await {
        Ok(output) => {
            trace.output = Some(output);
            trace.completed_at = Some(Utc::now());
            ctx.events
                .publish(crate::domain::events::OrchestrationEvent::BranchCompleted {
                    branch,
                    agent_id: agent.id.clone(),
                    completed_at: Utc::now(),
                });
        }
        Err(e) => {
            trace.error = Some(e.to_string());
            trace.completed_at = Some(Utc::now());
            ctx.events
                .publish(crate::domain::events::OrchestrationEvent::BranchFailed {
                    branch,
                    agent_id: agent.id.clone(),
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
        }
    }
    trace
}

/// Extract the body of a markdown code fence, preferring ```json blocks.
///
/// LLMs routinely wrap structured output in fences; strip them before
/// parsing.
pub(crate) fn extract_json(text: &str) -> Option<String> {
    let start_marker = "```json";
    if let Some(start) = text.find(start_marker) {
        let content_start = start + start_marker.len();
        if let Some(end_offset) = text[content_start..].find("```") {
            let content_end = content_start + end_offset;
            return Some(text[content_start..content_end].trim().to_string());
        }
    }

    let generic_marker = "```";
    if let Some(start) = text.find(generic_marker) {
        let content_start = start + generic_marker.len();
        if let Some(end_offset) = text[content_start..].find("```") {
            let content_end = content_start + end_offset;
            return Some(text[content_start..content_end].trim().to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_messages_includes_system_prompt() {
        let agent = AgentSpec {
            system_prompt: Some("You judge designs.".into()),
            ..AgentSpec::new("judge")
        };
        let messages = build_messages(&agent, "input");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "You judge designs.");
        assert_eq!(messages[1].content, "input");

        let bare = build_messages(&AgentSpec::new("v"), "input");
        assert_eq!(bare.len(), 1);
    }

    #[test]
    fn extract_json_prefers_json_fence() {
        let text = "Here you go:\n```json\n{\"vote\": \"yes\"}\n```\nDone.";
        assert_eq!(extract_json(text).unwrap(), "{\"vote\": \"yes\"}");

        let generic = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(generic).unwrap(), "{\"a\": 1}");

        assert!(extract_json("no fences here").is_none());
    }
}
