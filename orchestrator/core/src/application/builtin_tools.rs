// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Builtin Agent Tools
//!
//! Thin wrappers over the spawn manager and the message bus, exposed to
//! hosted agents as callable tools. Failures come back as structured
//! `{code, message, suggestion, retryable}` payloads rather than thrown
//! errors, so an agent can react to them mid-turn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};

use crate::application::spawn_manager::{SpawnManager, SpawnRequest};
use crate::domain::error::LoomError;
use crate::domain::session::SessionId;
use crate::infrastructure::message_bus::MessageBus;

// ============================================================================
// Tool result shape
// ============================================================================

/// Structured tool failure, surfaced to the calling agent.
#[derive(Debug, Clone, Serialize)]
pub struct ToolFailure {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub retryable: bool,
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
    pub execution_time_ms: u64,
}

impl ToolOutcome {
    fn ok(data: Value, start: Instant) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn fail(
        code: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<&str>,
        retryable: bool,
        start: Instant,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolFailure {
                code: code.into(),
                message: message.into(),
                suggestion: suggestion.map(|s| s.to_string()),
                retryable,
            }),
            execution_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn from_loom_error(e: &LoomError, suggestion: &str, start: Instant) -> Self {
        Self::fail(e.code(), e.to_string(), Some(suggestion), e.is_retryable(), start)
    }
}

// ============================================================================
// spawn_agent
// ============================================================================

/// Lets an agent spawn sub-agents for delegation, context isolation, or
/// dynamic scaling. Spawned agents are cleaned up when the parent session
/// ends.
pub struct SpawnAgentTool {
    manager: SpawnManager,
    parent_session: SessionId,
    parent_agent_id: String,
}

impl SpawnAgentTool {
    pub fn new(manager: SpawnManager, parent_session: SessionId, parent_agent_id: String) -> Self {
        Self {
            manager,
            parent_session,
            parent_agent_id,
        }
    }

    pub fn name(&self) -> &'static str {
        "spawn_agent"
    }

    pub fn description(&self) -> &'static str {
        "Spawn a new agent instance to run in the background.\n\n\
         Use this tool to:\n\
         - Create specialists for parallel tasks (e.g. spawn sql-analyst, security-analyst)\n\
         - Isolate context (spawn a fresh agent when the current context is bloated)\n\
         - Scale dynamically (create agents on demand, not all upfront)\n\n\
         The spawned agent runs independently with its own session. Communicate with it via\n\
         pub/sub (auto_subscribe) or the direct message queue (send_message).\n\
         Spawned agents are automatically cleaned up when your session ends."
    }

    pub fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "description": "Parameters for spawning a new agent",
            "properties": {
                "agent_id": {
                    "type": "string",
                    "description": "Agent config to spawn (e.g. 'fighter', 'analyst')"
                },
                "workflow_id": {
                    "type": "string",
                    "description": "Optional: workflow namespace (e.g. 'dungeon-crawl-workflow')"
                },
                "initial_message": {
                    "type": "string",
                    "description": "Optional: first message to send to the spawned agent"
                },
                "auto_subscribe": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional: topics to auto-subscribe (e.g. ['party-chat'])"
                },
                "metadata": {
                    "type": "object",
                    "description": "Optional: metadata key-value pairs for tracking"
                }
            },
            "required": ["agent_id"]
        })
    }

    pub async fn execute(&self, params: Value) -> ToolOutcome {
        let start = Instant::now();

        let agent_id = match params.get("agent_id").and_then(|v| v.as_str()) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return ToolOutcome::fail(
                    "INVALID_AGENT_ID",
                    "agent_id must be a non-empty string",
                    Some("Provide agent_id like 'fighter' or 'analyst'"),
                    false,
                    start,
                );
            }
        };

        let workflow_id = params
            .get("workflow_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let initial_message = params
            .get("initial_message")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let auto_subscribe: Vec<String> = params
            .get("auto_subscribe")
            .and_then(|v| v.as_array())
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(|t| t.as_str())
                    .map(|t| t.to_string())
                    .collect()
            })
            .unwrap_or_default();
        let metadata: HashMap<String, String> = params
            .get("metadata")
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let req = SpawnRequest {
            parent_session_id: self.parent_session,
            parent_agent_id: self.parent_agent_id.clone(),
            agent_id,
            workflow_id,
            initial_message,
            auto_subscribe,
            metadata,
        };

        match self.manager.spawn_sub_agent(req).await {
            Ok(resp) => ToolOutcome::ok(
                json!({
                    "sub_agent_id": resp.sub_agent_id,
                    "session_id": resp.session_id.to_string(),
                    "status": resp.status,
                    "subscribed_topics": resp.subscribed_topics,
                }),
                start,
            ),
            Err(e) => ToolOutcome::from_loom_error(
                &e,
                "Check if the agent config exists and the server has capacity",
                start,
            ),
        }
    }
}

// ============================================================================
// send_message
// ============================================================================

/// Enqueues a directed message on another agent's queue.
pub struct SendMessageTool {
    bus: Arc<MessageBus>,
    from_agent: String,
}

impl SendMessageTool {
    pub fn new(bus: Arc<MessageBus>, from_agent: String) -> Self {
        Self { bus, from_agent }
    }

    pub fn name(&self) -> &'static str {
        "send_message"
    }

    pub fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "description": "Send a direct message to another agent",
            "properties": {
                "to_agent": {
                    "type": "string",
                    "description": "Recipient agent id"
                },
                "body": {
                    "type": "string",
                    "description": "Message body"
                }
            },
            "required": ["to_agent", "body"]
        })
    }

    pub async fn execute(&self, params: Value) -> ToolOutcome {
        let start = Instant::now();

        let Some(to_agent) = params.get("to_agent").and_then(|v| v.as_str()) else {
            return ToolOutcome::fail(
                "INVALID_RECIPIENT",
                "to_agent must be a non-empty string",
                None,
                false,
                start,
            );
        };
        let body = params.get("body").and_then(|v| v.as_str()).unwrap_or_default();

        match self.bus.send_message(&self.from_agent, to_agent, body).await {
            Ok(()) => ToolOutcome::ok(json!({ "delivered": true, "to_agent": to_agent }), start),
            Err(e @ LoomError::QueueFull { .. }) => ToolOutcome::from_loom_error(
                &e,
                "The recipient's queue is full; retry after it drains",
                start,
            ),
            Err(e) => ToolOutcome::from_loom_error(
                &e,
                "Check the agent id, or spawn the agent first",
                start,
            ),
        }
    }
}

// ============================================================================
// publish
// ============================================================================

/// Fans a message out to a topic's subscribers. Non-blocking; zero
/// subscribers is not an error.
pub struct PublishTool {
    bus: Arc<MessageBus>,
    from_agent: String,
}

impl PublishTool {
    pub fn new(bus: Arc<MessageBus>, from_agent: String) -> Self {
        Self { bus, from_agent }
    }

    pub fn name(&self) -> &'static str {
        "publish"
    }

    pub fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "description": "Publish a message to a topic",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "Topic name (e.g. 'party-chat')"
                },
                "body": {
                    "type": "string",
                    "description": "Message body"
                }
            },
            "required": ["topic", "body"]
        })
    }

    pub async fn execute(&self, params: Value) -> ToolOutcome {
        let start = Instant::now();

        let Some(topic) = params.get("topic").and_then(|v| v.as_str()) else {
            return ToolOutcome::fail(
                "INVALID_TOPIC",
                "topic must be a non-empty string",
                None,
                false,
                start,
            );
        };
        let body = params.get("body").and_then(|v| v.as_str()).unwrap_or_default();

        let receipt = self.bus.publish(&self.from_agent, topic, body).await;
        ToolOutcome::ok(
            json!({
                "topic": topic,
                "delivered": receipt.delivered,
                "dropped": receipt.dropped,
            }),
            start,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::spawn_manager::SpawnConfig;
    use crate::domain::agent::AgentConfig;
    use crate::infrastructure::agent_registry::InMemoryAgentRegistry;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::session_store::InMemorySessionStore;

    async fn spawn_tool(max_spawns: usize) -> SpawnAgentTool {
        let store = Arc::new(InMemorySessionStore::new());
        let registry = Arc::new(InMemoryAgentRegistry::new());
        registry.register(AgentConfig::new("fighter")).await;
        let events = EventBus::with_default_capacity();
        let bus = Arc::new(MessageBus::new(events.clone()));
        let manager = SpawnManager::new(
            store,
            registry,
            bus,
            events,
            SpawnConfig {
                max_spawns_per_parent: max_spawns,
                ..SpawnConfig::default()
            },
        );
        SpawnAgentTool::new(manager, SessionId::new(), "gm".into())
    }

    #[tokio::test]
    async fn spawn_tool_returns_structured_success() {
        let tool = spawn_tool(10).await;
        let outcome = tool
            .execute(json!({
                "agent_id": "fighter",
                "workflow_id": "dungeon-crawl",
                "auto_subscribe": ["party-chat"],
            }))
            .await;

        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["sub_agent_id"], "dungeon-crawl:fighter");
        assert_eq!(data["status"], "spawned");
        assert_eq!(data["subscribed_topics"][0], "party-chat");
    }

    #[tokio::test]
    async fn spawn_tool_validates_agent_id() {
        let tool = spawn_tool(10).await;
        let outcome = tool.execute(json!({ "agent_id": "" })).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap().code, "INVALID_AGENT_ID");
    }

    #[tokio::test]
    async fn spawn_tool_reports_limit_as_structured_error() {
        let tool = spawn_tool(2).await;
        assert!(tool.execute(json!({ "agent_id": "fighter" })).await.success);
        assert!(tool.execute(json!({ "agent_id": "fighter" })).await.success);

        let outcome = tool.execute(json!({ "agent_id": "fighter" })).await;
        assert!(!outcome.success);
        let failure = outcome.error.unwrap();
        assert_eq!(failure.code, "SPAWN_LIMIT_REACHED");
        assert!(!failure.retryable);
    }

    #[tokio::test]
    async fn send_message_tool_maps_error_kinds() {
        let events = EventBus::with_default_capacity();
        let bus = Arc::new(MessageBus::new(events));
        let tool = SendMessageTool::new(bus.clone(), "scout".into());

        let outcome = tool
            .execute(json!({ "to_agent": "ghost", "body": "hello" }))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap().code, "RECIPIENT_NOT_FOUND");

        bus.bind_session("leader", SessionId::new(), 1).await;
        assert!(tool
            .execute(json!({ "to_agent": "leader", "body": "one" }))
            .await
            .success);

        let full = tool
            .execute(json!({ "to_agent": "leader", "body": "two" }))
            .await;
        assert!(!full.success);
        let failure = full.error.unwrap();
        assert_eq!(failure.code, "QUEUE_FULL");
        assert!(failure.retryable);
    }

    #[tokio::test]
    async fn publish_tool_succeeds_with_zero_subscribers() {
        let events = EventBus::with_default_capacity();
        let bus = Arc::new(MessageBus::new(events));
        let tool = PublishTool::new(bus, "scout".into());

        let outcome = tool
            .execute(json!({ "topic": "party-chat", "body": "anyone?" }))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["delivered"], 0);
    }
}
