// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::message::SubscriptionId;
use crate::domain::session::SessionId;

/// Orchestration lifecycle events, streamed to observers via the event bus.
///
/// Gate events make the LLM semaphore observable: a blocked branch emits
/// `GateWaiting` before `GateAcquired`, so load shedding is visible in the
/// stream without instrumenting executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    PatternStarted {
        pattern: String,
        started_at: DateTime<Utc>,
    },
    PatternCompleted {
        pattern: String,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    PatternFailed {
        pattern: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    BranchStarted {
        branch: usize,
        agent_id: String,
        started_at: DateTime<Utc>,
    },
    BranchCompleted {
        branch: usize,
        agent_id: String,
        completed_at: DateTime<Utc>,
    },
    BranchFailed {
        branch: usize,
        agent_id: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    GateWaiting {
        branch: usize,
        at: DateTime<Utc>,
    },
    GateAcquired {
        branch: usize,
        at: DateTime<Utc>,
    },
    GateReleased {
        branch: usize,
        at: DateTime<Utc>,
    },
    MessagePublished {
        topic: String,
        from_agent: String,
        delivered: usize,
        dropped: usize,
        at: DateTime<Utc>,
    },
    MessageDropped {
        subscription_id: SubscriptionId,
        topic: String,
        at: DateTime<Utc>,
    },
    AgentSpawned {
        parent_session_id: SessionId,
        sub_agent_id: String,
        session_id: SessionId,
        spawned_at: DateTime<Utc>,
    },
    AgentCleaned {
        session_id: SessionId,
        sub_agent_id: String,
        reason: String,
        cleaned_at: DateTime<Utc>,
    },
}
