// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session Domain Model
//!
//! A session is the identified state container for an agent's conversation
//! and metadata. Sessions form a forest through `parent_session_id`: a
//! parent's lifetime fully contains its children's, and destroying a parent
//! cascades to children (driven by the spawn manager's monitors).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live conversation state for one agent.
///
/// # Invariants
/// - `parent_session_id`, when set, refers to an existing session whose
///   lifetime fully contains this one
/// - `updated_at >= created_at`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub id: SessionId,
    pub agent_id: String,
    pub parent_session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentSession {
    pub fn new(agent_id: impl Into<String>, parent_session_id: Option<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            agent_id: agent_id.into(),
            parent_session_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record activity (message turn, injection, tool call).
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// How long the session has been idle.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

/// Persistence boundary for sessions (injected collaborator).
///
/// Implementations may be slow (network, disk); callers must not hold the
/// spawn-table lock across these calls.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_session(&self, session: &AgentSession) -> anyhow::Result<()>;

    async fn load_session(&self, id: SessionId) -> anyhow::Result<Option<AgentSession>>;

    async fn delete_session(&self, id: SessionId) -> anyhow::Result<()>;

    /// Mark activity on a session, bumping `updated_at`.
    async fn touch_session(&self, id: SessionId) -> anyhow::Result<()>;
}
