// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Session Store
//!
//! Reference implementation of the injected `SessionStore` capability.
//! Production deployments swap in a persistent store; the runtime only ever
//! talks to the trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::session::{AgentSession, SessionId, SessionStore};

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, AgentSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save_session(&self, session: &AgentSession) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn load_session(&self, id: SessionId) -> anyhow::Result<Option<AgentSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id).cloned())
    }

    async fn delete_session(&self, id: SessionId) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id);
        Ok(())
    }

    async fn touch_session(&self, id: SessionId) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&id) {
            session.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_delete_round_trip() {
        let store = InMemorySessionStore::new();
        let session = AgentSession::new("analyst", None);
        let id = session.id;

        store.save_session(&session).await.unwrap();
        let loaded = store.load_session(id).await.unwrap().unwrap();
        assert_eq!(loaded.agent_id, "analyst");

        store.delete_session(id).await.unwrap();
        assert!(store.load_session(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_bumps_updated_at() {
        let store = InMemorySessionStore::new();
        let session = AgentSession::new("analyst", None);
        let id = session.id;
        let before = session.updated_at;

        store.save_session(&session).await.unwrap();
        store.touch_session(id).await.unwrap();

        let loaded = store.load_session(id).await.unwrap().unwrap();
        assert!(loaded.updated_at >= before);
    }
}
