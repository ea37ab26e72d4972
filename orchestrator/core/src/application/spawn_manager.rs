// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Spawn Manager
//!
//! Owns the parent→child session graph: bounded spawn fan-out, per-child
//! lifecycle monitors, and deterministic cascading cleanup when a parent
//! ends. The graph is a forest, and a depth cap recorded alongside each child
//! prevents runaway spawn chains.
//!
//! Shared-resource discipline: the spawn table lock is never held across
//! session-store or bus calls, and snapshot reads copy out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::agent::AgentRegistry;
use crate::domain::error::{LoomError, LoomResult};
use crate::domain::events::OrchestrationEvent;
use crate::domain::message::SubscriptionId;
use crate::domain::session::{AgentSession, SessionId, SessionStore};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::message_bus::MessageBus;

/// Default cap on live children per parent.
pub const MAX_SPAWNS_PER_PARENT: usize = 10;

/// Default cap on spawn chain depth below a root session.
pub const MAX_SPAWN_DEPTH: u32 = 4;

#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub max_spawns_per_parent: usize,
    pub max_depth: u32,
    /// Monitor tick interval
    pub monitor_interval: Duration,
    /// Idle threshold after which a child session expires
    pub idle_timeout: Duration,
    /// Direct-queue capacity for spawned agents
    pub queue_capacity: usize,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            max_spawns_per_parent: MAX_SPAWNS_PER_PARENT,
            max_depth: MAX_SPAWN_DEPTH,
            monitor_interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10 * 60),
            queue_capacity: 100,
        }
    }
}

/// Request to spawn a child agent under a parent session.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub parent_session_id: SessionId,
    pub parent_agent_id: String,
    /// Agent config to spawn (e.g. "fighter")
    pub agent_id: String,
    /// Optional workflow namespace (e.g. "dungeon-crawl-workflow")
    pub workflow_id: Option<String>,
    /// Stored in metadata; the parent dispatches it via send_message/publish
    pub initial_message: Option<String>,
    /// Topics to auto-subscribe
    pub auto_subscribe: Vec<String>,
    pub metadata: HashMap<String, String>,
}

/// Result of a successful spawn.
#[derive(Debug, Clone)]
pub struct SpawnResponse {
    /// Full agent id (workflow-prefixed when a namespace was given)
    pub sub_agent_id: String,
    pub session_id: SessionId,
    pub status: String,
    pub subscribed_topics: Vec<String>,
}

/// Tracked state for one spawned child.
#[derive(Clone)]
pub struct SpawnedAgentContext {
    pub parent_session_id: SessionId,
    pub parent_agent_id: String,
    pub sub_agent_id: String,
    pub sub_session_id: SessionId,
    pub workflow_id: Option<String>,
    pub depth: u32,
    pub subscriptions: Vec<SubscriptionId>,
    pub metadata: HashMap<String, String>,
    pub cancel: CancellationToken,
    pub spawned_at: DateTime<Utc>,
}

/// Manages spawned child agents and their monitors.
#[derive(Clone)]
pub struct SpawnManager {
    store: Arc<dyn SessionStore>,
    registry: Arc<dyn AgentRegistry>,
    bus: Arc<MessageBus>,
    events: EventBus,
    spawned: Arc<RwLock<HashMap<SessionId, SpawnedAgentContext>>>,
    config: SpawnConfig,
}

impl SpawnManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: Arc<dyn AgentRegistry>,
        bus: Arc<MessageBus>,
        events: EventBus,
        config: SpawnConfig,
    ) -> Self {
        Self {
            store,
            registry,
            bus,
            events,
            spawned: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Spawn a new agent as a child of the given parent session.
    pub async fn spawn_sub_agent(&self, req: SpawnRequest) -> LoomResult<SpawnResponse> {
        if req.agent_id.is_empty() {
            return Err(LoomError::InvalidSpec("agent_id is required".into()));
        }

        info!(
            parent_session = %req.parent_session_id,
            parent_agent = %req.parent_agent_id,
            agent_id = %req.agent_id,
            workflow_id = req.workflow_id.as_deref().unwrap_or(""),
            "spawning sub-agent"
        );

        // Fast-fail on limits; re-checked under the write lock below.
        let (existing, parent_depth) = {
            let spawned = self.spawned.read().await;
            let existing = spawned
                .values()
                .filter(|c| c.parent_session_id == req.parent_session_id)
                .count();
            let parent_depth = spawned
                .get(&req.parent_session_id)
                .map(|c| c.depth)
                .unwrap_or(0);
            (existing, parent_depth)
        };
        if existing >= self.config.max_spawns_per_parent {
            return Err(LoomError::SpawnLimitReached {
                parent: req.parent_session_id.to_string(),
                count: existing,
                max: self.config.max_spawns_per_parent,
            });
        }
        let depth = parent_depth + 1;
        if depth > self.config.max_depth {
            return Err(LoomError::SpawnLimitReached {
                parent: req.parent_session_id.to_string(),
                count: depth as usize,
                max: self.config.max_depth as usize,
            });
        }

        // Namespace the child id when a workflow is given.
        let sub_agent_id = match &req.workflow_id {
            Some(workflow_id) => format!("{}:{}", workflow_id, req.agent_id),
            None => req.agent_id.clone(),
        };

        // The config must exist before we create any state.
        self.registry.load(&req.agent_id).await?;

        let session = AgentSession::new(&req.agent_id, Some(req.parent_session_id));
        let session_id = session.id;
        self.store
            .save_session(&session)
            .await
            .map_err(|e| LoomError::Internal(format!("failed to create session: {}", e)))?;

        info!(session_id = %session_id, sub_agent_id = %sub_agent_id, "created sub-agent session");

        self.bus
            .bind_session(&sub_agent_id, session_id, self.config.queue_capacity)
            .await;

        // Auto-subscribe failures never abort a spawn.
        let mut subscribed_topics = Vec::new();
        let mut subscription_ids = Vec::new();
        for topic in &req.auto_subscribe {
            if topic.is_empty() {
                warn!(sub_agent_id = %sub_agent_id, "skipping empty auto-subscribe topic");
                continue;
            }
            let subscription = self
                .bus
                .subscribe(&sub_agent_id, topic, None, self.config.queue_capacity)
                .await;
            info!(
                sub_agent_id = %sub_agent_id,
                topic = %topic,
                subscription_id = %subscription.id,
                "auto-subscribed spawned agent to topic"
            );
            subscribed_topics.push(topic.clone());
            subscription_ids.push(subscription.id);
        }

        let mut metadata = req.metadata.clone();
        if let Some(initial_message) = &req.initial_message {
            // Stored for the parent to dispatch via send_message/publish.
            metadata.insert("initial_message".to_string(), initial_message.clone());
            info!(
                session_id = %session_id,
                preview = %truncate(initial_message, 50),
                "initial message stored in metadata"
            );
        }

        let cancel = CancellationToken::new();
        let context = SpawnedAgentContext {
            parent_session_id: req.parent_session_id,
            parent_agent_id: req.parent_agent_id.clone(),
            sub_agent_id: sub_agent_id.clone(),
            sub_session_id: session_id,
            workflow_id: req.workflow_id.clone(),
            depth,
            subscriptions: subscription_ids.clone(),
            metadata,
            cancel: cancel.clone(),
            spawned_at: Utc::now(),
        };

        // Insert under the write lock, re-checking the fan-out limit so
        // concurrent spawns cannot overshoot it.
        {
            let mut spawned = self.spawned.write().await;
            let current = spawned
                .values()
                .filter(|c| c.parent_session_id == req.parent_session_id)
                .count();
            if current >= self.config.max_spawns_per_parent {
                drop(spawned);
                self.rollback_spawn(&sub_agent_id, session_id, &subscription_ids)
                    .await;
                return Err(LoomError::SpawnLimitReached {
                    parent: req.parent_session_id.to_string(),
                    count: current,
                    max: self.config.max_spawns_per_parent,
                });
            }
            spawned.insert(session_id, context);
        }

        self.events.publish(OrchestrationEvent::AgentSpawned {
            parent_session_id: req.parent_session_id,
            sub_agent_id: sub_agent_id.clone(),
            session_id,
            spawned_at: Utc::now(),
        });

        // Per-child lifecycle monitor.
        let manager = self.clone();
        tokio::spawn(async move {
            manager.monitor_spawned_agent(session_id, cancel).await;
        });

        info!(
            sub_agent_id = %sub_agent_id,
            session_id = %session_id,
            subscribed_topics = subscribed_topics.len(),
            "sub-agent spawn complete"
        );

        Ok(SpawnResponse {
            sub_agent_id,
            session_id,
            status: "spawned".to_string(),
            subscribed_topics,
        })
    }

    async fn rollback_spawn(
        &self,
        sub_agent_id: &str,
        session_id: SessionId,
        subscriptions: &[SubscriptionId],
    ) {
        for sub_id in subscriptions {
            self.bus.unsubscribe(*sub_id).await;
        }
        self.bus.unbind_session(sub_agent_id).await;
        if let Err(e) = self.store.delete_session(session_id).await {
            warn!(session_id = %session_id, error = %e, "failed to roll back session");
        }
    }

    /// Count of live children for a parent.
    pub async fn count_by_parent(&self, parent_session_id: SessionId) -> usize {
        let spawned = self.spawned.read().await;
        spawned
            .values()
            .filter(|c| c.parent_session_id == parent_session_id)
            .count()
    }

    /// Snapshot of a tracked child.
    pub async fn get(&self, session_id: SessionId) -> Option<SpawnedAgentContext> {
        let spawned = self.spawned.read().await;
        spawned.get(&session_id).cloned()
    }

    /// Snapshot of all live children of a parent.
    pub async fn children_of(&self, parent_session_id: SessionId) -> Vec<SpawnedAgentContext> {
        let spawned = self.spawned.read().await;
        spawned
            .values()
            .filter(|c| c.parent_session_id == parent_session_id)
            .cloned()
            .collect()
    }

    /// Monitor one spawned agent until it expires or its context fires.
    async fn monitor_spawned_agent(&self, session_id: SessionId, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.monitor_interval,
            self.config.monitor_interval,
        );
        let idle_timeout = chrono::Duration::from_std(self.config.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(session_id = %session_id, "spawned agent monitor canceled");
                    self.cleanup(session_id, "parent context canceled").await;
                    return;
                }
                _ = ticker.tick() => {
                    match self.store.load_session(session_id).await {
                        Ok(Some(session)) => {
                            let idle = Utc::now() - session.updated_at;
                            if idle > idle_timeout {
                                info!(
                                    session_id = %session_id,
                                    idle_secs = idle.num_seconds(),
                                    "spawned agent session expired"
                                );
                                self.cleanup(session_id, "session expired").await;
                                return;
                            }
                        }
                        Ok(None) => {
                            self.cleanup(session_id, "session missing").await;
                            return;
                        }
                        Err(e) => {
                            warn!(session_id = %session_id, error = %e, "failed to load spawned agent session");
                        }
                    }
                }
            }
        }
    }

    /// Remove a spawned agent from tracking and release its resources,
    /// cascading to its own spawned children so a whole subtree terminates
    /// deterministically.
    ///
    /// Idempotent: cleaning an unknown session is a no-op.
    pub async fn cleanup(&self, session_id: SessionId, reason: &str) {
        // Worklist instead of recursion: each cleaned session enqueues its
        // children.
        let mut pending = vec![(session_id, reason.to_string())];

        while let Some((session_id, reason)) = pending.pop() {
            let context = {
                let mut spawned = self.spawned.write().await;
                spawned.remove(&session_id)
            };
            let Some(context) = context else {
                continue;
            };

            info!(
                session_id = %session_id,
                sub_agent_id = %context.sub_agent_id,
                reason = %reason,
                "cleaning up spawned agent"
            );

            context.cancel.cancel();

            for sub_id in &context.subscriptions {
                // No-op if the subscription is already gone.
                self.bus.unsubscribe(*sub_id).await;
                debug!(
                    sub_agent_id = %context.sub_agent_id,
                    subscription_id = %sub_id,
                    "unsubscribed spawned agent"
                );
            }
            self.bus.unbind_session(&context.sub_agent_id).await;

            if let Err(e) = self.store.delete_session(session_id).await {
                warn!(session_id = %session_id, error = %e, "failed to delete expired session");
            }

            self.events.publish(OrchestrationEvent::AgentCleaned {
                session_id,
                sub_agent_id: context.sub_agent_id.clone(),
                reason: reason.clone(),
                cleaned_at: Utc::now(),
            });

            let children: Vec<SessionId> = {
                let spawned = self.spawned.read().await;
                spawned
                    .values()
                    .filter(|c| c.parent_session_id == session_id)
                    .map(|c| c.sub_session_id)
                    .collect()
            };
            pending.extend(
                children
                    .into_iter()
                    .map(|child| (child, "parent session ended".to_string())),
            );

            info!(
                session_id = %session_id,
                sub_agent_id = %context.sub_agent_id,
                "spawned agent cleanup complete"
            );
        }
    }

    /// Clean up every child of a parent session (invoked when the parent
    /// ends, so children terminate deterministically).
    pub async fn cleanup_by_parent(&self, parent_session_id: SessionId) {
        let to_cleanup: Vec<SessionId> = {
            let spawned = self.spawned.read().await;
            spawned
                .values()
                .filter(|c| c.parent_session_id == parent_session_id)
                .map(|c| c.sub_session_id)
                .collect()
        };

        if !to_cleanup.is_empty() {
            info!(
                parent_session = %parent_session_id,
                spawned_count = to_cleanup.len(),
                "cleaning up spawned agents for parent"
            );
            for session_id in to_cleanup {
                self.cleanup(session_id, "parent session ended").await;
            }
        }
    }

    /// Tear down every tracked child (server shutdown).
    pub async fn shutdown(&self) {
        let all: Vec<SessionId> = {
            let spawned = self.spawned.read().await;
            spawned.keys().copied().collect()
        };
        for session_id in all {
            self.cleanup(session_id, "server shutdown").await;
        }
    }

    pub async fn live_count(&self) -> usize {
        self.spawned.read().await.len()
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentConfig;
    use crate::infrastructure::agent_registry::InMemoryAgentRegistry;
    use crate::infrastructure::session_store::InMemorySessionStore;

    async fn manager_with(config: SpawnConfig) -> (SpawnManager, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        let registry = Arc::new(InMemoryAgentRegistry::new());
        registry.register(AgentConfig::new("fighter")).await;
        registry.register(AgentConfig::new("wizard")).await;
        let events = EventBus::with_default_capacity();
        let bus = Arc::new(MessageBus::new(events.clone()));
        (
            SpawnManager::new(store.clone(), registry, bus, events, config),
            store,
        )
    }

    fn request(parent: SessionId, agent: &str) -> SpawnRequest {
        SpawnRequest {
            parent_session_id: parent,
            parent_agent_id: "gm".into(),
            agent_id: agent.into(),
            workflow_id: None,
            initial_message: None,
            auto_subscribe: vec![],
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn spawn_creates_session_and_tracks_child() {
        let (manager, store) = manager_with(SpawnConfig::default()).await;
        let parent = SessionId::new();

        let resp = manager.spawn_sub_agent(request(parent, "fighter")).await.unwrap();
        assert_eq!(resp.status, "spawned");
        assert_eq!(resp.sub_agent_id, "fighter");
        assert_eq!(manager.count_by_parent(parent).await, 1);
        assert!(store.load_session(resp.session_id).await.unwrap().is_some());

        let child = manager.get(resp.session_id).await.unwrap();
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_session_id, parent);
    }

    #[tokio::test]
    async fn workflow_id_namespaces_the_child() {
        let (manager, _) = manager_with(SpawnConfig::default()).await;
        let mut req = request(SessionId::new(), "fighter");
        req.workflow_id = Some("dungeon-crawl".into());

        let resp = manager.spawn_sub_agent(req).await.unwrap();
        assert_eq!(resp.sub_agent_id, "dungeon-crawl:fighter");
    }

    #[tokio::test]
    async fn spawn_limit_is_enforced() {
        let config = SpawnConfig {
            max_spawns_per_parent: 2,
            ..SpawnConfig::default()
        };
        let (manager, _) = manager_with(config).await;
        let parent = SessionId::new();

        assert!(manager.spawn_sub_agent(request(parent, "fighter")).await.is_ok());
        assert!(manager.spawn_sub_agent(request(parent, "wizard")).await.is_ok());

        let err = manager
            .spawn_sub_agent(request(parent, "fighter"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoomError::SpawnLimitReached { max: 2, .. }));
        assert_eq!(manager.count_by_parent(parent).await, 2);
    }

    #[tokio::test]
    async fn depth_cap_limits_spawn_chains() {
        let config = SpawnConfig {
            max_depth: 2,
            ..SpawnConfig::default()
        };
        let (manager, _) = manager_with(config).await;

        let root = SessionId::new();
        let child = manager.spawn_sub_agent(request(root, "fighter")).await.unwrap();
        let grandchild = manager
            .spawn_sub_agent(request(child.session_id, "wizard"))
            .await
            .unwrap();

        let err = manager
            .spawn_sub_agent(request(grandchild.session_id, "fighter"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoomError::SpawnLimitReached { .. }));
    }

    #[tokio::test]
    async fn unknown_agent_fails_spawn() {
        let (manager, _) = manager_with(SpawnConfig::default()).await;
        let err = manager
            .spawn_sub_agent(request(SessionId::new(), "necromancer"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoomError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn auto_subscribe_and_cleanup_release_subscriptions() {
        let (manager, store) = manager_with(SpawnConfig::default()).await;
        let parent = SessionId::new();
        let mut req = request(parent, "fighter");
        req.auto_subscribe = vec!["party-chat".into(), "alerts".into()];
        req.initial_message = Some("move out".into());

        let resp = manager.spawn_sub_agent(req).await.unwrap();
        assert_eq!(resp.subscribed_topics, vec!["party-chat", "alerts"]);

        let context = manager.get(resp.session_id).await.unwrap();
        assert_eq!(context.metadata.get("initial_message").unwrap(), "move out");
        assert_eq!(context.subscriptions.len(), 2);
        assert!(!context.cancel.is_cancelled());

        manager.cleanup(resp.session_id, "test").await;
        assert!(manager.get(resp.session_id).await.is_none());
        assert!(context.cancel.is_cancelled());
        assert!(store.load_session(resp.session_id).await.unwrap().is_none());

        // Idempotent.
        manager.cleanup(resp.session_id, "test again").await;
    }

    #[tokio::test]
    async fn cleanup_by_parent_cascades() {
        let (manager, _) = manager_with(SpawnConfig::default()).await;
        let parent = SessionId::new();
        let other_parent = SessionId::new();

        manager.spawn_sub_agent(request(parent, "fighter")).await.unwrap();
        manager.spawn_sub_agent(request(parent, "wizard")).await.unwrap();
        manager
            .spawn_sub_agent(request(other_parent, "fighter"))
            .await
            .unwrap();

        manager.cleanup_by_parent(parent).await;
        assert_eq!(manager.count_by_parent(parent).await, 0);
        assert_eq!(manager.count_by_parent(other_parent).await, 1);

        manager.shutdown().await;
        assert_eq!(manager.live_count().await, 0);
    }

    #[tokio::test]
    async fn cleanup_cascades_through_grandchildren() {
        let (manager, store) = manager_with(SpawnConfig::default()).await;
        let root = SessionId::new();

        let child = manager.spawn_sub_agent(request(root, "fighter")).await.unwrap();
        let grandchild = manager
            .spawn_sub_agent(request(child.session_id, "wizard"))
            .await
            .unwrap();
        assert_eq!(manager.live_count().await, 2);

        manager.cleanup_by_parent(root).await;
        assert_eq!(manager.live_count().await, 0);
        assert!(store.load_session(child.session_id).await.unwrap().is_none());
        assert!(store
            .load_session(grandchild.session_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn idle_sessions_expire_via_monitor() {
        let config = SpawnConfig {
            monitor_interval: Duration::from_millis(20),
            idle_timeout: Duration::from_millis(50),
            ..SpawnConfig::default()
        };
        let (manager, _) = manager_with(config).await;
        let parent = SessionId::new();

        let resp = manager.spawn_sub_agent(request(parent, "fighter")).await.unwrap();
        assert_eq!(manager.count_by_parent(parent).await, 1);

        // Monitor notices the idle session and cleans it up.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(manager.count_by_parent(parent).await, 0);
        assert!(manager.get(resp.session_id).await.is_none());
    }
}
