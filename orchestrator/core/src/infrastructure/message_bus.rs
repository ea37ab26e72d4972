// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Message Bus
//!
//! Tri-modal communication fabric shared by every hosted agent:
//!
//! 1. **Direct queues**: each bound session owns a bounded FIFO; senders
//!    observe `QueueFull` when the recipient falls behind.
//! 2. **Subscriptions**: per-subscription buffers fed by topic fanout; a
//!    full buffer drops the message and bumps the subscription's drop
//!    counter while the publish call still succeeds.
//! 3. **Auto-injection**: `drain` empties pending deliveries into an
//!    agent's conversation as system-prefixed turns, direct-before-topic,
//!    timestamp ascending within each class.
//!
//! Delivery is in-process at-most-once. All state lives behind a single
//! RwLock; snapshot reads copy out, and no callback ever runs under the
//! lock.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::error::{LoomError, LoomResult};
use crate::domain::events::OrchestrationEvent;
use crate::domain::message::{
    InjectedMessage, InjectionSource, Message, MessageFilter, Recipient, Subscription,
    SubscriptionId,
};
use crate::domain::session::SessionId;
use crate::infrastructure::event_bus::EventBus;

/// Default capacity for direct queues and subscription buffers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Result of a topic publish: how the fanout went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReceipt {
    pub delivered: usize,
    pub dropped: usize,
}

struct SessionBinding {
    session_id: SessionId,
    queue: VecDeque<Message>,
    capacity: usize,
}

struct SubscriptionEntry {
    snapshot: Subscription,
    filter: Option<MessageFilter>,
    buffer: VecDeque<Message>,
    dropped: u64,
}

#[derive(Default)]
struct BusState {
    /// agent_id -> live session binding with its direct queue
    sessions: HashMap<String, SessionBinding>,
    subscriptions: HashMap<SubscriptionId, SubscriptionEntry>,
    /// topic -> subscription ids in subscribe order (deterministic fanout)
    topics: HashMap<String, Vec<SubscriptionId>>,
}

/// In-memory message bus.
pub struct MessageBus {
    state: RwLock<BusState>,
    events: EventBus,
}

impl MessageBus {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: RwLock::new(BusState::default()),
            events,
        }
    }

    // ========================================================================
    // Direct queues
    // ========================================================================

    /// Bind an agent's live session, creating its direct queue.
    ///
    /// Rebinding replaces the previous queue (pending messages are dropped
    /// with the old session).
    pub async fn bind_session(&self, agent_id: &str, session_id: SessionId, capacity: usize) {
        let mut state = self.state.write().await;
        state.sessions.insert(
            agent_id.to_string(),
            SessionBinding {
                session_id,
                queue: VecDeque::new(),
                capacity: capacity.max(1),
            },
        );
        debug!(agent_id, %session_id, "bound session queue");
    }

    /// Remove an agent's queue. Idempotent.
    pub async fn unbind_session(&self, agent_id: &str) {
        let mut state = self.state.write().await;
        if state.sessions.remove(agent_id).is_some() {
            debug!(agent_id, "unbound session queue");
        }
    }

    /// Session currently bound for an agent, if any.
    pub async fn session_for(&self, agent_id: &str) -> Option<SessionId> {
        let state = self.state.read().await;
        state.sessions.get(agent_id).map(|b| b.session_id)
    }

    /// Enqueue a directed message on the recipient's queue.
    pub async fn send_message(
        &self,
        from_agent: &str,
        to_agent: &str,
        body: impl Into<String>,
    ) -> LoomResult<()> {
        let mut state = self.state.write().await;
        let binding = state
            .sessions
            .get_mut(to_agent)
            .ok_or_else(|| LoomError::RecipientNotFound(to_agent.to_string()))?;

        if binding.queue.len() >= binding.capacity {
            return Err(LoomError::QueueFull {
                recipient: to_agent.to_string(),
                capacity: binding.capacity,
            });
        }

        binding
            .queue
            .push_back(Message::direct(from_agent, to_agent, body));
        debug!(from_agent, to_agent, "enqueued direct message");
        Ok(())
    }

    /// Number of pending direct messages for an agent.
    pub async fn pending_direct(&self, agent_id: &str) -> usize {
        let state = self.state.read().await;
        state
            .sessions
            .get(agent_id)
            .map(|b| b.queue.len())
            .unwrap_or(0)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribe an agent to a topic with an optional body filter.
    pub async fn subscribe(
        &self,
        agent_id: &str,
        topic: &str,
        filter: Option<MessageFilter>,
        capacity: usize,
    ) -> Subscription {
        let snapshot = Subscription {
            id: SubscriptionId::new(),
            agent_id: agent_id.to_string(),
            topic: topic.to_string(),
            capacity: capacity.max(1),
        };

        let mut state = self.state.write().await;
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(snapshot.id);
        state.subscriptions.insert(
            snapshot.id,
            SubscriptionEntry {
                snapshot: snapshot.clone(),
                filter,
                buffer: VecDeque::new(),
                dropped: 0,
            },
        );
        debug!(agent_id, topic, subscription_id = %snapshot.id, "subscribed");
        snapshot
    }

    /// Remove a subscription. Idempotent: unknown ids are a no-op.
    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.subscriptions.remove(&subscription_id) {
            if let Some(ids) = state.topics.get_mut(&entry.snapshot.topic) {
                ids.retain(|id| *id != subscription_id);
                if ids.is_empty() {
                    state.topics.remove(&entry.snapshot.topic);
                }
            }
            debug!(subscription_id = %subscription_id, "unsubscribed");
        }
    }

    /// Snapshot of an agent's current subscriptions.
    pub async fn subscriptions_by_agent(&self, agent_id: &str) -> Vec<Subscription> {
        let state = self.state.read().await;
        state
            .subscriptions
            .values()
            .filter(|e| e.snapshot.agent_id == agent_id)
            .map(|e| e.snapshot.clone())
            .collect()
    }

    /// Messages dropped so far for a subscription (0 for unknown ids).
    pub async fn dropped_for_subscription(&self, subscription_id: SubscriptionId) -> u64 {
        let state = self.state.read().await;
        state
            .subscriptions
            .get(&subscription_id)
            .map(|e| e.dropped)
            .unwrap_or(0)
    }

    /// Fan a message out to every current subscriber whose filter matches.
    ///
    /// Non-blocking: a full subscription buffer drops the message and bumps
    /// the drop counter; the publisher's call still succeeds. Zero
    /// subscribers is not an error.
    pub async fn publish(
        &self,
        from_agent: &str,
        topic: &str,
        body: impl Into<String>,
    ) -> PublishReceipt {
        let body = body.into();
        let mut receipt = PublishReceipt::default();
        let mut drop_events = Vec::new();

        {
            let mut state = self.state.write().await;
            let sub_ids = state.topics.get(topic).cloned().unwrap_or_default();
            for sub_id in sub_ids {
                let Some(entry) = state.subscriptions.get_mut(&sub_id) else {
                    continue;
                };
                if let Some(filter) = &entry.filter {
                    if !filter(&body) {
                        continue;
                    }
                }
                if entry.buffer.len() >= entry.snapshot.capacity {
                    entry.dropped += 1;
                    receipt.dropped += 1;
                    drop_events.push((sub_id, entry.snapshot.agent_id.clone()));
                    continue;
                }
                entry
                    .buffer
                    .push_back(Message::topic(from_agent, topic, body.clone()));
                receipt.delivered += 1;
            }
        }

        for (sub_id, agent_id) in drop_events {
            warn!(
                topic,
                subscription_id = %sub_id,
                agent_id,
                "subscription buffer full, message dropped"
            );
            self.events.publish(OrchestrationEvent::MessageDropped {
                subscription_id: sub_id,
                topic: topic.to_string(),
                at: Utc::now(),
            });
        }

        self.events.publish(OrchestrationEvent::MessagePublished {
            topic: topic.to_string(),
            from_agent: from_agent.to_string(),
            delivered: receipt.delivered,
            dropped: receipt.dropped,
            at: Utc::now(),
        });

        receipt
    }

    // ========================================================================
    // Auto-injection
    // ========================================================================

    /// Drain pending deliveries for an agent into injectable turns.
    ///
    /// Ordering: all direct messages (timestamp ascending), then all topic
    /// deliveries (timestamp ascending).
    pub async fn drain(&self, agent_id: &str) -> Vec<InjectedMessage> {
        let mut state = self.state.write().await;

        let mut direct: Vec<InjectedMessage> = state
            .sessions
            .get_mut(agent_id)
            .map(|binding| binding.queue.drain(..).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .map(|m| InjectedMessage {
                source: InjectionSource::Direct,
                from_agent: m.from_agent,
                body: m.body,
                timestamp: m.timestamp,
            })
            .collect();
        direct.sort_by_key(|m| m.timestamp);

        let mut topical: Vec<InjectedMessage> = Vec::new();
        for entry in state
            .subscriptions
            .values_mut()
            .filter(|e| e.snapshot.agent_id == agent_id)
        {
            for m in entry.buffer.drain(..) {
                let topic = match m.recipient {
                    Recipient::Topic(ref t) => t.clone(),
                    // Direct messages never land in subscription buffers
                    Recipient::Direct(_) => continue,
                };
                topical.push(InjectedMessage {
                    source: InjectionSource::Topic(topic),
                    from_agent: m.from_agent,
                    body: m.body,
                    timestamp: m.timestamp,
                });
            }
        }
        topical.sort_by_key(|m| m.timestamp);

        direct.extend(topical);
        direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn bus() -> MessageBus {
        MessageBus::new(EventBus::with_default_capacity())
    }

    #[tokio::test]
    async fn send_requires_live_session() {
        let bus = bus();
        let err = bus.send_message("a", "ghost", "hello").await.unwrap_err();
        assert!(matches!(err, LoomError::RecipientNotFound(_)));
    }

    #[tokio::test]
    async fn direct_queue_preserves_fifo_and_bounds() {
        let bus = bus();
        bus.bind_session("b", SessionId::new(), 2).await;

        bus.send_message("a", "b", "first").await.unwrap();
        bus.send_message("a", "b", "second").await.unwrap();
        let err = bus.send_message("a", "b", "third").await.unwrap_err();
        assert!(matches!(err, LoomError::QueueFull { capacity: 2, .. }));
        assert!(err.is_retryable());

        let drained = bus.drain("b").await;
        let bodies: Vec<&str> = drained.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert_eq!(bus.pending_direct("b").await, 0);
    }

    #[tokio::test]
    async fn publish_fans_out_to_matching_subscribers() {
        let bus = bus();
        let s1 = bus.subscribe("x", "t", None, 10).await;
        let filter: MessageFilter = Arc::new(|body: &str| body.contains("match"));
        let _s2 = bus.subscribe("y", "t", Some(filter), 10).await;

        let receipt = bus.publish("pub", "t", "no hit").await;
        assert_eq!(receipt.delivered, 1);

        let receipt = bus.publish("pub", "t", "a match here").await;
        assert_eq!(receipt.delivered, 2);

        assert_eq!(bus.drain("x").await.len(), 2);
        assert_eq!(bus.drain("y").await.len(), 1);
        assert_eq!(bus.dropped_for_subscription(s1.id).await, 0);
    }

    #[tokio::test]
    async fn full_buffer_drops_without_failing_publisher() {
        let bus = bus();
        let s1 = bus.subscribe("s1", "t", None, 1).await;
        let s2 = bus.subscribe("s2", "t", None, 1).await;

        // Fill s2's buffer only.
        bus.publish("pub", "t", "warmup").await;
        bus.drain("s1").await;

        let receipt = bus.publish("pub", "t", "payload").await;
        assert_eq!(receipt.delivered, 1); // s1 receives
        assert_eq!(receipt.dropped, 1); // s2 overflows

        assert_eq!(bus.dropped_for_subscription(s1.id).await, 0);
        assert_eq!(bus.dropped_for_subscription(s2.id).await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_restores_baseline() {
        let bus = bus();
        let sub = bus.subscribe("a", "t", None, 5).await;
        assert_eq!(bus.subscriptions_by_agent("a").await.len(), 1);

        bus.unsubscribe(sub.id).await;
        bus.unsubscribe(sub.id).await; // no-op
        assert!(bus.subscriptions_by_agent("a").await.is_empty());

        // No deliveries after unsubscribe returned.
        let receipt = bus.publish("pub", "t", "late").await;
        assert_eq!(receipt.delivered, 0);

        // Re-subscribing restores baseline behavior.
        let sub2 = bus.subscribe("a", "t", None, 5).await;
        assert_ne!(sub.id, sub2.id);
        let receipt = bus.publish("pub", "t", "fresh").await;
        assert_eq!(receipt.delivered, 1);
    }

    #[tokio::test]
    async fn drain_orders_direct_before_topic() {
        let bus = bus();
        bus.bind_session("agent", SessionId::new(), 10).await;
        bus.subscribe("agent", "t", None, 10).await;

        // Interleave: topic first in wall-clock order, direct still wins.
        bus.publish("peer", "t", "topic-1").await;
        bus.send_message("peer", "agent", "direct-1").await.unwrap();
        bus.publish("peer", "t", "topic-2").await;
        bus.send_message("peer", "agent", "direct-2").await.unwrap();

        let drained = bus.drain("agent").await;
        let bodies: Vec<&str> = drained.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["direct-1", "direct-2", "topic-1", "topic-2"]);

        assert!(drained[0].as_system_turn().starts_with("[message from peer]"));
        assert!(drained[2].as_system_turn().starts_with("[topic t from peer]"));
    }

    #[tokio::test]
    async fn publish_to_topic_without_subscribers_succeeds() {
        let bus = bus();
        let receipt = bus.publish("pub", "empty-topic", "anyone?").await;
        assert_eq!(receipt, PublishReceipt::default());
    }
}
