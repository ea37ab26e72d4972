// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Message Fabric Domain Model
//!
//! Three communication modes share one bus: directed messages (per-session
//! FIFO queues), topic publish/subscribe (per-subscription buffers with
//! optional filters), and auto-injection (pending deliveries drained into an
//! agent's conversation as system-prefixed turns right before inference).
//!
//! Delivery is in-process at-most-once: a message is lost if the process
//! crashes between enqueue and consumption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a topic subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a message is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// Directed to one agent's private queue (at-most-once in-process).
    Direct(String),
    /// Fanned out to all current subscribers of a topic.
    Topic(String),
}

/// A message in flight on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub from_agent: String,
    pub recipient: Recipient,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn direct(from: impl Into<String>, to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from_agent: from.into(),
            recipient: Recipient::Direct(to.into()),
            body: body.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn topic(from: impl Into<String>, topic: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from_agent: from.into(),
            recipient: Recipient::Topic(topic.into()),
            body: body.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Predicate applied to a message body before topic delivery.
pub type MessageFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Snapshot view of a live subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub agent_id: String,
    pub topic: String,
    pub capacity: usize,
}

/// Which delivery mode produced an injected turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionSource {
    Direct,
    Topic(String),
}

/// A pending delivery drained into an agent's conversation context.
///
/// Ordering within a single drain is direct-before-topic, timestamp
/// ascending within each class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectedMessage {
    pub source: InjectionSource,
    pub from_agent: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl InjectedMessage {
    /// Render as a system-prefixed conversation turn.
    pub fn as_system_turn(&self) -> String {
        match &self.source {
            InjectionSource::Direct => {
                format!("[message from {}] {}", self.from_agent, self.body)
            }
            InjectionSource::Topic(topic) => {
                format!("[topic {} from {}] {}", topic, self.from_agent, self.body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_and_topic_constructors() {
        let d = Message::direct("a", "b", "hi");
        assert_eq!(d.recipient, Recipient::Direct("b".into()));

        let t = Message::topic("a", "party-chat", "hi all");
        assert_eq!(t.recipient, Recipient::Topic("party-chat".into()));
    }

    #[test]
    fn system_turn_rendering() {
        let injected = InjectedMessage {
            source: InjectionSource::Direct,
            from_agent: "scout".into(),
            body: "enemy ahead".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(injected.as_system_turn(), "[message from scout] enemy ahead");

        let topical = InjectedMessage {
            source: InjectionSource::Topic("party-chat".into()),
            from_agent: "scout".into(),
            body: "enemy ahead".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(
            topical.as_system_turn(),
            "[topic party-chat from scout] enemy ahead"
        );
    }
}
