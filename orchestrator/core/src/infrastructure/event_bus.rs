// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Orchestration Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Enables real-time observation of pattern executions, gate contention,
// message fabric activity, and spawn lifecycle.
//
// In-memory only: events are lost on restart.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::events::OrchestrationEvent;

/// Event bus for publishing and subscribing to orchestration events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<OrchestrationEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Capacity determines how many events can be buffered before dropping
    /// old ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000).
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers.
    ///
    /// Publishing never fails; with no subscribers the event is dropped.
    pub fn publish(&self, event: OrchestrationEvent) {
        let _receiver_count = self.sender.send(event).unwrap_or(0);
    }

    /// Subscribe to all orchestration events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for orchestration events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<OrchestrationEvent>,
}

impl EventReceiver {
    /// Receive the next event (blocks until one is available).
    pub async fn recv(&mut self) -> Result<OrchestrationEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Result<OrchestrationEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Errors that can occur when receiving events.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event bus is closed")]
    Closed,

    #[error("no events available")]
    Empty,

    #[error("receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn publish_subscribe_round_trip() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(OrchestrationEvent::PatternStarted {
            pattern: "pipeline".into(),
            started_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            OrchestrationEvent::PatternStarted { pattern, .. } => {
                assert_eq!(pattern, "pipeline");
            }
            other => panic!("expected PatternStarted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::new(10);
        let mut r1 = bus.subscribe();
        let mut r2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(OrchestrationEvent::GateAcquired {
            branch: 0,
            at: Utc::now(),
        });

        assert!(r1.recv().await.is_ok());
        assert!(r2.recv().await.is_ok());
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(10);
        bus.publish(OrchestrationEvent::GateReleased {
            branch: 1,
            at: Utc::now(),
        });
    }
}
