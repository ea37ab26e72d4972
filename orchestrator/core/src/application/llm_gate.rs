// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! LLM Concurrency Gate
//!
//! A counting gate of fixed capacity shared by every pattern executor. Each
//! LLM chat invocation originating from a pattern branch must hold a permit
//! for the duration of the call; permits are RAII so every exit path
//! (success, error, cancellation) releases.
//!
//! The gate's capacity is the only throttling mechanism in the runtime;
//! executors never keep independent pools. Capacity is set at startup and
//! immutable thereafter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::domain::events::OrchestrationEvent;
use crate::infrastructure::event_bus::EventBus;

/// Default number of concurrent LLM chat calls.
pub const DEFAULT_LLM_CONCURRENCY: usize = 2;

/// Global bounded-concurrency gate for LLM provider calls.
pub struct LlmGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    events: EventBus,
}

impl LlmGate {
    pub fn new(capacity: usize, events: EventBus) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            events,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a permit for one chat call from the given branch.
    ///
    /// A branch that cannot acquire immediately is observably blocked: it
    /// logs and emits `GateWaiting` before parking. Cancel-safe: dropping
    /// the future before it resolves leaves no permit held.
    pub async fn acquire(&self, branch: usize) -> GatePermit {
        if self.semaphore.available_permits() == 0 {
            debug!(branch, "branch blocked waiting for LLM gate");
            self.events.publish(OrchestrationEvent::GateWaiting {
                branch,
                at: Utc::now(),
            });
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("Invariant: gate semaphore is never closed");

        let acquired_at = Utc::now();
        debug!(branch, "LLM gate acquired");
        self.events.publish(OrchestrationEvent::GateAcquired {
            branch,
            at: acquired_at,
        });

        GatePermit {
            _permit: permit,
            branch,
            acquired_at,
            events: self.events.clone(),
        }
    }
}

/// RAII permit for one gated chat call.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    branch: usize,
    acquired_at: DateTime<Utc>,
    events: EventBus,
}

impl GatePermit {
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        debug!(branch = self.branch, "LLM gate released");
        self.events.publish(OrchestrationEvent::GateReleased {
            branch: self.branch,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn capacity_bounds_concurrent_permits() {
        let gate = Arc::new(LlmGate::new(2, EventBus::with_default_capacity()));
        assert_eq!(gate.capacity(), 2);

        let p1 = gate.acquire(0).await;
        let _p2 = gate.acquire(1).await;
        assert_eq!(gate.available(), 0);

        // Third acquire blocks until a permit is released.
        let gate2 = gate.clone();
        let waiter = tokio::spawn(async move {
            let _p3 = gate2.acquire(2).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(p1);
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter should proceed after release")
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_pending_acquire_holds_nothing() {
        let gate = Arc::new(LlmGate::new(1, EventBus::with_default_capacity()));
        let held = gate.acquire(0).await;

        {
            let pending = gate.acquire(1);
            tokio::pin!(pending);
            let poll = futures::poll!(pending.as_mut());
            assert!(poll.is_pending());
            // pending future dropped here
        }

        drop(held);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn capacity_is_clamped_to_one() {
        let gate = LlmGate::new(0, EventBus::with_default_capacity());
        assert_eq!(gate.capacity(), 1);
    }
}
