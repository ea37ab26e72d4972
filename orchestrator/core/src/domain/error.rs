// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Runtime Error Taxonomy
//!
//! Every failure surfaced by the orchestration core is one of these kinds.
//! Recoverable conditions (rerank fallback, single-branch failures,
//! auto-subscribe failures) are handled in place and never reach callers.

use crate::domain::llm::LLMError;

pub type LoomResult<T> = Result<T, LoomError>;

#[derive(Debug, thiserror::Error)]
pub enum LoomError {
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("unknown pattern type '{0}'")]
    UnknownPattern(String),

    #[error("classifier output '{output}' matched no declared branch")]
    ClassificationUnmatched { output: String },

    #[error("spawn limit reached: parent {parent} has {count} spawned agents (max: {max})")]
    SpawnLimitReached {
        parent: String,
        count: usize,
        max: usize,
    },

    #[error("agent '{0}' not found in registry")]
    AgentNotFound(String),

    #[error("no live session for recipient '{0}'")]
    RecipientNotFound(String),

    #[error("direct queue full for '{recipient}' (capacity {capacity}); retry after the recipient drains its queue")]
    QueueFull { recipient: String, capacity: usize },

    #[error("no candidate patterns to rank")]
    NoCandidates,

    #[error("upstream LLM error: {0}")]
    Upstream(#[from] LLMError),

    #[error("deadline exceeded after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("execution canceled by caller")]
    Canceled,

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl LoomError {
    /// Whether the caller can reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoomError::Upstream(e) => e.is_retryable(),
            LoomError::QueueFull { .. } | LoomError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Stable machine-readable code for user-visible failures.
    pub fn code(&self) -> &'static str {
        match self {
            LoomError::InvalidSpec(_) => "INVALID_SPEC",
            LoomError::UnknownPattern(_) => "UNKNOWN_PATTERN",
            LoomError::ClassificationUnmatched { .. } => "CLASSIFICATION_UNMATCHED",
            LoomError::SpawnLimitReached { .. } => "SPAWN_LIMIT_REACHED",
            LoomError::AgentNotFound(_) => "AGENT_NOT_FOUND",
            LoomError::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            LoomError::QueueFull { .. } => "QUEUE_FULL",
            LoomError::NoCandidates => "NO_CANDIDATES",
            LoomError::Upstream(_) => "UPSTREAM",
            LoomError::Timeout { .. } => "TIMEOUT",
            LoomError::Canceled => "CANCELED",
            LoomError::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(LoomError::QueueFull {
            recipient: "a".into(),
            capacity: 4
        }
        .is_retryable());
        assert!(LoomError::Timeout { elapsed_ms: 10 }.is_retryable());
        assert!(!LoomError::InvalidSpec("x".into()).is_retryable());
        assert!(!LoomError::Canceled.is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(LoomError::NoCandidates.code(), "NO_CANDIDATES");
        assert_eq!(
            LoomError::RecipientNotFound("x".into()).code(),
            "RECIPIENT_NOT_FOUND"
        );
    }
}
