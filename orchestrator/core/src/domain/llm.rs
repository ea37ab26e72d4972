// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! LLM Provider Domain Interface (Anti-Corruption Layer)
//!
//! The orchestration core consumes chat as an opaque capability. Provider
//! adapters live in `infrastructure/llm/`; executors, the recommender, and
//! intent classifiers only ever see this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Result of a chat call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Domain interface for LLM providers.
///
/// Cancellation is cooperative: callers race the returned future against
/// their cancellation token, and dropping the future aborts the request.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Run one chat completion over the given conversation.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse, LLMError>;

    /// Check if the provider is healthy and accessible.
    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

/// Errors that can occur during LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl LLMError {
    /// Transient failures worth retrying against the same provider.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LLMError::Network(_) | LLMError::RateLimit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, ChatRole::System);
        assert_eq!(ChatMessage::user("u").role, ChatRole::User);
        assert_eq!(ChatMessage::assistant("a").role, ChatRole::Assistant);
    }

    #[test]
    fn retryable_llm_errors() {
        assert!(LLMError::Network("reset".into()).is_retryable());
        assert!(LLMError::RateLimit.is_retryable());
        assert!(!LLMError::Authentication("bad key".into()).is_retryable());
    }
}
