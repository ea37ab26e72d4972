// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - Provider Management, Retry and Fallback
//
// Wraps named providers behind a single chat capability with retry,
// exponential backoff, and optional fallback to a secondary provider.
// Only transient errors (network, rate limit) are retried.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::llm::{ChatMessage, ChatResponse, LLMError, LLMProvider};

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    default_provider: String,
    fallback_provider: Option<String>,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl ProviderRegistry {
    pub fn new(default_name: impl Into<String>, default_provider: Arc<dyn LLMProvider>) -> Self {
        let default_name = default_name.into();
        let mut providers = HashMap::new();
        providers.insert(default_name.clone(), default_provider);
        Self {
            providers,
            default_provider: default_name,
            fallback_provider: None,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LLMProvider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback_provider = Some(name.into());
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check health of all registered providers.
    pub async fn health_check_all(&self) -> HashMap<String, Result<(), LLMError>> {
        let mut results = HashMap::new();
        for (name, provider) in &self.providers {
            info!(provider = %name, "health checking provider");
            results.insert(name.clone(), provider.health_check().await);
        }
        results
    }
}

#[async_trait]
impl LLMProvider for ProviderRegistry {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse, LLMError> {
        let provider = self
            .providers
            .get(&self.default_provider)
            .ok_or_else(|| LLMError::Provider(format!(
                "provider '{}' not registered",
                self.default_provider
            )))?;

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match provider.chat(messages).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        error = %e,
                        "chat attempt failed"
                    );
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }

                    // Exponential backoff before the next attempt.
                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(tokio::time::Duration::from_millis(
                            self.retry_delay_ms * 2_u64.pow(attempt),
                        ))
                        .await;
                    }
                }
            }
        }

        if let Some(fallback) = &self.fallback_provider {
            if let Some(fallback_provider) = self.providers.get(fallback) {
                info!(provider = %fallback, "falling back to secondary provider");
                return fallback_provider.chat(messages).await;
            }
        }

        Err(last_error.unwrap_or_else(|| LLMError::Provider("unknown error".into())))
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        match self.providers.get(&self.default_provider) {
            Some(provider) => provider.health_check().await,
            None => Err(LLMError::Provider("no default provider".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        async fn chat(&self, _messages: &[ChatMessage]) -> Result<ChatResponse, LLMError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(LLMError::Network("connection reset".into()))
            } else {
                Ok(ChatResponse {
                    content: "ok".into(),
                    usage: Default::default(),
                })
            }
        }
    }

    struct AlwaysAuthError;

    #[async_trait]
    impl LLMProvider for AlwaysAuthError {
        async fn chat(&self, _messages: &[ChatMessage]) -> Result<ChatResponse, LLMError> {
            Err(LLMError::Authentication("bad key".into()))
        }
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let registry = ProviderRegistry::new(
            "flaky",
            Arc::new(FlakyProvider {
                calls: AtomicU32::new(0),
                fail_first: 2,
            }),
        )
        .with_retries(3, 1);

        let response = registry.chat(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(response.content, "ok");
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let registry =
            ProviderRegistry::new("auth", Arc::new(AlwaysAuthError)).with_retries(3, 1);
        let err = registry.chat(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LLMError::Authentication(_)));
    }

    #[tokio::test]
    async fn falls_back_after_exhausting_retries() {
        let mut registry = ProviderRegistry::new(
            "flaky",
            Arc::new(FlakyProvider {
                calls: AtomicU32::new(0),
                fail_first: 10,
            }),
        )
        .with_retries(2, 1)
        .with_fallback("stable");
        registry.register(
            "stable",
            Arc::new(FlakyProvider {
                calls: AtomicU32::new(0),
                fail_first: 0,
            }),
        );

        let response = registry.chat(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(response.content, "ok");
    }
}
