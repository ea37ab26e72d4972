// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent Domain Model
//!
//! An agent is a configuration (`agent_id`) plus a live session producing and
//! consuming chat turns. Configurations are loaded through the
//! [`AgentRegistry`] trait; the registry itself is an injected collaborator
//! (implementations in `infrastructure/agent_registry`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::LoomResult;

/// Agent configuration loaded from the registry.
///
/// # Invariants
/// - `id` is non-empty and unique within the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Registry identifier (e.g. "analyst", "fighter")
    pub id: String,

    /// Human-readable name; falls back to `id` when absent
    #[serde(default)]
    pub name: Option<String>,

    /// System prompt injected at the start of every conversation
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Optional model alias override
    #[serde(default)]
    pub model: Option<String>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            system_prompt: None,
            description: None,
            model: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Display name (falls back to the registry id).
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Registry of agent configurations (injected collaborator).
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Load an agent configuration by id.
    ///
    /// Fails with `AgentNotFound` when the id is unknown.
    async fn load(&self, agent_id: &str) -> LoomResult<AgentConfig>;

    /// List all known agent ids.
    async fn list(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_id() {
        let config = AgentConfig::new("analyst");
        assert_eq!(config.display_name(), "analyst");

        let named = AgentConfig {
            name: Some("SQL Analyst".into()),
            ..AgentConfig::new("analyst")
        };
        assert_eq!(named.display_name(), "SQL Analyst");
    }
}
