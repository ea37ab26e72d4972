// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent Registry Implementations
//!
//! Two implementations of the injected `AgentRegistry` capability:
//! an in-memory registry (tests, embedding) and a YAML-directory registry
//! reading `<data-dir>/agents/<id>.yaml` files.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::agent::{AgentConfig, AgentRegistry};
use crate::domain::error::{LoomError, LoomResult};
use crate::infrastructure::paths;

/// Registry backed by a HashMap; configs are registered programmatically.
#[derive(Default)]
pub struct InMemoryAgentRegistry {
    configs: RwLock<HashMap<String, AgentConfig>>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, config: AgentConfig) {
        let mut configs = self.configs.write().await;
        configs.insert(config.id.clone(), config);
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn load(&self, agent_id: &str) -> LoomResult<AgentConfig> {
        let configs = self.configs.read().await;
        configs
            .get(agent_id)
            .cloned()
            .ok_or_else(|| LoomError::AgentNotFound(agent_id.to_string()))
    }

    async fn list(&self) -> Vec<String> {
        let configs = self.configs.read().await;
        let mut ids: Vec<String> = configs.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Registry reading agent configs from a directory of YAML files.
pub struct YamlAgentRegistry {
    dir: PathBuf,
}

impl YamlAgentRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Registry rooted at `<LOOM_DATA_DIR>/agents`.
    pub fn from_data_dir() -> Self {
        Self::new(paths::loom_subdir("agents"))
    }
}

#[async_trait]
impl AgentRegistry for YamlAgentRegistry {
    async fn load(&self, agent_id: &str) -> LoomResult<AgentConfig> {
        let path = self.dir.join(format!("{}.yaml", agent_id));
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| LoomError::AgentNotFound(agent_id.to_string()))?;

        let mut config: AgentConfig = serde_yaml::from_str(&content).map_err(|e| {
            LoomError::InvalidSpec(format!("agent config '{}': {}", path.display(), e))
        })?;
        if config.id.is_empty() {
            config.id = agent_id.to_string();
        }
        debug!(agent_id, path = %path.display(), "loaded agent config");
        Ok(config)
    }

    async fn list(&self) -> Vec<String> {
        let mut ids = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        ids.push(stem.to_string());
                    }
                }
            }
        }
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_registry_loads_registered_configs() {
        let registry = InMemoryAgentRegistry::new();
        registry
            .register(AgentConfig::new("fighter").with_system_prompt("You are a fighter."))
            .await;

        let config = registry.load("fighter").await.unwrap();
        assert_eq!(config.id, "fighter");

        let err = registry.load("wizard").await.unwrap_err();
        assert!(matches!(err, LoomError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn yaml_registry_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("analyst.yaml"),
            "id: analyst\nname: SQL Analyst\nsystem_prompt: You analyze SQL.\n",
        )
        .unwrap();

        let registry = YamlAgentRegistry::new(dir.path());
        let config = registry.load("analyst").await.unwrap();
        assert_eq!(config.display_name(), "SQL Analyst");
        assert_eq!(registry.list().await, vec!["analyst".to_string()]);

        assert!(matches!(
            registry.load("missing").await,
            Err(LoomError::AgentNotFound(_))
        ));
    }
}
