// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern Template Library
//!
//! Loads reusable pattern templates from disk (one YAML file per template,
//! under `<LOOM_DATA_DIR>/patterns` by default) and serves summary views to
//! the recommender and full specs to the orchestrator.
//!
//! Template files carry summary metadata plus the executable spec:
//!
//! ```yaml
//! name: design-review-debate
//! title: Design Review Debate
//! category: deliberation
//! description: Two reviewers argue a design; a moderator synthesizes.
//! use_cases:
//!   - design reviews
//!   - tradeoff analysis
//! spec:
//!   type: debate
//!   rounds: 2
//!   agents:
//!     - id: advocate
//!       role: debater
//!     - id: skeptic
//!       role: debater
//!     - id: mod
//!       role: moderator
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::error::{LoomError, LoomResult};
use crate::domain::pattern::{PatternSpec, PatternSummary, PatternTemplate};
use crate::infrastructure::paths;

#[derive(Deserialize)]
struct TemplateFile {
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    use_cases: Vec<String>,
    spec: serde_yaml::Value,
}

/// In-memory library of pattern templates.
pub struct PatternLibrary {
    templates: RwLock<HashMap<String, PatternTemplate>>,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
        }
    }

    /// Library populated from `<LOOM_DATA_DIR>/patterns`.
    ///
    /// A missing directory yields an empty library, not an error.
    pub fn from_data_dir() -> Self {
        let library = Self::new();
        let dir = paths::loom_subdir("patterns");
        if dir.is_dir() {
            if let Err(e) = library.load_dir(&dir) {
                warn!(dir = %dir.display(), error = %e, "failed to load pattern directory");
            }
        }
        library
    }

    /// Load every `*.yaml` template under `dir`. Files that fail to parse
    /// are skipped with a warning. Returns how many templates loaded.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> anyhow::Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if !is_yaml {
                continue;
            }
            match Self::load_file(&path) {
                Ok(template) => {
                    debug!(name = %template.name, path = %path.display(), "loaded pattern template");
                    self.register(template);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping invalid pattern template");
                }
            }
        }
        Ok(loaded)
    }

    fn load_file(path: &PathBuf) -> LoomResult<PatternTemplate> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoomError::InvalidSpec(format!("cannot read {}: {}", path.display(), e)))?;
        let file: TemplateFile = serde_yaml::from_str(&content)
            .map_err(|e| LoomError::InvalidSpec(format!("{}: {}", path.display(), e)))?;

        let spec: PatternSpec = serde_yaml::from_value(file.spec)
            .map_err(|e| LoomError::InvalidSpec(format!("{}: {}", path.display(), e)))?;
        spec.validate()?;

        Ok(PatternTemplate {
            name: file.name,
            title: file.title,
            category: file.category,
            description: file.description,
            use_cases: file.use_cases,
            spec,
        })
    }

    /// Add or replace a template.
    pub fn register(&self, template: PatternTemplate) {
        let mut templates = self.templates.write().expect("pattern library poisoned");
        templates.insert(template.name.clone(), template);
    }

    /// Full template by name.
    pub fn get(&self, name: &str) -> Option<PatternTemplate> {
        let templates = self.templates.read().expect("pattern library poisoned");
        templates.get(name).cloned()
    }

    /// Summaries of every template, sorted by name for determinism.
    pub fn list_summaries(&self) -> Vec<PatternSummary> {
        let templates = self.templates.read().expect("pattern library poisoned");
        let mut summaries: Vec<PatternSummary> =
            templates.values().map(|t| t.summary()).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Summary lookup keyed by template name.
    pub fn summaries_by_name(&self) -> HashMap<String, PatternSummary> {
        let templates = self.templates.read().expect("pattern library poisoned");
        templates
            .iter()
            .map(|(name, t)| (name.clone(), t.summary()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.read().expect("pattern library poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
name: quick-debate
title: Quick Debate
category: deliberation
description: Two debaters and a moderator.
use_cases:
  - tradeoff analysis
spec:
  type: debate
  rounds: 1
  agents:
    - id: pro
      role: debater
    - id: con
      role: debater
    - id: mod
      role: moderator
"#;

    #[test]
    fn loads_templates_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("debate.yaml"), TEMPLATE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a template").unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "name: oops\nspec:\n  type: nope\n")
            .unwrap();

        let library = PatternLibrary::new();
        let loaded = library.load_dir(dir.path()).unwrap();
        assert_eq!(loaded, 1);

        let template = library.get("quick-debate").unwrap();
        assert_eq!(template.category, "deliberation");
        assert_eq!(library.list_summaries().len(), 1);
    }

    #[test]
    fn register_replaces_by_name() {
        let library = PatternLibrary::new();
        let template: PatternTemplate = {
            let file: TemplateFile = serde_yaml::from_str(TEMPLATE).unwrap();
            PatternTemplate {
                name: file.name,
                title: file.title,
                category: file.category,
                description: file.description,
                use_cases: file.use_cases,
                spec: serde_yaml::from_value(file.spec).unwrap(),
            }
        };
        library.register(template.clone());
        library.register(template);
        assert_eq!(library.len(), 1);
    }
}
