//! Workflow YAML Parser
//!
//! This module parses workflow YAML files into domain objects.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//! - **Anti-Corruption:** Field names in YAML are the compatibility surface
//!
//! # File Format
//!
//! Pattern workflows carry a `spec.type` discriminator:
//!
//! ```yaml
//! spec:
//!   type: pipeline
//!   initial_prompt: "Summarize quarterly results"
//!   stages:
//!     - agent_id: researcher
//!       prompt_template: ""
//!     - agent_id: writer
//!       prompt_template: "Polish this draft: {{previous}}"
//!   pass_full_history: false
//! ```
//!
//! Pub/sub workflows declare an entrypoint and a communication topology:
//!
//! ```yaml
//! spec:
//!   entrypoint: coordinator
//!   agents:
//!     - name: coordinator
//!       agent: coordinator-v1
//!   communication:
//!     pattern: peer-to-peer-pub-sub
//!     topic: party-chat
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::{LoomError, LoomResult};
use crate::domain::pattern::{PatternSpec, KNOWN_PATTERN_TYPES};

// ============================================================================
// Communication workflows (pub/sub topologies)
// ============================================================================

/// Pub/sub workflow: a set of agents wired through one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationSpec {
    /// Name of the agent that receives the initial input
    pub entrypoint: String,

    pub agents: Vec<CommunicationAgent>,

    pub communication: CommunicationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationAgent {
    /// Name within this workflow
    pub name: String,

    /// Registry id of the agent config
    pub agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationConfig {
    pub pattern: CommunicationPattern,
    pub topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunicationPattern {
    #[serde(rename = "peer-to-peer-pub-sub")]
    PeerToPeerPubSub,
    #[serde(rename = "hub-and-spoke")]
    HubAndSpoke,
}

impl CommunicationSpec {
    pub fn validate(&self) -> LoomResult<()> {
        if self.agents.is_empty() {
            return Err(LoomError::InvalidSpec(
                "communication workflow requires at least one agent".into(),
            ));
        }
        if self.communication.topic.is_empty() {
            return Err(LoomError::InvalidSpec(
                "communication workflow requires a topic".into(),
            ));
        }
        if !self.agents.iter().any(|a| a.name == self.entrypoint) {
            return Err(LoomError::InvalidSpec(format!(
                "entrypoint '{}' is not a declared agent",
                self.entrypoint
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Parsed workflow definitions
// ============================================================================

/// A parsed workflow file: either a pattern or a pub/sub topology.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowDefinition {
    Pattern(PatternSpec),
    Communication(CommunicationSpec),
}

impl WorkflowDefinition {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowDefinition::Pattern(spec) => spec.pattern_type(),
            WorkflowDefinition::Communication(_) => "communication",
        }
    }
}

#[derive(Serialize)]
struct ManifestOut<'a> {
    spec: &'a PatternSpec,
}

// ============================================================================
// Parser
// ============================================================================

/// Workflow parser (Infrastructure service).
pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow file from disk.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> LoomResult<WorkflowDefinition> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            LoomError::InvalidSpec(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::parse_yaml(&content)
    }

    /// Parse a workflow from a YAML string.
    ///
    /// An unrecognized `spec.type` tag fails with `UnknownPattern`; a file
    /// with neither `type` nor `entrypoint` fails with `InvalidSpec`.
    pub fn parse_yaml(yaml: &str) -> LoomResult<WorkflowDefinition> {
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| LoomError::InvalidSpec(format!("YAML parse error: {}", e)))?;

        let spec = doc
            .get("spec")
            .ok_or_else(|| LoomError::InvalidSpec("missing top-level 'spec' key".into()))?;

        if let Some(type_tag) = spec.get("type") {
            let tag = type_tag
                .as_str()
                .ok_or_else(|| LoomError::InvalidSpec("'type' must be a string".into()))?;
            if !KNOWN_PATTERN_TYPES.contains(&tag) {
                return Err(LoomError::UnknownPattern(tag.to_string()));
            }

            let pattern: PatternSpec = serde_yaml::from_value(spec.clone())
                .map_err(|e| LoomError::InvalidSpec(format!("invalid {} spec: {}", tag, e)))?;
            pattern.validate()?;
            return Ok(WorkflowDefinition::Pattern(pattern));
        }

        if spec.get("entrypoint").is_some() {
            let comm: CommunicationSpec = serde_yaml::from_value(spec.clone()).map_err(|e| {
                LoomError::InvalidSpec(format!("invalid communication spec: {}", e))
            })?;
            comm.validate()?;
            return Ok(WorkflowDefinition::Communication(comm));
        }

        Err(LoomError::InvalidSpec(
            "spec has neither a 'type' tag nor an 'entrypoint'".into(),
        ))
    }

    /// Serialize a pattern spec back to workflow YAML.
    pub fn to_yaml(spec: &PatternSpec) -> LoomResult<String> {
        serde_yaml::to_string(&ManifestOut { spec })
            .map_err(|e| LoomError::Internal(format!("YAML serialization failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pattern::{MergeStrategy, SwarmStrategy};

    #[test]
    fn parse_pipeline_spec() {
        let yaml = r#"
spec:
  type: pipeline
  initial_prompt: "x"
  stages:
    - agent_id: a
      prompt_template: ""
    - agent_id: b
      prompt_template: "got:{{previous}}"
  pass_full_history: false
"#;
        let parsed = WorkflowParser::parse_yaml(yaml).unwrap();
        match parsed {
            WorkflowDefinition::Pattern(PatternSpec::Pipeline(spec)) => {
                assert_eq!(spec.initial_prompt, "x");
                assert_eq!(spec.stages.len(), 2);
                assert_eq!(spec.stages[1].prompt_template, "got:{{previous}}");
            }
            other => panic!("expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn parse_fork_join_with_agent_ids() {
        let yaml = r#"
spec:
  type: fork_join
  prompt: "Evaluate: {{input}}"
  agent_ids: [alpha, beta, gamma]
  merge_strategy: concatenate
  timeout_seconds: 30
"#;
        let parsed = WorkflowParser::parse_yaml(yaml).unwrap();
        match parsed {
            WorkflowDefinition::Pattern(PatternSpec::ForkJoin(spec)) => {
                assert_eq!(spec.agent_ids.len(), 3);
                assert_eq!(spec.merge_strategy, MergeStrategy::Concatenate);
                assert_eq!(spec.timeout_seconds, Some(30));
            }
            other => panic!("expected fork_join, got {:?}", other),
        }
    }

    #[test]
    fn parse_swarm_spec() {
        let yaml = r#"
spec:
  type: swarm
  strategy: supermajority
  confidence_threshold: 0.6
  share_votes: false
  agents:
    - id: v1
    - id: v2
    - id: arbiter
      role: judge
"#;
        let parsed = WorkflowParser::parse_yaml(yaml).unwrap();
        match parsed {
            WorkflowDefinition::Pattern(PatternSpec::Swarm(spec)) => {
                assert_eq!(spec.strategy, SwarmStrategy::Supermajority);
                assert!(!spec.share_votes);
                assert_eq!(spec.voters().len(), 2);
            }
            other => panic!("expected swarm, got {:?}", other),
        }
    }

    #[test]
    fn unknown_type_tag_is_unknown_pattern() {
        let yaml = "spec:\n  type: quantum_vote\n";
        assert!(matches!(
            WorkflowParser::parse_yaml(yaml),
            Err(LoomError::UnknownPattern(tag)) if tag == "quantum_vote"
        ));
    }

    #[test]
    fn invalid_spec_missing_required_fields() {
        let yaml = "spec:\n  type: debate\n  rounds: 0\n  agents: []\n";
        assert!(matches!(
            WorkflowParser::parse_yaml(yaml),
            Err(LoomError::InvalidSpec(_))
        ));
    }

    #[test]
    fn parse_communication_spec() {
        let yaml = r#"
spec:
  entrypoint: coordinator
  agents:
    - name: coordinator
      agent: coordinator-v1
    - name: scout
      agent: scout-v1
  communication:
    pattern: peer-to-peer-pub-sub
    topic: party-chat
"#;
        let parsed = WorkflowParser::parse_yaml(yaml).unwrap();
        match parsed {
            WorkflowDefinition::Communication(spec) => {
                assert_eq!(spec.entrypoint, "coordinator");
                assert_eq!(
                    spec.communication.pattern,
                    CommunicationPattern::PeerToPeerPubSub
                );
                assert_eq!(spec.communication.topic, "party-chat");
            }
            other => panic!("expected communication, got {:?}", other),
        }
    }

    #[test]
    fn communication_entrypoint_must_be_declared() {
        let yaml = r#"
spec:
  entrypoint: ghost
  agents:
    - name: coordinator
      agent: coordinator-v1
  communication:
    pattern: hub-and-spoke
    topic: hub
"#;
        assert!(matches!(
            WorkflowParser::parse_yaml(yaml),
            Err(LoomError::InvalidSpec(_))
        ));
    }

    #[test]
    fn round_trip_preserves_structure() {
        let yaml = r#"
spec:
  type: swarm
  strategy: majority
  confidence_threshold: 0.7
  share_votes: true
  agents:
    - id: v1
      name: Voter One
    - id: v2
    - id: arbiter
      role: judge
      system_prompt: "Decide ties."
"#;
        let first = WorkflowParser::parse_yaml(yaml).unwrap();
        let WorkflowDefinition::Pattern(spec) = &first else {
            panic!("expected pattern");
        };

        let serialized = WorkflowParser::to_yaml(spec).unwrap();
        let second = WorkflowParser::parse_yaml(&serialized).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip_pipeline() {
        let yaml = r#"
spec:
  type: pipeline
  initial_prompt: "start"
  stages:
    - agent_id: a
      prompt_template: ""
    - agent_id: b
      prompt_template: "refine {{previous}}"
      continue_on_error: true
  pass_full_history: true
"#;
        let first = WorkflowParser::parse_yaml(yaml).unwrap();
        let WorkflowDefinition::Pattern(spec) = &first else {
            panic!("expected pattern");
        };
        let second = WorkflowParser::parse_yaml(&WorkflowParser::to_yaml(spec).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
