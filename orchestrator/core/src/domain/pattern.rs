// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern Domain Model
//!
//! A pattern (workflow) is a named composition of agents with a declared
//! coordination topology. The spec is a tagged union over pattern kinds,
//! discriminated by the `type` field in workflow YAML; field names here are
//! the wire format and must not drift.
//!
//! # Invariants
//!
//! 1. Specs are immutable once validated
//! 2. `validate()` is called before any executor sees a spec
//! 3. Conditional specs declare exactly one classifier and at least one branch

use serde::{Deserialize, Serialize};

use crate::domain::error::{LoomError, LoomResult};

// ============================================================================
// Pattern Spec (tagged union over pattern kinds)
// ============================================================================

/// Workflow pattern specification.
///
/// The serde tag `type` is the on-disk discriminator
/// (`pipeline | fork_join | parallel | debate | conditional | swarm`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternSpec {
    Pipeline(PipelineSpec),
    ForkJoin(ForkJoinSpec),
    Parallel(ForkJoinSpec),
    Debate(DebateSpec),
    Conditional(ConditionalSpec),
    Swarm(SwarmSpec),
}

impl PatternSpec {
    /// The `type` tag this spec serializes under.
    pub fn pattern_type(&self) -> &'static str {
        match self {
            PatternSpec::Pipeline(_) => "pipeline",
            PatternSpec::ForkJoin(_) => "fork_join",
            PatternSpec::Parallel(_) => "parallel",
            PatternSpec::Debate(_) => "debate",
            PatternSpec::Conditional(_) => "conditional",
            PatternSpec::Swarm(_) => "swarm",
        }
    }

    /// Validate required fields and structural invariants.
    pub fn validate(&self) -> LoomResult<()> {
        match self {
            PatternSpec::Pipeline(spec) => spec.validate(),
            PatternSpec::ForkJoin(spec) | PatternSpec::Parallel(spec) => spec.validate(),
            PatternSpec::Debate(spec) => spec.validate(),
            PatternSpec::Conditional(spec) => spec.validate(),
            PatternSpec::Swarm(spec) => spec.validate(),
        }
    }
}

/// The set of recognized `type` tags, for unknown-pattern detection at parse.
pub const KNOWN_PATTERN_TYPES: &[&str] = &[
    "pipeline",
    "fork_join",
    "parallel",
    "debate",
    "conditional",
    "swarm",
];

// ============================================================================
// Agent declarations shared across pattern kinds
// ============================================================================

/// Role an agent plays inside a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Debater,
    Moderator,
    Classifier,
    Branch,
    Voter,
    Judge,
}

/// Agent declaration inside a pattern spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AgentRole>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            role: None,
            system_prompt: None,
            prompt_template: None,
        }
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Display name (falls back to the agent id).
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Sequential stages; each stage feeds the next through `{{previous}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Input for the first stage (falls back to the run input when empty)
    #[serde(default)]
    pub initial_prompt: String,

    pub stages: Vec<PipelineStage>,

    /// Carry the full conversation forward instead of only rendered prompts
    #[serde(default)]
    pub pass_full_history: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub agent_id: String,

    /// Handlebars template; `{{previous}}` binds to the prior stage output
    pub prompt_template: String,

    /// Feed this stage's error forward instead of failing the pipeline
    #[serde(default)]
    pub continue_on_error: bool,
}

impl PipelineSpec {
    pub fn validate(&self) -> LoomResult<()> {
        if self.stages.is_empty() {
            return Err(LoomError::InvalidSpec(
                "pipeline requires at least one stage".into(),
            ));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.agent_id.is_empty() {
                return Err(LoomError::InvalidSpec(format!(
                    "pipeline stage {} is missing agent_id",
                    i
                )));
            }
            if i > 0 && stage.prompt_template.is_empty() {
                return Err(LoomError::InvalidSpec(format!(
                    "pipeline stage {} requires a prompt_template",
                    i
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Fork-Join / Parallel
// ============================================================================

/// How branch outputs are combined after a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Join outputs with a section header per agent, in spec order
    #[default]
    Concatenate,
    /// Treat outputs as ballots and tally a majority
    Vote,
    /// Defer to the caller: outputs serialized as JSON
    Custom,
}

/// Concurrent branches, one per agent, merged on completion.
///
/// Branches independently acquire the LLM gate; when branches exceed the
/// gate capacity the surplus are observably blocked waiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkJoinSpec {
    /// Shared prompt when agents carry no per-agent template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentSpec>,

    /// Shorthand: branch per registry id, all sharing `prompt`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_ids: Vec<String>,

    #[serde(default)]
    pub merge_strategy: MergeStrategy,

    /// Deadline for the join; unfinished branches are canceled, finished
    /// ones are merged. Absent means no deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl ForkJoinSpec {
    pub fn validate(&self) -> LoomResult<()> {
        if self.agents.is_empty() && self.agent_ids.is_empty() {
            return Err(LoomError::InvalidSpec(
                "fork_join requires agents or agent_ids".into(),
            ));
        }
        if self.agents.is_empty() && self.prompt.is_none() {
            return Err(LoomError::InvalidSpec(
                "fork_join with agent_ids requires a shared prompt".into(),
            ));
        }
        for agent in &self.agents {
            if agent.id.is_empty() {
                return Err(LoomError::InvalidSpec(
                    "fork_join agent is missing id".into(),
                ));
            }
            if agent.prompt_template.is_none() && self.prompt.is_none() {
                return Err(LoomError::InvalidSpec(format!(
                    "fork_join agent '{}' has no prompt_template and no shared prompt",
                    agent.id
                )));
            }
        }
        Ok(())
    }

    /// Branch declarations in spec order, expanding `agent_ids` shorthand.
    pub fn branches(&self) -> Vec<AgentSpec> {
        if !self.agents.is_empty() {
            self.agents.clone()
        } else {
            self.agent_ids.iter().map(AgentSpec::new).collect()
        }
    }
}

// ============================================================================
// Debate
// ============================================================================

/// When the moderator speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModeratorCadence {
    /// Moderator turn at the end of every round
    EveryRound,
    /// Moderator turn only after the final round
    #[default]
    FinalOnly,
}

/// Round-based debate among debaters, optionally moderated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSpec {
    pub rounds: u32,

    pub agents: Vec<AgentSpec>,

    #[serde(default)]
    pub moderator_cadence: ModeratorCadence,
}

impl DebateSpec {
    pub fn validate(&self) -> LoomResult<()> {
        if self.rounds < 1 {
            return Err(LoomError::InvalidSpec("debate requires rounds >= 1".into()));
        }
        if self.debaters().is_empty() {
            return Err(LoomError::InvalidSpec(
                "debate requires at least one agent with role 'debater'".into(),
            ));
        }
        let moderators = self
            .agents
            .iter()
            .filter(|a| a.role == Some(AgentRole::Moderator))
            .count();
        if moderators > 1 {
            return Err(LoomError::InvalidSpec(
                "debate allows at most one moderator".into(),
            ));
        }
        Ok(())
    }

    /// Debaters in spec order (agents without an explicit role debate).
    pub fn debaters(&self) -> Vec<&AgentSpec> {
        self.agents
            .iter()
            .filter(|a| matches!(a.role, None | Some(AgentRole::Debater)))
            .collect()
    }

    pub fn moderator(&self) -> Option<&AgentSpec> {
        self.agents
            .iter()
            .find(|a| a.role == Some(AgentRole::Moderator))
    }
}

// ============================================================================
// Conditional
// ============================================================================

/// Classifier agent routes the input to exactly one branch agent.
///
/// Branch keys are branch agent names; a branch named `default` catches
/// undeclared keys. Specs without branch agents are rejected outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalSpec {
    pub agents: Vec<AgentSpec>,
}

impl ConditionalSpec {
    pub fn validate(&self) -> LoomResult<()> {
        let classifiers = self
            .agents
            .iter()
            .filter(|a| a.role == Some(AgentRole::Classifier))
            .count();
        if classifiers != 1 {
            return Err(LoomError::InvalidSpec(format!(
                "conditional requires exactly one classifier, found {}",
                classifiers
            )));
        }
        if self.branches().is_empty() {
            return Err(LoomError::InvalidSpec(
                "conditional requires at least one agent with role 'branch'".into(),
            ));
        }
        Ok(())
    }

    pub fn classifier(&self) -> Option<&AgentSpec> {
        self.agents
            .iter()
            .find(|a| a.role == Some(AgentRole::Classifier))
    }

    pub fn branches(&self) -> Vec<&AgentSpec> {
        self.agents
            .iter()
            .filter(|a| a.role == Some(AgentRole::Branch))
            .collect()
    }
}

// ============================================================================
// Swarm
// ============================================================================

/// Consensus strategy for tallying qualifying ballots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStrategy {
    /// Strict plurality of qualifying votes
    Majority,
    /// At least two thirds of qualifying votes agree
    Supermajority,
    /// All qualifying votes agree
    Unanimous,
}

/// Parallel voters, tallied by strategy, with an optional judge tie-breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmSpec {
    pub strategy: SwarmStrategy,

    /// Votes below this confidence do not qualify for the tally
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Judge sees every ballot; when false, only the final tallies
    #[serde(default = "default_share_votes")]
    pub share_votes: bool,

    pub agents: Vec<AgentSpec>,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_share_votes() -> bool {
    true
}

impl SwarmSpec {
    pub fn validate(&self) -> LoomResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(LoomError::InvalidSpec(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.voters().is_empty() {
            return Err(LoomError::InvalidSpec(
                "swarm requires at least one voter".into(),
            ));
        }
        let judges = self
            .agents
            .iter()
            .filter(|a| a.role == Some(AgentRole::Judge))
            .count();
        if judges > 1 {
            return Err(LoomError::InvalidSpec(
                "swarm allows at most one judge".into(),
            ));
        }
        Ok(())
    }

    /// Voters in spec order (agents without an explicit role vote).
    pub fn voters(&self) -> Vec<&AgentSpec> {
        self.agents
            .iter()
            .filter(|a| matches!(a.role, None | Some(AgentRole::Voter)))
            .collect()
    }

    pub fn judge(&self) -> Option<&AgentSpec> {
        self.agents
            .iter()
            .find(|a| a.role == Some(AgentRole::Judge))
    }
}

// ============================================================================
// Pattern library views (recommender side)
// ============================================================================

/// A reusable pattern template on disk: summary metadata plus the spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTemplate {
    pub name: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub use_cases: Vec<String>,

    pub spec: PatternSpec,
}

impl PatternTemplate {
    pub fn summary(&self) -> PatternSummary {
        PatternSummary {
            name: self.name.clone(),
            title: self.title.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            use_cases: self.use_cases.clone(),
        }
    }
}

/// Recommender view of a pattern template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub name: String,
    pub title: String,
    pub category: String,
    pub description: String,
    pub use_cases: Vec<String>,
}

/// Pattern ranked by keyword score, within [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPattern {
    pub name: String,
    pub score: f64,
}

/// Coarse intent of a user query, used to gate LLM re-ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Analysis,
    Generation,
    Deliberation,
    Classification,
    Consensus,
    Coordination,
    Unknown,
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntentCategory::Analysis => "analysis",
            IntentCategory::Generation => "generation",
            IntentCategory::Deliberation => "deliberation",
            IntentCategory::Classification => "classification",
            IntentCategory::Consensus => "consensus",
            IntentCategory::Coordination => "coordination",
            IntentCategory::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_spec() -> PatternSpec {
        PatternSpec::Pipeline(PipelineSpec {
            initial_prompt: "x".into(),
            stages: vec![
                PipelineStage {
                    agent_id: "a".into(),
                    prompt_template: String::new(),
                    continue_on_error: false,
                },
                PipelineStage {
                    agent_id: "b".into(),
                    prompt_template: "got:{{previous}}".into(),
                    continue_on_error: false,
                },
            ],
            pass_full_history: false,
        })
    }

    #[test]
    fn pattern_type_tags() {
        assert_eq!(pipeline_spec().pattern_type(), "pipeline");
    }

    #[test]
    fn pipeline_requires_stages() {
        let spec = PipelineSpec {
            initial_prompt: "x".into(),
            stages: vec![],
            pass_full_history: false,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn fork_join_requires_agents_or_ids() {
        let spec = ForkJoinSpec {
            prompt: Some("p".into()),
            agents: vec![],
            agent_ids: vec![],
            merge_strategy: MergeStrategy::Concatenate,
            timeout_seconds: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn fork_join_agent_ids_shorthand_expands_in_order() {
        let spec = ForkJoinSpec {
            prompt: Some("p".into()),
            agents: vec![],
            agent_ids: vec!["a".into(), "b".into(), "c".into()],
            merge_strategy: MergeStrategy::Concatenate,
            timeout_seconds: None,
        };
        let branches = spec.branches();
        let ids: Vec<&str> = branches.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn conditional_rejects_missing_branches() {
        let spec = ConditionalSpec {
            agents: vec![AgentSpec::new("router").with_role(AgentRole::Classifier)],
        };
        assert!(matches!(
            spec.validate(),
            Err(LoomError::InvalidSpec(_))
        ));
    }

    #[test]
    fn conditional_requires_single_classifier() {
        let spec = ConditionalSpec {
            agents: vec![
                AgentSpec::new("r1").with_role(AgentRole::Classifier),
                AgentSpec::new("r2").with_role(AgentRole::Classifier),
                AgentSpec::new("b").with_role(AgentRole::Branch),
            ],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn swarm_threshold_bounds() {
        let spec = SwarmSpec {
            strategy: SwarmStrategy::Majority,
            confidence_threshold: 1.2,
            share_votes: true,
            agents: vec![AgentSpec::new("v1")],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn swarm_voters_exclude_judge() {
        let spec = SwarmSpec {
            strategy: SwarmStrategy::Unanimous,
            confidence_threshold: 0.7,
            share_votes: false,
            agents: vec![
                AgentSpec::new("v1"),
                AgentSpec::new("v2").with_role(AgentRole::Voter),
                AgentSpec::new("arbiter").with_role(AgentRole::Judge),
            ],
        };
        assert_eq!(spec.voters().len(), 2);
        assert_eq!(spec.judge().map(|a| a.id.as_str()), Some("arbiter"));
    }

    #[test]
    fn debate_ordering_follows_spec_order() {
        let spec = DebateSpec {
            rounds: 2,
            agents: vec![
                AgentSpec::new("pro").with_role(AgentRole::Debater),
                AgentSpec::new("con").with_role(AgentRole::Debater),
                AgentSpec::new("mod").with_role(AgentRole::Moderator),
            ],
            moderator_cadence: ModeratorCadence::FinalOnly,
        };
        let debaters: Vec<&str> = spec.debaters().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(debaters, vec!["pro", "con"]);
        assert!(spec.moderator().is_some());
    }
}
