// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hybrid Pattern Recommender
//!
//! Selects a workflow pattern template for a user query through a
//! score-plus-rerank pipeline:
//!
//! 1. optional intent classification (pluggable; rule-based or LLM-backed)
//! 2. deterministic keyword scoring over template summaries
//! 3. a gate deciding whether the keyword winner is trustworthy
//! 4. LLM re-ranking of the top candidates when it is not
//!
//! Accuracy over speed: the gate invokes the LLM whenever the intent is
//! unknown, the top score is uncertain (< 0.70), the top two are within
//! 0.20 of each other, or three or more candidates score above 0.60. Any
//! rerank failure falls back to the keyword winner and is never surfaced.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::executors::extract_json;
use crate::domain::error::{LoomError, LoomResult};
use crate::domain::llm::{ChatMessage, LLMProvider};
use crate::domain::pattern::{IntentCategory, PatternSummary, ScoredPattern};
use crate::infrastructure::pattern_library::PatternLibrary;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecommenderConfig {
    /// Rerank when the top keyword score is below this
    pub min_top_score: f64,
    /// Rerank when the top two scores are within this margin
    pub close_race_margin: f64,
    /// A candidate above this score counts as strong
    pub strong_candidate_score: f64,
    /// Rerank when at least this many candidates are strong
    pub strong_candidate_count: usize,
    /// How many candidates the LLM sees
    pub top_k: usize,
    pub enable_cache: bool,
    pub cache_ttl: Duration,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            min_top_score: 0.70,
            close_race_margin: 0.20,
            strong_candidate_score: 0.60,
            strong_candidate_count: 3,
            top_k: 5,
            enable_cache: true,
            cache_ttl: Duration::from_secs(30 * 60),
        }
    }
}

// ============================================================================
// Intent classification
// ============================================================================

/// Maps a query to a coarse intent with a confidence in [0, 1].
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> (IntentCategory, f64);
}

/// Keyword-table classifier; cheap and deterministic.
pub struct RuleBasedIntentClassifier;

const INTENT_KEYWORDS: &[(IntentCategory, &[&str])] = &[
    (
        IntentCategory::Deliberation,
        &["debate", "argue", "discuss", "tradeoff", "counterpoint"],
    ),
    (
        IntentCategory::Consensus,
        &["vote", "consensus", "agree", "poll", "majority"],
    ),
    (
        IntentCategory::Classification,
        &["classify", "categorize", "route", "triage", "label"],
    ),
    (
        IntentCategory::Coordination,
        &["coordinate", "orchestrate", "delegate", "spawn", "team"],
    ),
    (
        IntentCategory::Analysis,
        &["analyze", "investigate", "research", "review", "evaluate", "compare"],
    ),
    (
        IntentCategory::Generation,
        &["write", "generate", "draft", "create", "summarize", "compose"],
    ),
];

#[async_trait]
impl IntentClassifier for RuleBasedIntentClassifier {
    async fn classify(&self, query: &str) -> (IntentCategory, f64) {
        let lowered = query.to_lowercase();
        let mut best = (IntentCategory::Unknown, 0usize);
        for (category, keywords) in INTENT_KEYWORDS {
            let hits = keywords.iter().filter(|k| lowered.contains(**k)).count();
            if hits > best.1 {
                best = (*category, hits);
            }
        }
        if best.1 == 0 {
            return (IntentCategory::Unknown, 0.0);
        }
        let confidence = (0.6 + 0.1 * (best.1 as f64 - 1.0)).min(0.9);
        (best.0, confidence)
    }
}

/// LLM-backed classifier; errors degrade to Unknown rather than propagate.
pub struct LlmIntentClassifier {
    llm: Arc<dyn LLMProvider>,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, query: &str) -> (IntentCategory, f64) {
        let prompt = format!(
            "Classify this request into exactly one category: analysis, generation, \
             deliberation, classification, consensus, coordination.\n\nRequest: {}\n\n\
             Respond with the category name only.",
            query
        );
        let messages = [ChatMessage::user(prompt)];
        match self.llm.chat(&messages).await {
            Ok(response) => {
                let word = response
                    .content
                    .trim()
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .trim_matches(|c: char| !c.is_ascii_alphabetic())
                    .to_lowercase();
                let category = match word.as_str() {
                    "analysis" => IntentCategory::Analysis,
                    "generation" => IntentCategory::Generation,
                    "deliberation" => IntentCategory::Deliberation,
                    "classification" => IntentCategory::Classification,
                    "consensus" => IntentCategory::Consensus,
                    "coordination" => IntentCategory::Coordination,
                    _ => IntentCategory::Unknown,
                };
                let confidence = if category == IntentCategory::Unknown { 0.0 } else { 0.9 };
                (category, confidence)
            }
            Err(e) => {
                warn!(error = %e, "intent classification failed");
                (IntentCategory::Unknown, 0.0)
            }
        }
    }
}

// ============================================================================
// Keyword scoring
// ============================================================================

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "what", "how", "can", "you",
    "our", "are", "has", "have",
];

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn overlap(query_tokens: &HashSet<String>, field: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let field_tokens = tokenize(field);
    let hits = query_tokens.iter().filter(|t| field_tokens.contains(*t)).count();
    hits as f64 / query_tokens.len() as f64
}

/// Deterministic keyword score of a query against one template summary.
fn keyword_score(query_tokens: &HashSet<String>, summary: &PatternSummary) -> f64 {
    let title = format!("{} {}", summary.name.replace(['-', '_'], " "), summary.title);
    let score = 0.4 * overlap(query_tokens, &title)
        + 0.1 * overlap(query_tokens, &summary.category)
        + 0.2 * overlap(query_tokens, &summary.description)
        + 0.3 * overlap(query_tokens, &summary.use_cases.join(" "));
    score.clamp(0.0, 1.0)
}

/// Rank all summaries by keyword score, highest first; ties break on name
/// so equal inputs always rank identically.
pub fn score_patterns(query: &str, summaries: &[PatternSummary]) -> Vec<ScoredPattern> {
    let query_tokens = tokenize(query);
    let mut scored: Vec<ScoredPattern> = summaries
        .iter()
        .map(|s| ScoredPattern {
            name: s.name.clone(),
            score: keyword_score(&query_tokens, s),
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    scored
}

/// Whether keyword results are ambiguous enough to warrant LLM re-ranking.
pub fn should_invoke_reranker(
    scored: &[ScoredPattern],
    intent: IntentCategory,
    llm_available: bool,
    config: &RecommenderConfig,
) -> bool {
    if !llm_available || scored.is_empty() {
        return false;
    }

    // Always rerank an unknown intent.
    if intent == IntentCategory::Unknown {
        return true;
    }

    // Uncertain winner.
    if scored[0].score < config.min_top_score {
        return true;
    }

    // Close race between the top two.
    if scored.len() >= 2 && (scored[0].score - scored[1].score) < config.close_race_margin {
        return true;
    }

    // Multiple strong candidates.
    let strong = scored
        .iter()
        .filter(|s| s.score > config.strong_candidate_score)
        .count();
    if strong >= config.strong_candidate_count {
        return true;
    }

    false
}

// ============================================================================
// Recommender
// ============================================================================

/// How the selection was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    Keyword,
    LlmRerank,
    Fallback,
}

/// A recommended pattern with its confidence.
#[derive(Debug, Clone, Serialize)]
pub struct PatternSelection {
    pub pattern: String,
    pub confidence: f64,
    pub method: SelectionMethod,
    pub reasoning: Option<String>,
}

#[derive(Deserialize)]
struct ReRankResult {
    selected_pattern: String,
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

struct CacheEntry {
    selection: PatternSelection,
    inserted: Instant,
}

pub struct PatternRecommender {
    library: Arc<PatternLibrary>,
    llm: Option<Arc<dyn LLMProvider>>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    config: RecommenderConfig,
}

impl PatternRecommender {
    pub fn new(library: Arc<PatternLibrary>, config: RecommenderConfig) -> Self {
        Self {
            library,
            llm: None,
            classifier: None,
            cache: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Recommend a pattern for a query.
    ///
    /// Fails only on an empty library (`NoCandidates`); rerank errors fall
    /// back to the keyword winner.
    pub async fn recommend(&self, query: &str) -> LoomResult<PatternSelection> {
        let summaries = self.library.list_summaries();
        if summaries.is_empty() {
            return Err(LoomError::NoCandidates);
        }

        let intent = match &self.classifier {
            Some(classifier) => classifier.classify(query).await,
            None => (IntentCategory::Unknown, 0.0),
        };
        debug!(intent = %intent.0, confidence = intent.1, "classified query intent");

        let scored = score_patterns(query, &summaries);
        let top = scored[0].clone();

        if !should_invoke_reranker(&scored, intent.0, self.llm.is_some(), &self.config) {
            debug!(pattern = %top.name, score = top.score, "clear keyword winner, skipping rerank");
            return Ok(PatternSelection {
                pattern: top.name,
                confidence: top.score,
                method: SelectionMethod::Keyword,
                reasoning: None,
            });
        }

        let candidates: Vec<ScoredPattern> =
            scored.iter().take(self.config.top_k).cloned().collect();
        let cache_key = Self::cache_key(query, &candidates);

        if self.config.enable_cache {
            if let Some(cached) = self.cache_get(&cache_key) {
                debug!(pattern = %cached.pattern, "rerank cache hit");
                return Ok(cached);
            }
        }

        match self.rerank(query, &candidates).await {
            Ok(selection) => {
                if self.config.enable_cache {
                    self.cache_put(cache_key, selection.clone());
                }
                Ok(selection)
            }
            Err(e) => {
                // Rerank failures never propagate: the keyword winner stands.
                warn!(error = %e, pattern = %top.name, "rerank failed, using keyword winner");
                Ok(PatternSelection {
                    pattern: top.name,
                    confidence: top.score,
                    method: SelectionMethod::Fallback,
                    reasoning: None,
                })
            }
        }
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: &[ScoredPattern],
    ) -> LoomResult<PatternSelection> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| LoomError::Internal("rerank invoked without an LLM".into()))?;
        if candidates.is_empty() {
            return Err(LoomError::NoCandidates);
        }

        let summaries = self.library.summaries_by_name();
        let prompt = build_rerank_prompt(query, candidates, &summaries);
        let messages = [ChatMessage::user(prompt)];
        let response = llm.chat(&messages).await?;

        let raw = extract_json(&response.content)
            .unwrap_or_else(|| response.content.trim().to_string());
        let result: ReRankResult = serde_json::from_str(&raw).map_err(|e| {
            LoomError::InvalidSpec(format!("rerank response was not valid JSON: {}", e))
        })?;

        if !candidates.iter().any(|c| c.name == result.selected_pattern) {
            return Err(LoomError::InvalidSpec(format!(
                "rerank selected a pattern outside the candidate set: {}",
                result.selected_pattern
            )));
        }

        Ok(PatternSelection {
            pattern: result.selected_pattern,
            confidence: result.confidence.clamp(0.0, 1.0),
            method: SelectionMethod::LlmRerank,
            reasoning: result.reasoning,
        })
    }

    fn cache_key(query: &str, candidates: &[ScoredPattern]) -> String {
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        format!("{}\u{1}{}", query, names.join(","))
    }

    fn cache_get(&self, key: &str) -> Option<PatternSelection> {
        let mut cache = self.cache.lock().expect("recommender cache poisoned");
        match cache.get(key) {
            Some(entry) if entry.inserted.elapsed() <= self.config.cache_ttl => {
                Some(entry.selection.clone())
            }
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn cache_put(&self, key: String, selection: PatternSelection) {
        let mut cache = self.cache.lock().expect("recommender cache poisoned");
        cache.insert(
            key,
            CacheEntry {
                selection,
                inserted: Instant::now(),
            },
        );
    }
}

fn build_rerank_prompt(
    query: &str,
    candidates: &[ScoredPattern],
    summaries: &HashMap<String, PatternSummary>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("User Query: \"{}\"\n\n", query));
    prompt.push_str("Candidate Patterns (ranked by keyword matching):\n\n");

    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, candidate.name));
        if let Some(summary) = summaries.get(&candidate.name) {
            prompt.push_str(&format!("   Title: {}\n", summary.title));
            prompt.push_str(&format!("   Category: {}\n", summary.category));
            let description: String = summary.description.chars().take(200).collect();
            prompt.push_str(&format!("   Description: {}\n", description));
            if !summary.use_cases.is_empty() {
                let cases: Vec<&str> = summary
                    .use_cases
                    .iter()
                    .take(3)
                    .map(|s| s.as_str())
                    .collect();
                prompt.push_str(&format!("   Use Cases: {}\n", cases.join(", ")));
            }
        }
        prompt.push_str(&format!("   Keyword Score: {:.2}\n\n", candidate.score));
    }

    prompt.push_str("\nTask: Select the most relevant pattern for the user's query.\n");
    prompt.push_str("Consider:\n");
    prompt.push_str("- Semantic match between query and pattern purpose\n");
    prompt.push_str("- Use case alignment\n");
    prompt.push_str("- Category appropriateness\n\n");
    prompt.push_str("Respond with JSON:\n");
    prompt.push_str("{\n");
    prompt.push_str("  \"selected_pattern\": \"pattern_name\",\n");
    prompt.push_str("  \"confidence\": 0.85,\n");
    prompt.push_str("  \"reasoning\": \"Brief explanation why this pattern is best\"\n");
    prompt.push_str("}");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{ChatResponse, LLMError};
    use crate::domain::pattern::{AgentSpec, PatternSpec, PatternTemplate, PipelineSpec, PipelineStage};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scored(scores: &[f64]) -> Vec<ScoredPattern> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| ScoredPattern {
                name: format!("p{}", i),
                score: *s,
            })
            .collect()
    }

    #[test]
    fn gate_skips_clear_winner() {
        let config = RecommenderConfig::default();
        // Top score 0.95, runner-up 0.40, known intent: fast path.
        assert!(!should_invoke_reranker(
            &scored(&[0.95, 0.40, 0.30]),
            IntentCategory::Analysis,
            true,
            &config
        ));
    }

    #[test]
    fn gate_triggers_on_unknown_intent() {
        let config = RecommenderConfig::default();
        assert!(should_invoke_reranker(
            &scored(&[0.95, 0.40]),
            IntentCategory::Unknown,
            true,
            &config
        ));
    }

    #[test]
    fn gate_triggers_on_low_top_score() {
        let config = RecommenderConfig::default();
        assert!(should_invoke_reranker(
            &scored(&[0.65, 0.55, 0.50]),
            IntentCategory::Analysis,
            true,
            &config
        ));
    }

    #[test]
    fn gate_triggers_on_close_race() {
        let config = RecommenderConfig::default();
        assert!(should_invoke_reranker(
            &scored(&[0.85, 0.70]),
            IntentCategory::Analysis,
            true,
            &config
        ));
    }

    #[test]
    fn gate_triggers_on_many_strong_candidates() {
        let config = RecommenderConfig::default();
        assert!(should_invoke_reranker(
            &scored(&[0.95, 0.65, 0.62]),
            IntentCategory::Analysis,
            true,
            &config
        ));
    }

    #[test]
    fn gate_requires_llm_and_candidates() {
        let config = RecommenderConfig::default();
        assert!(!should_invoke_reranker(
            &scored(&[0.1]),
            IntentCategory::Unknown,
            false,
            &config
        ));
        assert!(!should_invoke_reranker(
            &[],
            IntentCategory::Unknown,
            true,
            &config
        ));
    }

    #[test]
    fn scoring_is_deterministic_and_sorted() {
        let summaries = vec![
            PatternSummary {
                name: "debate-review".into(),
                title: "Design Debate Review".into(),
                category: "deliberation".into(),
                description: "Debate a design decision between two reviewers".into(),
                use_cases: vec!["design reviews".into()],
            },
            PatternSummary {
                name: "fanout-research".into(),
                title: "Parallel Research".into(),
                category: "analysis".into(),
                description: "Research a topic with parallel workers".into(),
                use_cases: vec!["broad research".into()],
            },
        ];

        let a = score_patterns("debate this design decision", &summaries);
        let b = score_patterns("debate this design decision", &summaries);
        assert_eq!(a, b);
        assert_eq!(a[0].name, "debate-review");
        assert!(a[0].score > a[1].score);
        assert!(a.iter().all(|s| (0.0..=1.0).contains(&s.score)));
    }

    #[tokio::test]
    async fn rule_based_classifier_maps_keywords() {
        let classifier = RuleBasedIntentClassifier;
        let (intent, confidence) = classifier.classify("debate the tradeoff").await;
        assert_eq!(intent, IntentCategory::Deliberation);
        assert!(confidence > 0.5);

        let (intent, confidence) = classifier.classify("qwerty zzz").await;
        assert_eq!(intent, IntentCategory::Unknown);
        assert_eq!(confidence, 0.0);
    }

    // ------------------------------------------------------------------
    // recommend() end-to-end with a scripted provider
    // ------------------------------------------------------------------

    struct ScriptedProvider {
        response: String,
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn chat(&self, _messages: &[ChatMessage]) -> Result<ChatResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LLMError::Network("down".into()));
            }
            Ok(ChatResponse {
                content: self.response.clone(),
                usage: Default::default(),
            })
        }
    }

    fn library_with(names: &[&str]) -> Arc<PatternLibrary> {
        let library = PatternLibrary::new();
        for name in names {
            library.register(PatternTemplate {
                name: name.to_string(),
                title: format!("{} title", name),
                category: "general".into(),
                description: "generic template".into(),
                use_cases: vec![],
                spec: PatternSpec::Pipeline(PipelineSpec {
                    initial_prompt: "x".into(),
                    stages: vec![PipelineStage {
                        agent_id: AgentSpec::new("a").id,
                        prompt_template: String::new(),
                        continue_on_error: false,
                    }],
                    pass_full_history: false,
                }),
            });
        }
        Arc::new(library)
    }

    #[tokio::test]
    async fn empty_library_yields_no_candidates() {
        let recommender =
            PatternRecommender::new(Arc::new(PatternLibrary::new()), RecommenderConfig::default());
        assert!(matches!(
            recommender.recommend("anything").await,
            Err(LoomError::NoCandidates)
        ));
    }

    #[tokio::test]
    async fn rerank_result_must_be_a_candidate() {
        let provider = Arc::new(ScriptedProvider {
            response: "{\"selected_pattern\": \"made-up\", \"confidence\": 0.9, \"reasoning\": \"x\"}"
                .into(),
            calls: AtomicU32::new(0),
            fail: false,
        });
        let recommender =
            PatternRecommender::new(library_with(&["alpha", "beta"]), RecommenderConfig::default())
                .with_llm(provider.clone());

        let selection = recommender.recommend("unrelated query").await.unwrap();
        assert_eq!(selection.method, SelectionMethod::Fallback);
        assert!(selection.pattern == "alpha" || selection.pattern == "beta");
    }

    #[tokio::test]
    async fn rerank_errors_fall_back_to_keyword_winner() {
        let provider = Arc::new(ScriptedProvider {
            response: String::new(),
            calls: AtomicU32::new(0),
            fail: true,
        });
        let recommender =
            PatternRecommender::new(library_with(&["alpha", "beta"]), RecommenderConfig::default())
                .with_llm(provider);

        let selection = recommender.recommend("unrelated query").await.unwrap();
        assert_eq!(selection.method, SelectionMethod::Fallback);
    }

    #[tokio::test]
    async fn rerank_strips_fences_clamps_and_caches() {
        let provider = Arc::new(ScriptedProvider {
            response: "```json\n{\"selected_pattern\": \"beta\", \"confidence\": 1.7, \
                       \"reasoning\": \"fits\"}\n```"
                .into(),
            calls: AtomicU32::new(0),
            fail: false,
        });
        let recommender =
            PatternRecommender::new(library_with(&["alpha", "beta"]), RecommenderConfig::default())
                .with_llm(provider.clone());

        let first = recommender.recommend("unrelated query").await.unwrap();
        assert_eq!(first.pattern, "beta");
        assert_eq!(first.method, SelectionMethod::LlmRerank);
        assert_eq!(first.confidence, 1.0); // clamped
        assert_eq!(first.reasoning.as_deref(), Some("fits"));

        // Second identical query hits the cache: no extra LLM call.
        let second = recommender.recommend("unrelated query").await.unwrap();
        assert_eq!(second.pattern, "beta");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
